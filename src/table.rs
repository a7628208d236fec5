use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    chopstick::Chopstick,
    config::TableConfig,
    error::{Error, Result},
    log::LogSink,
    philosopher::{Philosopher, PhilosopherSnapshot},
};

/// 止める合図。どのスレッドからでも送れる
///
/// 協調的なキャンセルなので、哲学者は決まった地点でしか見ない。
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        // false -> true の一度きり
        if !self.tx.send_replace(true) {
            tracing::info!("stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

enum Phase {
    Seated,
    Dining {
        handles: Vec<JoinHandle<Result<()>>>,
        first_err: Option<Error>,
    },
    Finished,
}

/// 円卓
///
/// 哲学者 i の左は箸 i 、右は箸 (i + 1) % N 。
pub struct Table {
    chopsticks: Vec<Arc<Chopstick>>,
    philosophers: Vec<Arc<Philosopher>>,
    config: TableConfig,
    stop: StopHandle,
    stop_rx: watch::Receiver<bool>,
    phase: Phase,
}

impl Table {
    /// 箸と哲学者を並べる。まだ誰も動き出さない
    pub fn new(config: TableConfig, sink: Arc<dyn LogSink>) -> Result<Self> {
        config.validate()?;

        let n = config.philosophers;
        let chopsticks: Vec<_> = (0..n).map(|i| Arc::new(Chopstick::new(i))).collect();

        let philosophers = (0..n)
            .map(|i| {
                // n == 1 のときは左右が同じ箸になる
                let left = chopsticks[i].clone();
                let right = chopsticks[(i + 1) % n].clone();
                Arc::new(Philosopher::new(
                    config.name_of(i),
                    i,
                    config.appetite,
                    left,
                    right,
                    sink.clone(),
                    config.timing,
                ))
            })
            .collect();

        let (tx, stop_rx) = watch::channel(false);
        Ok(Table {
            chopsticks,
            philosophers,
            config,
            stop: StopHandle { tx: Arc::new(tx) },
            stop_rx,
            phase: Phase::Seated,
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn chopsticks(&self) -> &[Arc<Chopstick>] {
        &self.chopsticks
    }

    pub fn philosophers(&self) -> &[Arc<Philosopher>] {
        &self.philosophers
    }

    /// 全員を別タスクで動かし始める。tokio のランタイム上で呼ぶこと
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::Seated) {
            return Err(Error::AlreadyStarted);
        }

        tracing::info!(
            philosophers = self.philosophers.len(),
            appetite = self.config.appetite,
            "dinner started"
        );

        let handles = self
            .philosophers
            .iter()
            .map(|p| {
                p.join_table();
                let rng = self.config.rng_for(p.seat());
                tokio::spawn(p.clone().run(rng, self.stop_rx.clone()))
            })
            .collect();
        self.phase = Phase::Dining {
            handles,
            first_err: None,
        };
        Ok(())
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// 全員が止まるまで待ち、席を立たせる
    ///
    /// 途中で失敗した哲学者がいても全員を待ってから、最初のエラーを返す。
    /// 待っている途中で future が drop されても、次の呼び出しで続きから待つ。
    pub async fn await_completion(&mut self) -> Result<()> {
        let (handles, first_err) = match &mut self.phase {
            Phase::Seated => return Err(Error::NotStarted),
            Phase::Dining { handles, first_err } => (handles, first_err),
            Phase::Finished => return Ok(()),
        };

        // 終わったハンドルだけを取り除く。await 中に drop されても残りは phase に残る
        while let Some(handle) = handles.first_mut() {
            let res = handle.await;
            handles.remove(0);
            let err = match res {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => Error::Task(e),
            };
            tracing::warn!(error = %err, "philosopher finished with error");
            first_err.get_or_insert(err);
        }

        let first_err = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Dining { first_err, .. } => first_err,
            _ => None,
        };

        for p in &self.philosophers {
            p.leave_table();
        }

        tracing::info!(
            meals = self.philosophers.iter().map(|p| p.meals_eaten()).sum::<usize>(),
            "everyone has left the table"
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> Vec<PhilosopherSnapshot> {
        self.philosophers.iter().map(|p| p.snapshot()).collect()
    }
}
