use std::{
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::rngs::StdRng;
use tokio::sync::watch;

use crate::{
    chopstick::Chopstick,
    config::{DurationRange, Timing},
    error::Result,
    log::{LogLine, LogSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhilosopherState {
    Thinking = 0,
    Hungry = 1,
    Eating = 2,
    Stopped = 3,
}

impl PhilosopherState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PhilosopherState::Thinking,
            1 => PhilosopherState::Hungry,
            2 => PhilosopherState::Eating,
            _ => PhilosopherState::Stopped,
        }
    }
}

/// 終了報告などに使う読み取り専用の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhilosopherSnapshot {
    pub name: String,
    pub seat: usize,
    pub appetite: usize,
    pub meals_eaten: usize,
    pub state: PhilosopherState,
    pub stopped: bool,
}

/// 哲学者
///
/// 左右の箸と出力先は借りているだけで、寿命はテーブルが管理する。
pub struct Philosopher {
    name: String,
    seat: usize,
    appetite: usize,
    meals_eaten: AtomicUsize,
    state: AtomicU8,
    left: Arc<Chopstick>,
    right: Arc<Chopstick>,
    sink: Arc<dyn LogSink>,
    timing: Timing,
}

impl Philosopher {
    pub fn new(
        name: impl Into<String>,
        seat: usize,
        appetite: usize,
        left: Arc<Chopstick>,
        right: Arc<Chopstick>,
        sink: Arc<dyn LogSink>,
        timing: Timing,
    ) -> Self {
        Philosopher {
            name: name.into(),
            seat,
            appetite,
            meals_eaten: AtomicUsize::new(0),
            state: AtomicU8::new(PhilosopherState::Thinking as u8),
            left,
            right,
            sink,
            timing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seat(&self) -> usize {
        self.seat
    }

    pub fn left(&self) -> &Chopstick {
        &self.left
    }

    pub fn right(&self) -> &Chopstick {
        &self.right
    }

    pub fn meals_eaten(&self) -> usize {
        self.meals_eaten.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PhilosopherState {
        PhilosopherState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PhilosopherState::Stopped
    }

    pub fn snapshot(&self) -> PhilosopherSnapshot {
        let state = self.state();
        PhilosopherSnapshot {
            name: self.name.clone(),
            seat: self.seat,
            appetite: self.appetite,
            meals_eaten: self.meals_eaten(),
            state,
            stopped: state == PhilosopherState::Stopped,
        }
    }

    /// 取る順番に並べた箸。左右どちらかに関係なく番号の小さい方が先
    ///
    /// 全員が同じ順序で取るので循環待ちが起きない。
    /// 1人だけのテーブルでは左右が同じ箸なので1本だけ返す。
    pub fn ordered_chopsticks(&self) -> (&Chopstick, Option<&Chopstick>) {
        if Arc::ptr_eq(&self.left, &self.right) {
            return (&self.left, None);
        }
        if self.left.index() <= self.right.index() {
            (&self.left, Some(&self.right))
        } else {
            (&self.right, Some(&self.left))
        }
    }

    pub(crate) fn join_table(&self) {
        self.say("has joined the table");
    }

    pub(crate) fn leave_table(&self) {
        self.say("is leaving the table");
    }

    /// 満腹になるか、止めるよう言われるまで考えて食べるを繰り返す
    pub async fn run(
        self: Arc<Self>,
        mut rng: StdRng,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let res = self.dine(&mut rng, &mut stop).await;

        let meals = self.meals_eaten();
        match &res {
            Ok(()) if meals >= self.appetite => self.say("satisfied and stops eating"),
            Ok(()) => self.say(format!("stops eating after {meals}/{} meals", self.appetite)),
            Err(e) => {
                tracing::error!(philosopher = %self.name, seat = self.seat, error = %e, "aborting");
                self.say(format!("stops eating after {meals}/{} meals", self.appetite));
            }
        }
        self.set_state(PhilosopherState::Stopped);
        res
    }

    async fn dine(&self, rng: &mut StdRng, stop: &mut watch::Receiver<bool>) -> Result<()> {
        // 全員が同時に動き出さないように少しずらす
        let stagger = DurationRange::new(Duration::ZERO, self.timing.stagger).sample(rng);
        pause_unless_stopped(stagger, stop).await;

        loop {
            if stop_requested(stop) {
                break;
            }
            self.think(rng, stop).await;

            // 満腹かどうかは考え終わってから見る。止められていたら空腹にならずに終わる
            if self.meals_eaten() >= self.appetite || stop_requested(stop) {
                break;
            }
            self.eat(rng).await?;
        }
        Ok(())
    }

    async fn think(&self, rng: &mut StdRng, stop: &mut watch::Receiver<bool>) {
        self.set_state(PhilosopherState::Thinking);
        self.say("thinking");
        let d = self.timing.think.sample(rng);
        pause_unless_stopped(d, stop).await;
    }

    // 箸の取得待ちと食事中は止められても中断しない
    async fn eat(&self, rng: &mut StdRng) -> Result<()> {
        self.set_state(PhilosopherState::Hungry);
        self.say("hungry and waiting for chopsticks");

        let (first, second) = self.ordered_chopsticks();

        let first_guard = first.pick_up(self.seat).await?;
        self.say(format!("picked up chopstick {}", first.index()));

        let second_guard = match second {
            Some(second) => {
                pause(self.timing.pickup_delay).await;
                let guard = second.pick_up(self.seat).await?;
                self.say(format!("picked up chopstick {}", second.index()));
                Some(guard)
            }
            None => None,
        };

        self.set_state(PhilosopherState::Eating);
        let meal = self.meals_eaten.fetch_add(1, Ordering::AcqRel) + 1;
        self.say(format!("eating meal {meal}/{}", self.appetite));
        pause(self.timing.eat.sample(rng)).await;

        match &second_guard {
            Some(second) => self.say(format!(
                "put down chopsticks {} and {}",
                first_guard.index(),
                second.index()
            )),
            None => self.say(format!("put down chopstick {}", first_guard.index())),
        }
        drop(second_guard);
        drop(first_guard);
        Ok(())
    }

    fn set_state(&self, state: PhilosopherState) {
        // Stopped からは戻らない
        let res = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            (cur != PhilosopherState::Stopped as u8).then_some(state as u8)
        });
        if res.is_ok() {
            tracing::debug!(philosopher = %self.name, seat = self.seat, ?state, "state change");
        }
    }

    fn say(&self, action: impl Into<String>) {
        self.sink.emit(LogLine::now(self.name.as_str(), action));
    }
}

// 送信側が drop された場合も止める
fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

async fn pause(d: Duration) {
    if d.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(d).await;
    }
}

async fn pause_unless_stopped(d: Duration, stop: &mut watch::Receiver<bool>) {
    if stop_requested(stop) {
        return;
    }
    tokio::select! {
        _ = pause(d) => {}
        _ = stop.wait_for(|stopped| *stopped) => {}
    }
}
