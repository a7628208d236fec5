use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

// 誰も持っていないことを表す席番号
const NO_HOLDER: usize = usize::MAX;

/// 箸。1本につき1人しか持てない
///
/// 食事中（sleep を await している間）もロックを持ち続けるので、tokio の Mutex を使う。
#[derive(Debug)]
pub struct Chopstick {
    name: String,
    index: usize,
    mtx: Mutex<()>,
    holder: AtomicUsize, // 持っている哲学者の席番号
}

/// 箸を持っている間だけ存在するガード。drop で箸を置く
#[derive(Debug)]
pub struct ChopstickGuard<'a> {
    chopstick: &'a Chopstick,
    _lock: MutexGuard<'a, ()>,
}

impl Chopstick {
    pub fn new(index: usize) -> Self {
        Chopstick::with_name(format!("Chopstick {index}"), index)
    }

    pub fn with_name(name: impl Into<String>, index: usize) -> Self {
        Chopstick {
            name: name.into(),
            index,
            mtx: Mutex::new(()),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn holder(&self) -> Option<usize> {
        match self.holder.load(Ordering::Acquire) {
            NO_HOLDER => None,
            seat => Some(seat),
        }
    }

    /// 箸が空くまで待って取り上げる
    ///
    /// タイムアウトはない。持っている側がいずれ置くことを前提にしている。
    /// 既に自分が持っている箸をもう一度取ろうとするとエラーを返す。
    pub async fn pick_up(&self, seat: usize) -> Result<ChopstickGuard<'_>> {
        debug_assert_ne!(seat, NO_HOLDER);

        // holder に seat を書くのは seat 自身だけなので、ここで一致していれば自分が持っている
        if self.holder.load(Ordering::Acquire) == seat {
            return Err(Error::DoubleAcquire {
                seat,
                chopstick: self.index,
            });
        }

        let lock = self.mtx.lock().await;
        self.holder.store(seat, Ordering::Release);
        Ok(ChopstickGuard {
            chopstick: self,
            _lock: lock,
        })
    }
}

impl ChopstickGuard<'_> {
    pub fn index(&self) -> usize {
        self.chopstick.index
    }
}

impl Drop for ChopstickGuard<'_> {
    fn drop(&mut self) {
        // ロックの解放（_lock の drop）より先に holder を消す
        self.chopstick.holder.store(NO_HOLDER, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn test_pick_up_and_put_down() {
        let c = Chopstick::new(3);
        assert_eq!(c.name(), "Chopstick 3");
        assert_eq!(c.holder(), None);

        let guard = c.pick_up(1).await.unwrap();
        assert_eq!(guard.index(), 3);
        assert_eq!(c.holder(), Some(1));

        drop(guard);
        assert_eq!(c.holder(), None);
    }

    #[tokio::test]
    async fn test_double_acquire_is_rejected() {
        let c = Chopstick::new(0);
        let _guard = c.pick_up(2).await.unwrap();

        // 待たずにエラーになること
        let res = tokio::time::timeout(Duration::from_secs(1), c.pick_up(2))
            .await
            .expect("double acquire must not block");
        assert!(matches!(
            res,
            Err(Error::DoubleAcquire {
                seat: 2,
                chopstick: 0
            })
        ));
        assert_eq!(c.holder(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_other_seat_waits_for_release() {
        let c = Arc::new(Chopstick::new(1));
        let guard = c.pick_up(0).await.unwrap();

        let c0 = c.clone();
        let waiter = tokio::spawn(async move {
            let g = c0.pick_up(1).await.unwrap();
            c0.holder() == Some(1) && g.index() == 1
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(c.holder(), Some(0));

        drop(guard);
        let ok = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(ok);
        assert_eq!(c.holder(), None);
    }

    // 多数のタスクで取り合っても同時に2人が持つことはない
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion() {
        const NUM_TASKS: usize = 8;
        const NUM_LOOP: usize = 200;

        let c = Arc::new(Chopstick::new(0));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut v = Vec::new();
        for seat in 0..NUM_TASKS {
            let c0 = c.clone();
            let inside0 = inside.clone();
            v.push(tokio::spawn(async move {
                for _ in 0..NUM_LOOP {
                    let _g = c0.pick_up(seat).await.unwrap();
                    assert_eq!(inside0.fetch_add(1, Ordering::SeqCst), 0);
                    assert_eq!(c0.holder(), Some(seat));
                    tokio::task::yield_now().await;
                    inside0.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for t in v {
            t.await.unwrap();
        }
        assert_eq!(c.holder(), None);
    }
}
