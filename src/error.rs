use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// テーブル構築時の設定エラー
///
/// コア側では既定値に置き換えない。置き換えるかどうかは呼び出し側が決める。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("philosopher count must be at least 1, got {count}")]
    InvalidPhilosopherCount { count: usize },

    #[error("appetite must be at least 1, got {appetite}")]
    InvalidAppetite { appetite: usize },

    #[error("expected {expected} display names, got {actual}")]
    NameCountMismatch { expected: usize, actual: usize },

    #[error("invalid {phase} duration range: {min:?} > {max:?}")]
    InvalidDurationRange {
        phase: &'static str,
        min: Duration,
        max: Duration,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    // 同じ哲学者が既に持っている箸を取ろうとした。続行すると自己デッドロックする
    #[error("philosopher at seat {seat} tried to pick up chopstick {chopstick} it already holds")]
    DoubleAcquire { seat: usize, chopstick: usize },

    #[error("dinner has already started")]
    AlreadyStarted,

    #[error("dinner has not been started")]
    NotStarted,

    #[error("philosopher task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
