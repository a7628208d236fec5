//! 食事する哲学者問題のシミュレーション
//!
//! 箸に番号を振り、必ず小さい番号から取ることで循環待ちを防ぐ（資源の階層化）。
//! デッドロックは起きないが、飢餓状態にならないことまでは保証しない。

pub mod chopstick;
pub mod config;
pub mod error;
pub mod log;
pub mod philosopher;
pub mod table;

pub use chopstick::{Chopstick, ChopstickGuard};
pub use config::{DurationRange, TableConfig, Timing, DEFAULT_APPETITE, DEFAULT_PHILOSOPHERS};
pub use error::{ConfigError, Error, Result};
pub use log::{LogLine, LogSink, MemorySink, WriterSink};
pub use philosopher::{Philosopher, PhilosopherSnapshot, PhilosopherState};
pub use table::{StopHandle, Table};
