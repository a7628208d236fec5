use std::{
    fmt,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use chrono::{Local, NaiveTime, Timelike};

/// `[HH:MM:SS] <name>: <action>` 形式の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub time: NaiveTime,
    pub name: String,
    pub action: String,
}

impl LogLine {
    pub fn now(name: impl Into<String>, action: impl Into<String>) -> Self {
        let time = Local::now().time();
        LogLine {
            // 秒未満は表示しないので落としておく
            time: time.with_nanosecond(0).unwrap_or(time),
            name: name.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.time.format("%H:%M:%S"),
            self.name,
            self.action
        )
    }
}

/// 哲学者の出力先
///
/// 複数の哲学者から同時に呼ばれるので、1行単位で排他する必要がある。
/// 書き込み失敗は呼び出し側に返さない。
pub trait LogSink: Send + Sync {
    fn emit(&self, line: LogLine);
}

/// `Write` に1行ずつ書き出す sink
pub struct WriterSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        WriterSink {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        WriterSink::new(io::stdout())
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn emit(&self, line: LogLine) {
        // ロック獲得中に await しないので std の Mutex で十分
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::trace!(error = %e, "dropped log line");
        }
    }
}

/// 出力をメモリに溜めておく sink
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lines_for(&self, name: &str) -> Vec<LogLine> {
        self.lines()
            .into_iter()
            .filter(|l| l.name == name)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, line: LogLine) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}
