//! 人間向けログ（stderr へ要点だけを 1 行で出す）と、複数 Log への振り分け

use crate::error::Error;
use crate::ports::outbound::{Log, LogLevel, LogRecord};
use std::io::Write;
use std::sync::{Arc, Mutex};

const FIELDS_SUMMARY_MAX: usize = 300;

/// stderr へ整形して出力する Log 実装（-v 指定時）
pub struct StderrLog {
    max_level: LogLevel,
}

impl StderrLog {
    /// max_level より詳細なレベルは捨てる
    pub fn new(max_level: LogLevel) -> Self {
        Self { max_level }
    }
}

/// 1 行に整形する（fields は長すぎる場合に切り詰める）
pub fn format_human(record: &LogRecord) -> String {
    let mut line = format!("[{}] {}", record.level.as_str(), record.message);
    if let Some(kind) = &record.kind {
        line.push_str(&format!(" ({})", kind));
    }
    if let Some(fields) = &record.fields {
        let s = serde_json::to_string(fields).unwrap_or_default();
        if s.chars().count() > FIELDS_SUMMARY_MAX {
            let truncated: String = s.chars().take(FIELDS_SUMMARY_MAX).collect();
            line.push_str(&format!(" {}...", truncated));
        } else {
            line.push(' ');
            line.push_str(&s);
        }
    }
    line
}

impl Log for StderrLog {
    fn log(&self, record: &LogRecord) -> Result<(), Error> {
        if record.level > self.max_level {
            return Ok(());
        }
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", format_human(record))?;
        Ok(())
    }
}

/// 複数の Log へ同じレコードを流す。1 つが失敗しても残りには書く。
pub struct FanoutLog {
    logs: Vec<Arc<dyn Log>>,
}

impl FanoutLog {
    pub fn new(logs: Vec<Arc<dyn Log>>) -> Self {
        Self { logs }
    }
}

impl Log for FanoutLog {
    fn log(&self, record: &LogRecord) -> Result<(), Error> {
        let mut first_err = None;
        for l in &self.logs {
            if let Err(e) = l.log(record) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// メモリに溜める Log 実装（テスト・埋め込み用）
#[derive(Default)]
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// kind が一致するレコードの数
    pub fn count_kind(&self, kind: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.kind.as_deref() == Some(kind))
            .count()
    }
}

impl Log for MemoryLog {
    fn log(&self, record: &LogRecord) -> Result<(), Error> {
        self.records
            .lock()
            .map_err(|_| Error::io_msg("log buffer poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
