//! Outbound ポート: アプリが外界（ログ・推論 API・配信先）を使うための trait

pub mod log;

pub use log::{now_iso8601, Log, LogLevel, LogRecord};

pub use crate::llm::transport::InferenceTransport;
pub use crate::sink::{ConnectionTransport, DeliverySink};
