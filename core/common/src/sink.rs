//! 配信 Sink: 出力チャンクを「いま聞いている相手」へ押し出す
//!
//! オーケストレータから見ると best-effort / fire-and-forget。
//! 接続先への push では「相手が既にいない」だけを回復可能として扱い、ログを残して no-op にする。
//! それ以外の配信失敗は Error::Transport としてオーケストレータへ返す。

use crate::error::Error;
use crate::ports::outbound::{Log, LogLevel, LogRecord};
use std::sync::Arc;

/// チャンクを受け取る Sink
pub trait DeliverySink: Send {
    /// 1 チャンクを配信する
    fn push(&mut self, chunk: &str) -> Result<(), Error>;
    /// ターン終了時（オプションで flush 等）
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// 接続先配信の失敗
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    /// 相手の接続が既に無い（回復可能）
    #[error("recipient gone")]
    RecipientGone,
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// 接続 id とペイロードを受け取って送る配信トランスポート（Outbound ポート）
pub trait ConnectionTransport: Send + Sync {
    fn post_to_connection(&self, connection_id: &str, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// 接続 id 宛てに push する Sink
///
/// 一度 RecipientGone を受けたら以降の push はトランスポートを呼ばずに捨てる。
pub struct ConnectionPushSink {
    transport: Arc<dyn ConnectionTransport>,
    connection_id: String,
    log: Arc<dyn Log>,
    gone: bool,
    delivered: usize,
    dropped: usize,
}

impl ConnectionPushSink {
    pub fn new(
        transport: Arc<dyn ConnectionTransport>,
        connection_id: impl Into<String>,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            transport,
            connection_id: connection_id.into(),
            log,
            gone: false,
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn is_gone(&self) -> bool {
        self.gone
    }

    /// 配信できたチャンク数
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// 相手不在で捨てたチャンク数
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl DeliverySink for ConnectionPushSink {
    fn push(&mut self, chunk: &str) -> Result<(), Error> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.gone {
            self.dropped += 1;
            return Ok(());
        }
        match self
            .transport
            .post_to_connection(&self.connection_id, chunk.as_bytes())
        {
            Ok(()) => {
                self.delivered += 1;
                Ok(())
            }
            Err(DeliveryError::RecipientGone) => {
                self.gone = true;
                self.dropped += 1;
                let _ = self.log.log(
                    &LogRecord::new(LogLevel::Warn, "connection is gone, skipping")
                        .layer("adapter")
                        .kind("delivery")
                        .field("connection_id", self.connection_id.as_str()),
                );
                Ok(())
            }
            Err(DeliveryError::Failed(msg)) => Err(Error::transport(format!(
                "delivery to {} failed: {}",
                self.connection_id, msg
            ))),
        }
    }
}

/// 受け取ったチャンクを保持する Sink（テスト・埋め込み用）
#[derive(Debug, Default)]
pub struct BufferSink {
    chunks: Vec<String>,
    finished: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn text(&self) -> String {
        self.chunks.concat()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl DeliverySink for BufferSink {
    fn push(&mut self, chunk: &str) -> Result<(), Error> {
        self.chunks.push(chunk.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryLog;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// gone に入っている接続には RecipientGone、fail_all なら Failed を返す
    #[derive(Default)]
    struct FakeConnections {
        gone: HashSet<String>,
        fail_all: bool,
        posted: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ConnectionTransport for FakeConnections {
        fn post_to_connection(
            &self,
            connection_id: &str,
            payload: &[u8],
        ) -> Result<(), DeliveryError> {
            if self.fail_all {
                return Err(DeliveryError::Failed("HTTP 403".to_string()));
            }
            if self.gone.contains(connection_id) {
                return Err(DeliveryError::RecipientGone);
            }
            self.posted
                .lock()
                .unwrap()
                .push((connection_id.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_live_connection_receives_exact_bytes() {
        let conns = Arc::new(FakeConnections::default());
        let log = Arc::new(MemoryLog::new());
        let mut sink = ConnectionPushSink::new(conns.clone(), "conn-1", log);
        sink.push("Rainy / Max: 24°C").unwrap();
        let posted = conns.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "conn-1");
        assert_eq!(posted[0].1, "Rainy / Max: 24°C".as_bytes());
        assert_eq!(sink.delivered(), 1);
    }

    #[test]
    fn test_empty_chunk_is_not_posted() {
        let conns = Arc::new(FakeConnections::default());
        let mut sink = ConnectionPushSink::new(conns.clone(), "conn-1", Arc::new(MemoryLog::new()));
        sink.push("").unwrap();
        assert!(conns.posted.lock().unwrap().is_empty());
        assert_eq!(sink.delivered(), 0);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_gone_connection_is_logged_noop() {
        let mut gone = HashSet::new();
        gone.insert("conn-x".to_string());
        let conns = Arc::new(FakeConnections {
            gone,
            ..Default::default()
        });
        let log = Arc::new(MemoryLog::new());
        let mut sink = ConnectionPushSink::new(conns.clone(), "conn-x", log.clone());
        assert!(sink.push("a").is_ok());
        assert!(sink.push("b").is_ok());
        assert!(sink.is_gone());
        assert_eq!(sink.dropped(), 2);
        assert_eq!(log.count_kind("delivery"), 1);
        assert!(conns.posted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_other_failure_is_fatal_transport_error() {
        let conns = Arc::new(FakeConnections {
            fail_all: true,
            ..Default::default()
        });
        let mut sink = ConnectionPushSink::new(conns, "conn-1", Arc::new(MemoryLog::new()));
        let err = sink.push("a").unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(!sink.is_gone());
    }

    #[test]
    fn test_buffer_sink() {
        let mut sink = BufferSink::new();
        sink.push("a").unwrap();
        sink.push("b").unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.text(), "ab");
        assert!(sink.is_finished());
    }
}
