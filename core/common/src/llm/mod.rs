//! 推論 API との会話（リクエスト組み立て・ストリームイベントの復号・HTTP 転送）
//!
//! - events: ConverseStream のイベント語彙と、復号後の StreamDelta
//! - decoder: イベント列を StreamDelta 列へ変換する StreamDecoder
//! - request: Converse リクエスト / 非ストリーム応答の型
//! - transport: InferenceTransport（Outbound ポート）
//! - wire: eventstream バイナリフレーム / JSON Lines の読み取り
//! - http: reqwest による InferenceTransport 実装

pub mod decoder;
pub mod events;
pub mod http;
pub mod request;
pub mod transport;
pub mod wire;

pub use decoder::{StreamDecoder, ToolCallAccumulator};
pub use events::{ConverseStreamEvent, StopReason, StreamDelta, StreamStop, TokenUsage};
pub use http::HttpConverseTransport;
pub use request::{ConverseOutput, ConverseRequest, InferenceConfig, ToolConfig};
pub use transport::{EventStream, InferenceTransport};
