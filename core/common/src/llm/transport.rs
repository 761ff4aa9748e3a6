//! 推論トランスポート Outbound ポート
//!
//! 実装は `llm::http::HttpConverseTransport`（HTTP）やテスト用のスクリプト再生など。

use crate::error::Error;
use crate::llm::events::ConverseStreamEvent;
use crate::llm::request::{ConverseOutput, ConverseRequest};

/// ワイヤイベントの遅延列（1 リクエストにつき 1 回だけ消費する）
pub type EventStream = Box<dyn Iterator<Item = Result<ConverseStreamEvent, Error>>>;

/// 推論エンドポイントへのリクエストを行う能力
pub trait InferenceTransport: Send + Sync {
    /// ログ用の名前
    fn name(&self) -> &str;

    /// 非ストリーミングで 1 応答を得る
    fn converse(&self, request: &ConverseRequest<'_>) -> Result<ConverseOutput, Error>;

    /// ストリーミングでイベント列を得る
    fn converse_stream(&self, request: &ConverseRequest<'_>) -> Result<EventStream, Error>;
}
