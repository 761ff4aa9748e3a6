//! 推論ストリームのイベント型
//!
//! `ConverseStreamEvent` はワイヤ上のイベント（Bedrock ConverseStream の語彙）をそのまま表す。
//! 1 イベントは `{"contentBlockDelta": {...}}` のように外側のキーがタグになっている。
//! `StreamDelta` は StreamDecoder が出す意味的な差分。

use crate::msg::{Role, ToolUse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ストリーム終了理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    /// 通常終了
    EndTurn,
    /// ツール呼び出しあり
    ToolUse,
    MaxTokens,
    StopSequence,
    /// その他（終端として扱う）
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::Other(s) => s,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

impl From<String> for StopReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::Other(s),
        }
    }
}

impl From<StopReason> for String {
    fn from(r: StopReason) -> Self {
        r.as_str().to_string()
    }
}

/// トークン使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStartEvent {
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseStart {
    pub tool_use_id: String,
    pub name: String,
}

/// contentBlockStart の start
///
/// toolUse 以外の開始ブロックは Other（キー名だけ保持）として受け流す。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, Value>")]
pub enum BlockStart {
    ToolUse(ToolUseStart),
    Other(String),
}

impl TryFrom<serde_json::Map<String, Value>> for BlockStart {
    type Error = serde_json::Error;

    fn try_from(mut map: serde_json::Map<String, Value>) -> Result<Self, Self::Error> {
        match map.remove("toolUse") {
            Some(v) => serde_json::from_value(v).map(BlockStart::ToolUse),
            None => Ok(BlockStart::Other(
                map.keys().next().cloned().unwrap_or_default(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStartEvent {
    pub start: BlockStart,
    #[serde(default)]
    pub content_block_index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolUseDelta {
    pub input: String,
}

/// contentBlockDelta の delta
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockDelta {
    Text(String),
    ToolUse(ToolUseDelta),
    /// 推論過程。転送も履歴保存もしない
    ReasoningContent(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDeltaEvent {
    pub delta: BlockDelta,
    #[serde(default)]
    pub content_block_index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStopEvent {
    #[serde(default)]
    pub content_block_index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEvent {
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub metrics: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamException {
    #[serde(default)]
    pub message: String,
}

/// 推論ストリームから来るワイヤイベント
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConverseStreamEvent {
    MessageStart(MessageStartEvent),
    ContentBlockStart(ContentBlockStartEvent),
    ContentBlockDelta(ContentBlockDeltaEvent),
    ContentBlockStop(ContentBlockStopEvent),
    MessageStop(MessageStopEvent),
    Metadata(MetadataEvent),
    InternalServerException(StreamException),
    ModelStreamErrorException(StreamException),
    ValidationException(StreamException),
    ThrottlingException(StreamException),
    ServiceUnavailableException(StreamException),
    /// 知らないイベント種別（タグ名だけ保持し、復号側では無視する）
    #[serde(skip_deserializing)]
    Unknown(String),
}

/// 復号できるイベント種別のタグ
const KNOWN_EVENT_TYPES: &[&str] = &[
    "messageStart",
    "contentBlockStart",
    "contentBlockDelta",
    "contentBlockStop",
    "messageStop",
    "metadata",
    "internalServerException",
    "modelStreamErrorException",
    "validationException",
    "throttlingException",
    "serviceUnavailableException",
];

impl ConverseStreamEvent {
    /// JSON 1 件（`{"<eventType>": {...}}`）から復元
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(s)?;
        match value {
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some((event_type, payload)) => Self::from_parts(&event_type, payload),
                None => serde_json::from_str(s),
            },
            other => serde_json::from_value(other),
        }
    }

    /// タグと本体が分かれて届く場合（eventstream のヘッダ + ペイロード）に使う
    pub fn from_parts(event_type: &str, payload: Value) -> Result<Self, serde_json::Error> {
        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Ok(ConverseStreamEvent::Unknown(event_type.to_string()));
        }
        let mut map = serde_json::Map::new();
        map.insert(event_type.to_string(), payload);
        serde_json::from_value(Value::Object(map))
    }

    /// ストリーム内例外ならそのメッセージ
    pub fn exception(&self) -> Option<(&'static str, &str)> {
        match self {
            ConverseStreamEvent::InternalServerException(e) => {
                Some(("internalServerException", &e.message))
            }
            ConverseStreamEvent::ModelStreamErrorException(e) => {
                Some(("modelStreamErrorException", &e.message))
            }
            ConverseStreamEvent::ValidationException(e) => Some(("validationException", &e.message)),
            ConverseStreamEvent::ThrottlingException(e) => Some(("throttlingException", &e.message)),
            ConverseStreamEvent::ServiceUnavailableException(e) => {
                Some(("serviceUnavailableException", &e.message))
            }
            _ => None,
        }
    }
}

/// ストリーム終了時の情報
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStop {
    pub reason: StopReason,
    /// reason が ToolUse のとき、引数を JSON として確定させたツール呼び出し
    pub tool_use: Option<ToolUse>,
    pub usage: Option<TokenUsage>,
}

/// StreamDecoder が出す意味的な差分
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// アシスタントテキストの増分（即座に転送してよい）
    Text(String),
    /// ツール呼び出し開始（引数はまだ確定していない）
    ToolUseStart { tool_use_id: String, name: String },
    /// ストリーム完了
    Stop(StreamStop),
}
