//! 会話ターンの型（Turn / ContentBlock / ToolResultEnvelope）
//!
//! シリアライズ形は推論エンドポイント（Bedrock Converse）の messages 形式にそのまま一致させる。
//! 例: `{"role":"user","content":[{"toolResult":{"toolUseId":"t1","content":[{"json":{...}}],"status":"success"}}]}`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// ターンの役割
///
/// ツール結果を運ぶターンはワイヤ上は "user" だが、履歴の検証のため区別して持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    ToolResultCarrier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User | Role::ToolResultCarrier => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(serde::de::Error::custom(format!("unknown role: {}", other))),
        }
    }
}

/// モデルが出力したツール呼び出し要求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

/// ツール結果の中身（JSON ペイロードまたはテキスト）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContent {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// ツール実行結果。ToolInvoker だけが生成し、生成後は変更しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEnvelope {
    tool_use_id: String,
    content: Vec<ToolResultContent>,
    status: ToolResultStatus,
}

impl ToolResultEnvelope {
    /// 成功: `{"json": {"result": value}}` を 1 ブロックだけ持つ
    pub(crate) fn success(tool_use_id: impl Into<String>, value: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ToolResultContent::Json(serde_json::json!({ "result": value }))],
            status: ToolResultStatus::Success,
        }
    }

    /// 失敗: エラー内容をテキスト 1 ブロックで持つ
    pub(crate) fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "tool execution failed".to_string()
        } else {
            message
        };
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ToolResultContent::Text(message)],
            status: ToolResultStatus::Error,
        }
    }

    pub fn tool_use_id(&self) -> &str {
        &self.tool_use_id
    }

    pub fn content(&self) -> &[ToolResultContent] {
        &self.content
    }

    pub fn status(&self) -> ToolResultStatus {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolResultStatus::Error
    }
}

/// ターン内のコンテンツブロック
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolUse),
    ToolResult(ToolResultEnvelope),
}

/// 会話ログの 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::Text(text.into())])
    }

    pub fn tool_result(envelope: ToolResultEnvelope) -> Self {
        Self {
            role: Role::ToolResultCarrier,
            content: vec![ContentBlock::ToolResult(envelope)],
        }
    }

    /// Text ブロックを連結したもの
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUse> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse(t) => Some(t),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultEnvelope> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolResult(r) => Some(r),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_turn_wire_shape() {
        let t = Turn::user("What's the weather in Osaka?");
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(
            v,
            json!({"role": "user", "content": [{"text": "What's the weather in Osaka?"}]})
        );
    }

    #[test]
    fn test_tool_use_wire_shape() {
        let t = Turn::assistant(vec![ContentBlock::ToolUse(ToolUse {
            tool_use_id: "tooluse_1".to_string(),
            name: "get_weather".to_string(),
            input: json!({"latitude": 34.6}),
        })]);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"][0]["toolUse"]["toolUseId"], "tooluse_1");
        assert_eq!(v["content"][0]["toolUse"]["input"]["latitude"], 34.6);
    }

    #[test]
    fn test_tool_result_carrier_serializes_as_user() {
        let env = ToolResultEnvelope::success("tooluse_1", json!("Rainy"));
        let v = serde_json::to_value(Turn::tool_result(env)).unwrap();
        assert_eq!(
            v,
            json!({
                "role": "user",
                "content": [{"toolResult": {
                    "toolUseId": "tooluse_1",
                    "content": [{"json": {"result": "Rainy"}}],
                    "status": "success"
                }}]
            })
        );
    }

    #[test]
    fn test_error_envelope_never_has_empty_text() {
        let env = ToolResultEnvelope::error("t1", "  ");
        assert!(env.is_error());
        assert!(matches!(&env.content()[0], ToolResultContent::Text(s) if !s.is_empty()));
    }

    #[test]
    fn test_assistant_message_deserialize() {
        let v = json!({
            "role": "assistant",
            "content": [
                {"text": "Let me check."},
                {"toolUse": {"toolUseId": "t9", "name": "get_weather", "input": {}}}
            ]
        });
        let t: Turn = serde_json::from_value(v).unwrap();
        assert_eq!(t.role, Role::Assistant);
        assert_eq!(t.text(), "Let me check.");
        assert_eq!(t.tool_uses().count(), 1);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let r: Result<Role, _> = serde_json::from_value(json!("system"));
        assert!(r.is_err());
    }
}
