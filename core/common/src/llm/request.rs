//! 推論リクエスト / 非ストリーミング応答の型

use crate::error::Error;
use crate::llm::events::{StopReason, TokenUsage};
use crate::msg::{Role, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ツール宣言 1 件分（inputSchema は静的に宣言した JSON Schema）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecWire {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSchema {
    pub json: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEntry {
    pub tool_spec: ToolSpecWire,
}

/// リクエストに載せる toolConfig
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolConfig {
    pub tools: Vec<ToolEntry>,
}

impl ToolConfig {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl InferenceConfig {
    fn is_unset(&self) -> bool {
        self.max_tokens.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemBlock {
    pub text: String,
}

/// Converse / ConverseStream のリクエスト本体（モデル id は URL に載るので本体には含めない）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest<'a> {
    #[serde(skip)]
    pub model_id: &'a str,
    pub messages: &'a [Turn],
    #[serde(skip_serializing_if = "tool_config_is_empty")]
    pub tool_config: &'a ToolConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    #[serde(skip_serializing_if = "inference_is_unset")]
    pub inference_config: InferenceConfig,
}

fn tool_config_is_empty(c: &&ToolConfig) -> bool {
    c.is_empty()
}

fn inference_is_unset(c: &InferenceConfig) -> bool {
    c.is_unset()
}

impl<'a> ConverseRequest<'a> {
    pub fn new(model_id: &'a str, messages: &'a [Turn], tool_config: &'a ToolConfig) -> Self {
        Self {
            model_id,
            messages,
            tool_config,
            system: Vec::new(),
            inference_config: InferenceConfig::default(),
        }
    }

    pub fn with_system(mut self, system: Option<&str>) -> Self {
        self.system = system
            .filter(|s| !s.trim().is_empty())
            .map(|s| vec![SystemBlock { text: s.to_string() }])
            .unwrap_or_default();
        self
    }

    pub fn with_inference_config(mut self, config: InferenceConfig) -> Self {
        self.inference_config = config;
        self
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::json(format!("Failed to serialize request: {}", e)))
    }
}

/// 非ストリーミング応答
#[derive(Debug, Clone, PartialEq)]
pub struct ConverseOutput {
    pub message: Turn,
    pub stop_reason: StopReason,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutputRaw {
    output: OutputRaw,
    #[serde(rename = "stopReason")]
    stop_reason: StopReason,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct OutputRaw {
    message: Option<Turn>,
}

impl ConverseOutput {
    /// Converse 応答 JSON を解釈する
    pub fn parse(response_json: &str) -> Result<Self, Error> {
        let raw: ConverseOutputRaw = serde_json::from_str(response_json)
            .map_err(|e| Error::protocol(format!("Failed to parse converse response: {}", e)))?;
        let message = raw
            .output
            .message
            .ok_or_else(|| Error::protocol("converse response has no output.message"))?;
        if message.role != Role::Assistant {
            return Err(Error::protocol("converse response message is not from the assistant"));
        }
        Ok(Self {
            message,
            stop_reason: raw.stop_reason,
            usage: raw.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Turn::user("hi")];
        let tools = ToolConfig {
            tools: vec![ToolEntry {
                tool_spec: ToolSpecWire {
                    name: "get_weather".to_string(),
                    description: "Get the current weather in given location".to_string(),
                    input_schema: InputSchema {
                        json: json!({"type": "object", "properties": {}}),
                    },
                },
            }],
        };
        let req = ConverseRequest::new("anthropic.claude-3-haiku-20240307-v1:0", &messages, &tools)
            .with_system(Some("be brief"))
            .with_inference_config(InferenceConfig {
                max_tokens: Some(512),
                temperature: None,
            });
        let v: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert!(v.get("modelId").is_none());
        assert_eq!(v["messages"][0]["content"][0]["text"], "hi");
        assert_eq!(v["toolConfig"]["tools"][0]["toolSpec"]["name"], "get_weather");
        assert_eq!(
            v["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["type"],
            "object"
        );
        assert_eq!(v["system"][0]["text"], "be brief");
        assert_eq!(v["inferenceConfig"], json!({"maxTokens": 512}));
    }

    #[test]
    fn test_request_omits_empty_parts() {
        let messages = vec![Turn::user("hi")];
        let tools = ToolConfig::default();
        let req = ConverseRequest::new("m", &messages, &tools).with_system(Some("  "));
        let v: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert!(v.get("toolConfig").is_none());
        assert!(v.get("system").is_none());
        assert!(v.get("inferenceConfig").is_none());
    }

    #[test]
    fn test_parse_converse_output_with_tool_use() {
        let body = json!({
            "output": {"message": {"role": "assistant", "content": [
                {"toolUse": {"toolUseId": "t1", "name": "get_weather", "input": {"latitude": 34.6}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 1, "outputTokens": 2, "totalTokens": 3}
        })
        .to_string();
        let out = ConverseOutput::parse(&body).unwrap();
        assert_eq!(out.stop_reason, StopReason::ToolUse);
        assert_eq!(out.message.tool_uses().next().unwrap().name, "get_weather");
        assert_eq!(out.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn test_parse_converse_output_missing_message() {
        let body = r#"{"output":{},"stopReason":"end_turn"}"#;
        assert!(matches!(
            ConverseOutput::parse(body),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
