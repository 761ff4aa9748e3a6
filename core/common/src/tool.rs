//! ツール実行の Ports & Adapters（trait で副作用隔離）
//!
//! ToolRegistry で name -> Arc<dyn Tool> を解決する。登録は起動時だけで、以降は Arc で共有する
//! 読み取り専用の表として扱う（会話間で同時に参照してもロック不要）。
//! 実行エラーはここで ToolResultEnvelope(status=error) に変換し、呼び出し元へは上げない。

use crate::error::Error;
use crate::llm::request::{InputSchema, ToolConfig, ToolEntry, ToolSpecWire};
use crate::msg::ToolResultEnvelope;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// ツール実行エラー（ドメイン層）
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// ツールの宣言（名前・説明・入力スキーマ）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// `{"type": "object", "properties": {...}}` 形式の JSON Schema
    pub input_schema: Value,
}

/// ツールのトレイト
pub trait Tool: Send + Sync {
    /// 宣言（name はモデルへの toolConfig と一致させる）
    fn spec(&self) -> ToolSpec;
    /// 入力で実行し、JSON 結果を返す
    fn call(&self, input: &Value) -> Result<Value, ToolError>;
}

/// ツール名で解決するレジストリ
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.spec().name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// モデルへ渡す toolConfig
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            tools: self
                .specs()
                .into_iter()
                .map(|s| ToolEntry {
                    tool_spec: ToolSpecWire {
                        name: s.name.to_string(),
                        description: s.description.to_string(),
                        input_schema: InputSchema {
                            json: s.input_schema,
                        },
                    },
                })
                .collect(),
        }
    }

    /// ツールを実行して ToolResultEnvelope を返す
    ///
    /// 未登録の名前は `Error::ToolLookup`。実行失敗は status=error の envelope として `Ok` で返す。
    pub fn invoke(
        &self,
        tool_use_id: &str,
        name: &str,
        input: &Value,
    ) -> Result<ToolResultEnvelope, Error> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolLookup(name.to_string()))?;
        Ok(match tool.call(input) {
            Ok(value) => ToolResultEnvelope::success(tool_use_id, value),
            Err(e) => ToolResultEnvelope::error(tool_use_id, e.to_string()),
        })
    }
}
