//! テスト用: 台本どおりの応答を返す InferenceTransport 実装

#[cfg(test)]
mod stub {
    use common::error::Error;
    use common::llm::events::{
        BlockDelta, BlockStart, ContentBlockDeltaEvent, ContentBlockStartEvent,
        ContentBlockStopEvent, ConverseStreamEvent, MessageStartEvent, MessageStopEvent,
        MetadataEvent, StopReason, TokenUsage, ToolUseDelta, ToolUseStart,
    };
    use common::llm::request::{ConverseOutput, ConverseRequest};
    use common::llm::transport::{EventStream, InferenceTransport};
    use common::msg::{ContentBlock, Role, ToolUse, Turn};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 1 リクエスト分の台本
    pub enum Script {
        /// converse_stream で返すイベント列（Err を混ぜると途中で転送エラー）
        Stream(Vec<Result<ConverseStreamEvent, Error>>),
        /// converse で返す応答
        Converse(ConverseOutput),
        /// リクエスト自体の失敗
        Fail(Error),
    }

    /// 台本を先頭から 1 つずつ消費する Stub。受け取ったリクエストは JSON で記録する。
    pub struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    /// 記録したリクエスト
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub operation: &'static str,
        pub model_id: String,
        pub body: Value,
    }

    impl ScriptedTransport {
        pub fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// 使われずに残った台本の数
        pub fn remaining(&self) -> usize {
            self.scripts.lock().unwrap().len()
        }

        fn next(&self, operation: &'static str, request: &ConverseRequest<'_>) -> Script {
            let body = serde_json::from_str(&request.to_json().unwrap()).unwrap();
            self.requests.lock().unwrap().push(RecordedRequest {
                operation,
                model_id: request.model_id.to_string(),
                body,
            });
            self.scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Script::Fail(Error::transport("script exhausted")))
        }
    }

    impl InferenceTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn converse(&self, request: &ConverseRequest<'_>) -> Result<ConverseOutput, Error> {
            match self.next("converse", request) {
                Script::Converse(out) => Ok(out),
                Script::Fail(e) => Err(e),
                Script::Stream(_) => Err(Error::transport("script expected converse_stream")),
            }
        }

        fn converse_stream(&self, request: &ConverseRequest<'_>) -> Result<EventStream, Error> {
            match self.next("converse_stream", request) {
                Script::Stream(events) => Ok(Box::new(events.into_iter())),
                Script::Fail(e) => Err(e),
                Script::Converse(_) => Err(Error::transport("script expected converse")),
            }
        }
    }

    pub fn message_start() -> ConverseStreamEvent {
        ConverseStreamEvent::MessageStart(MessageStartEvent {
            role: Role::Assistant,
        })
    }

    pub fn text(s: &str) -> ConverseStreamEvent {
        ConverseStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
            delta: BlockDelta::Text(s.to_string()),
            content_block_index: 0,
        })
    }

    pub fn tool_start(tool_use_id: &str, name: &str) -> ConverseStreamEvent {
        ConverseStreamEvent::ContentBlockStart(ContentBlockStartEvent {
            start: BlockStart::ToolUse(ToolUseStart {
                tool_use_id: tool_use_id.to_string(),
                name: name.to_string(),
            }),
            content_block_index: 1,
        })
    }

    pub fn tool_input(fragment: &str) -> ConverseStreamEvent {
        ConverseStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
            delta: BlockDelta::ToolUse(ToolUseDelta {
                input: fragment.to_string(),
            }),
            content_block_index: 1,
        })
    }

    pub fn block_stop(index: u32) -> ConverseStreamEvent {
        ConverseStreamEvent::ContentBlockStop(ContentBlockStopEvent {
            content_block_index: index,
        })
    }

    pub fn message_stop(reason: &str) -> ConverseStreamEvent {
        ConverseStreamEvent::MessageStop(MessageStopEvent {
            stop_reason: StopReason::from(reason.to_string()),
        })
    }

    pub fn metadata(input_tokens: u64, output_tokens: u64) -> ConverseStreamEvent {
        ConverseStreamEvent::Metadata(MetadataEvent {
            usage: Some(TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            }),
            metrics: None,
        })
    }

    /// テキストだけの応答（end_turn）
    pub fn text_stream(chunks: &[&str]) -> Script {
        let mut events = vec![Ok(message_start())];
        events.extend(chunks.iter().map(|c| Ok(text(c))));
        events.push(Ok(block_stop(0)));
        events.push(Ok(message_stop("end_turn")));
        events.push(Ok(metadata(10, 5)));
        Script::Stream(events)
    }

    /// 前置きテキスト + ツール呼び出し（引数は断片で届く）
    pub fn tool_stream(preamble: &str, tool_use_id: &str, name: &str, fragments: &[&str]) -> Script {
        let mut events = vec![Ok(message_start())];
        if !preamble.is_empty() {
            events.push(Ok(text(preamble)));
            events.push(Ok(block_stop(0)));
        }
        events.push(Ok(tool_start(tool_use_id, name)));
        events.extend(fragments.iter().map(|f| Ok(tool_input(f))));
        events.push(Ok(block_stop(1)));
        events.push(Ok(message_stop("tool_use")));
        events.push(Ok(metadata(20, 8)));
        Script::Stream(events)
    }

    /// 非ストリーム応答
    pub fn converse_output(blocks: Vec<ContentBlock>, reason: &str) -> Script {
        Script::Converse(ConverseOutput {
            message: Turn::assistant(blocks),
            stop_reason: StopReason::from(reason.to_string()),
            usage: Some(TokenUsage {
                input_tokens: 7,
                output_tokens: 3,
                total_tokens: 10,
            }),
        })
    }

    pub fn tool_use_block(tool_use_id: &str, name: &str, input: Value) -> ContentBlock {
        ContentBlock::ToolUse(ToolUse {
            tool_use_id: tool_use_id.to_string(),
            name: name.to_string(),
            input,
        })
    }
}

#[cfg(test)]
pub use stub::*;
