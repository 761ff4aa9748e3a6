//! StreamDecoder: ワイヤイベント列 → 意味的差分列
//!
//! 1 リクエストにつき 1 回だけ消費される遅延・単一パスの Iterator。
//! ツール引数の断片は ToolCallAccumulator に溜め、messageStop で stopReason が tool_use のときに
//! まとめて JSON として解釈する。アキュムレータは decoder ごとに持ち、会話間で共有しない。

use crate::error::Error;
use crate::llm::events::{
    BlockDelta, BlockStart, ConverseStreamEvent, StopReason, StreamDelta, StreamStop, TokenUsage,
};
use crate::msg::ToolUse;
use serde_json::Value;

/// ストリーム中に蓄積するツール呼び出し（id / name / 引数 JSON 断片）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallAccumulator {
    tool_use_id: String,
    name: String,
    input_buffer: String,
}

impl ToolCallAccumulator {
    pub fn new(tool_use_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            name: name.into(),
            input_buffer: String::new(),
        }
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.input_buffer.push_str(fragment);
    }

    pub fn buffer(&self) -> &str {
        &self.input_buffer
    }

    /// 引数を確定させて ToolUse にする（消費）
    ///
    /// 断片が 1 つも来なかった場合（引数なしツール）は空オブジェクト。
    pub fn finish(self) -> Result<ToolUse, Error> {
        let input = if self.input_buffer.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.input_buffer).map_err(|e| {
                Error::protocol(format!(
                    "invalid tool input JSON for {} ({}): {}",
                    self.name, self.tool_use_id, e
                ))
            })?
        };
        Ok(ToolUse {
            tool_use_id: self.tool_use_id,
            name: self.name,
            input,
        })
    }
}

/// ワイヤイベントの Iterator を StreamDelta の Iterator に変換する
pub struct StreamDecoder<I> {
    events: I,
    accumulator: Option<ToolCallAccumulator>,
    stop_reason: Option<StopReason>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl<I> StreamDecoder<I>
where
    I: Iterator<Item = Result<ConverseStreamEvent, Error>>,
{
    pub fn new(events: I) -> Self {
        Self {
            events,
            accumulator: None,
            stop_reason: None,
            usage: None,
            finished: false,
        }
    }

    fn fail(&mut self, e: Error) -> Option<Result<StreamDelta, Error>> {
        self.finished = true;
        Some(Err(e))
    }

    /// ストリーム終端で Stop を組み立てる
    fn finish_stream(&mut self) -> Result<StreamDelta, Error> {
        let reason = self
            .stop_reason
            .take()
            .ok_or_else(|| Error::protocol("stream ended without messageStop"))?;
        let tool_use = if reason.is_tool_use() {
            let acc = self.accumulator.take().ok_or_else(|| {
                Error::protocol("stopReason is tool_use but no tool use block was started")
            })?;
            Some(acc.finish()?)
        } else {
            None
        };
        Ok(StreamDelta::Stop(StreamStop {
            reason,
            tool_use,
            usage: self.usage.take(),
        }))
    }

    /// 1 イベントを処理し、外へ出す差分があれば返す
    fn on_event(&mut self, ev: ConverseStreamEvent) -> Result<Option<StreamDelta>, Error> {
        if let Some((kind, message)) = ev.exception() {
            return Err(Error::transport(format!("{}: {}", kind, message)));
        }
        if self.stop_reason.is_some() {
            // messageStop 以降は metadata だけを受け付ける
            return match ev {
                ConverseStreamEvent::Metadata(m) => {
                    self.usage = m.usage;
                    Ok(None)
                }
                ConverseStreamEvent::MessageStop(_) => {
                    Err(Error::protocol("duplicate messageStop"))
                }
                _ => Ok(None),
            };
        }
        match ev {
            ConverseStreamEvent::MessageStart(_) | ConverseStreamEvent::ContentBlockStop(_) => {
                Ok(None)
            }
            ConverseStreamEvent::ContentBlockStart(start) => {
                let t = match start.start {
                    BlockStart::ToolUse(t) => t,
                    BlockStart::Other(_) => return Ok(None),
                };
                if let Some(active) = &self.accumulator {
                    return Err(Error::protocol(format!(
                        "second tool use {} while {} is active; one tool per turn",
                        t.tool_use_id, active.tool_use_id
                    )));
                }
                self.accumulator = Some(ToolCallAccumulator::new(&t.tool_use_id, &t.name));
                Ok(Some(StreamDelta::ToolUseStart {
                    tool_use_id: t.tool_use_id,
                    name: t.name,
                }))
            }
            ConverseStreamEvent::ContentBlockDelta(d) => match d.delta {
                // 空の断片は配信先へ送らない
                BlockDelta::Text(s) if s.is_empty() => Ok(None),
                BlockDelta::Text(s) => Ok(Some(StreamDelta::Text(s))),
                BlockDelta::ToolUse(t) => match self.accumulator.as_mut() {
                    Some(acc) => {
                        acc.push_fragment(&t.input);
                        Ok(None)
                    }
                    None => Err(Error::protocol(
                        "tool input fragment without a started tool use block",
                    )),
                },
                BlockDelta::ReasoningContent(_) => Ok(None),
            },
            ConverseStreamEvent::MessageStop(stop) => {
                self.stop_reason = Some(stop.stop_reason);
                Ok(None)
            }
            ConverseStreamEvent::Metadata(m) => {
                self.usage = m.usage;
                Ok(None)
            }
            // exception() で処理済み
            ConverseStreamEvent::InternalServerException(_)
            | ConverseStreamEvent::ModelStreamErrorException(_)
            | ConverseStreamEvent::ValidationException(_)
            | ConverseStreamEvent::ThrottlingException(_)
            | ConverseStreamEvent::ServiceUnavailableException(_) => Ok(None),
            ConverseStreamEvent::Unknown(_) => Ok(None),
        }
    }
}

impl<I> Iterator for StreamDecoder<I>
where
    I: Iterator<Item = Result<ConverseStreamEvent, Error>>,
{
    type Item = Result<StreamDelta, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.events.next() {
                Some(Ok(ev)) => match self.on_event(ev) {
                    Ok(Some(delta)) => return Some(Ok(delta)),
                    Ok(None) => continue,
                    Err(e) => return self.fail(e),
                },
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.finished = true;
                    return Some(self.finish_stream());
                }
            }
        }
    }
}
