//! TurnOrchestrator: ストリーム復号 + ツール実行の状態機械
//!
//! AwaitingModel → Streaming → {ToolRequested | Done} → Invoking → AwaitingModel ... → Done。
//! ConversationState の唯一の書き手で、テキスト差分はモデルが出した順に DeliverySink へ転送する。
//! ツール結果は必ず次のモデル呼び出しより前に追記する。

use common::adapter::NoopLog;
use common::config::{ResponseMode, DEFAULT_MAX_TOOL_ROUNDS};
use common::conversation::ConversationState;
use common::error::Error;
use common::llm::decoder::StreamDecoder;
use common::llm::events::{StopReason, StreamDelta, TokenUsage};
use common::llm::request::{ConverseRequest, InferenceConfig, ToolConfig};
use common::llm::transport::InferenceTransport;
use common::msg::{ContentBlock, ToolUse};
use common::ports::outbound::{Log, LogLevel, LogRecord};
use common::sink::DeliverySink;
use common::tool::ToolRegistry;
use std::sync::Arc;

use crate::ports::outbound::InterruptChecker;

/// 本文なしで終わった応答の代わりに履歴へ残すテキスト（配信はしない）
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no response)";

/// 実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// 次のモデル呼び出し待ち
    AwaitingModel,
    /// ストリーム受信中
    Streaming,
    /// モデルがツール呼び出しで止まった
    ToolRequested,
    /// ツール実行中
    Invoking,
    /// 終端（ツール以外の stopReason）
    Done,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::AwaitingModel => "awaiting_model",
            TurnState::Streaming => "streaming",
            TurnState::ToolRequested => "tool_requested",
            TurnState::Invoking => "invoking",
            TurnState::Done => "done",
        }
    }
}

/// 1 回の run の結果
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// 最後の assistant ターンのテキスト
    pub text: String,
    pub stop_reason: StopReason,
    /// 実行したツールの回数
    pub tool_rounds: usize,
    /// 全モデル呼び出しの合計
    pub usage: TokenUsage,
}

/// 1 回のモデル呼び出しで得たもの
struct ModelReply {
    text: String,
    stop_reason: StopReason,
    tool_use: Option<ToolUse>,
    usage: Option<TokenUsage>,
}

pub struct TurnOrchestrator {
    transport: Arc<dyn InferenceTransport>,
    tools: Arc<ToolRegistry>,
    tool_config: ToolConfig,
    model_id: String,
    mode: ResponseMode,
    max_tool_rounds: usize,
    system: Option<String>,
    inference: InferenceConfig,
    log: Arc<dyn Log>,
    interrupt: Option<Arc<dyn InterruptChecker>>,
}

impl TurnOrchestrator {
    /// ツール宣言はここで 1 度だけ組み立て、以降のリクエストすべてで同じものを送る
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        tools: Arc<ToolRegistry>,
        model_id: impl Into<String>,
    ) -> Self {
        let tool_config = tools.tool_config();
        Self {
            transport,
            tools,
            tool_config,
            model_id: model_id.into(),
            mode: ResponseMode::Stream,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            system: None,
            inference: InferenceConfig::default(),
            log: Arc::new(NoopLog),
            interrupt: None,
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// 1 回の run で実行できるツールの上限。超える要求が来たら Error::TurnLimit
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_inference_config(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn Log>) -> Self {
        self.log = log;
        self
    }

    pub fn with_interrupt_checker(mut self, checker: Arc<dyn InterruptChecker>) -> Self {
        self.interrupt = Some(checker);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    fn emit(&self, record: LogRecord) {
        let _ = self.log.log(&record.layer("usecase"));
    }

    fn enter(&self, state: TurnState) {
        self.emit(
            LogRecord::new(LogLevel::Debug, "state")
                .kind("state")
                .field("state", state.as_str()),
        );
    }

    fn check_interrupt(&self) -> Result<(), Error> {
        match &self.interrupt {
            Some(c) if c.is_interrupted() => Err(Error::Interrupted),
            _ => Ok(()),
        }
    }

    fn request<'a>(&'a self, state: &'a ConversationState) -> ConverseRequest<'a> {
        ConverseRequest::new(&self.model_id, state.turns(), &self.tool_config)
            .with_system(self.system.as_deref())
            .with_inference_config(self.inference)
    }

    /// 1 ユーザー発話を処理する
    ///
    /// user ターンを追記してからモデルを呼び、ツール以外の stopReason が来るまで
    /// 「ツール実行 → 結果追記 → 再呼び出し」を繰り返す。
    /// 致命的エラーはそのまま返す。既に Sink へ送ったテキストは取り消さない。
    pub fn run(
        &self,
        state: &mut ConversationState,
        user_message: &str,
        sink: &mut dyn DeliverySink,
    ) -> Result<TurnOutcome, Error> {
        if user_message.trim().is_empty() {
            return Err(Error::invalid_argument("message must not be empty"));
        }
        state.push_user(user_message)?;
        self.emit(
            LogRecord::new(LogLevel::Info, "turn started")
                .kind("turn")
                .field("model", self.model_id.as_str())
                .field("mode", self.mode.as_str())
                .field("history_len", state.len()),
        );

        let mut usage = TokenUsage::default();
        let mut tool_rounds = 0usize;
        let mut first_request = true;
        loop {
            self.enter(TurnState::AwaitingModel);
            self.check_interrupt()?;
            state.ensure_ready_for_request()?;
            let reply = if first_request && self.mode == ResponseMode::ConverseThenStream {
                self.converse_once(state, sink)?
            } else {
                self.enter(TurnState::Streaming);
                self.stream_once(state, sink)?
            };
            first_request = false;
            if let Some(u) = &reply.usage {
                usage.add(u);
            }

            if !reply.stop_reason.is_tool_use() {
                let saved = if reply.text.trim().is_empty() {
                    EMPTY_REPLY_PLACEHOLDER.to_string()
                } else {
                    reply.text.clone()
                };
                state.push_assistant(vec![ContentBlock::Text(saved)])?;
                self.enter(TurnState::Done);
                sink.finish()?;
                self.emit(
                    LogRecord::new(LogLevel::Info, "turn finished")
                        .kind("turn")
                        .field("stop_reason", reply.stop_reason.as_str())
                        .field("tool_rounds", tool_rounds)
                        .field("output_tokens", usage.output_tokens),
                );
                return Ok(TurnOutcome {
                    text: reply.text,
                    stop_reason: reply.stop_reason,
                    tool_rounds,
                    usage,
                });
            }

            self.enter(TurnState::ToolRequested);
            let tool_use = reply.tool_use.ok_or_else(|| {
                Error::protocol("stopReason is tool_use but the response carries no tool use")
            })?;
            if tool_rounds >= self.max_tool_rounds {
                self.emit(
                    LogRecord::new(LogLevel::Warn, "tool round limit reached")
                        .kind("turn")
                        .field("tool", tool_use.name.as_str())
                        .field("max_tool_rounds", self.max_tool_rounds),
                );
                return Err(Error::TurnLimit(self.max_tool_rounds));
            }

            // ツール呼び出し前のテキストも同じ assistant ターンに入れる
            let mut content = Vec::with_capacity(2);
            if !reply.text.trim().is_empty() {
                content.push(ContentBlock::Text(reply.text));
            }
            content.push(ContentBlock::ToolUse(tool_use.clone()));
            state.push_assistant(content)?;

            self.enter(TurnState::Invoking);
            let envelope =
                self.tools
                    .invoke(&tool_use.tool_use_id, &tool_use.name, &tool_use.input)?;
            self.emit(
                LogRecord::new(
                    if envelope.is_error() {
                        LogLevel::Warn
                    } else {
                        LogLevel::Info
                    },
                    "tool invoked",
                )
                .kind("tool")
                .field("tool", tool_use.name.as_str())
                .field("tool_use_id", tool_use.tool_use_id.as_str())
                .field("status", if envelope.is_error() { "error" } else { "success" }),
            );
            state.push_tool_result(envelope)?;
            tool_rounds += 1;
        }
    }

    /// ストリームで 1 回呼び出し、テキスト差分を即座に転送する
    fn stream_once(
        &self,
        state: &ConversationState,
        sink: &mut dyn DeliverySink,
    ) -> Result<ModelReply, Error> {
        let events = self.transport.converse_stream(&self.request(state))?;
        let mut text = String::new();
        for delta in StreamDecoder::new(events) {
            self.check_interrupt()?;
            match delta? {
                StreamDelta::Text(s) => {
                    sink.push(&s)?;
                    text.push_str(&s);
                }
                StreamDelta::ToolUseStart { tool_use_id, name } => {
                    self.emit(
                        LogRecord::new(LogLevel::Debug, "tool use started")
                            .kind("tool")
                            .field("tool", name)
                            .field("tool_use_id", tool_use_id),
                    );
                }
                StreamDelta::Stop(stop) => {
                    return Ok(ModelReply {
                        text,
                        stop_reason: stop.reason,
                        tool_use: stop.tool_use,
                        usage: stop.usage,
                    });
                }
            }
        }
        Err(Error::protocol("stream ended without a stop signal"))
    }

    /// 非ストリームで 1 回呼び出し、テキストがあれば 1 チャンクとして転送する
    fn converse_once(
        &self,
        state: &ConversationState,
        sink: &mut dyn DeliverySink,
    ) -> Result<ModelReply, Error> {
        let output = self.transport.converse(&self.request(state))?;
        let text = output.message.text();
        let (tool_use, extra_tool_use) = {
            let mut uses = output.message.tool_uses();
            (uses.next().cloned(), uses.next().is_some())
        };
        if extra_tool_use {
            return Err(Error::protocol(
                "response carries more than one tool use; one tool per turn",
            ));
        }
        if !text.is_empty() {
            sink.push(&text)?;
        }
        Ok(ModelReply {
            text,
            stop_reason: output.stop_reason,
            tool_use,
            usage: output.usage,
        })
    }
}
