//! 対話ループ: 入力 1 行を 1 ユーザー発話として同じ会話で続ける
//!
//! 致命的エラーでターンが打ち切られた会話は形が崩れている可能性があるので、
//! エラーを報告したうえで新しい会話からやり直す。

use common::conversation::ConversationState;
use common::error::Error;
use common::ports::outbound::{Log, LogLevel, LogRecord};
use common::sink::DeliverySink;
use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::ports::outbound::InterruptChecker;
use crate::usecase::turn_orchestrator::TurnOrchestrator;

const PROMPT: &str = "> ";

/// 行頭のコマンド
#[derive(Debug, Clone, PartialEq)]
enum Line<'a> {
    Skip,
    Exit,
    Reset,
    Message(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    match line.trim() {
        "" => Line::Skip,
        "/exit" | "/quit" => Line::Exit,
        "/reset" => Line::Reset,
        msg => Line::Message(msg),
    }
}

/// 対話セッションの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub completed: usize,
    pub failed: usize,
}

pub struct ChatSession<'a> {
    orchestrator: &'a TurnOrchestrator,
    log: Arc<dyn Log>,
    interrupt: Option<Arc<dyn InterruptChecker>>,
    state: ConversationState,
}

impl<'a> ChatSession<'a> {
    pub fn new(orchestrator: &'a TurnOrchestrator, log: Arc<dyn Log>) -> Self {
        Self {
            orchestrator,
            log,
            interrupt: None,
            state: ConversationState::new(),
        }
    }

    /// 入力待ちとターン開始を通知する先（Ctrl+C の扱いを切り替える）
    pub fn with_interrupt_checker(mut self, checker: Arc<dyn InterruptChecker>) -> Self {
        self.interrupt = Some(checker);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = ConversationState::new();
    }

    /// 入力が尽きるか /exit まで回す
    ///
    /// プロンプトを出すたびに enter_prompt、各ターンの直前に enter_turn を通知する。
    /// エラーは `err_out` に 1 行で書き、セッション自体は続ける。
    pub fn run<R: BufRead>(
        &mut self,
        input: R,
        sink: &mut dyn DeliverySink,
        err_out: &mut dyn Write,
    ) -> Result<ChatSummary, Error> {
        let mut summary = ChatSummary::default();
        self.prompt(err_out)?;
        for line in input.lines() {
            let line = line?;
            match classify(&line) {
                Line::Skip => {}
                Line::Exit => break,
                Line::Reset => {
                    self.reset();
                    writeln!(err_out, "(conversation reset)")?;
                }
                Line::Message(msg) => {
                    if let Some(c) = &self.interrupt {
                        c.enter_turn();
                    }
                    match self.orchestrator.run(&mut self.state, msg, sink) {
                        Ok(_) => summary.completed += 1,
                        Err(e) => {
                            summary.failed += 1;
                            let _ = sink.finish();
                            let _ = self.log.log(
                                &LogRecord::new(LogLevel::Error, e.to_string())
                                    .layer("usecase")
                                    .kind("error")
                                    .field("error_kind", e.kind()),
                            );
                            writeln!(err_out, "converse: {}", e)?;
                            self.reset();
                        }
                    }
                }
            }
            self.prompt(err_out)?;
        }
        Ok(summary)
    }

    fn prompt(&self, err_out: &mut dyn Write) -> Result<(), Error> {
        if let Some(c) = &self.interrupt {
            c.enter_prompt();
        }
        write!(err_out, "{}", PROMPT)?;
        err_out.flush()?;
        Ok(())
    }
}
