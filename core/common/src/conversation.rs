//! ConversationState: 追記専用・順序保持の会話ログ
//!
//! 推論エンドポイントはターンを位置で解釈するため、挿入順がそのまま意味を持つ。
//! 書き込みはオーケストレータだけが行い、形の契約（ToolUse の直後に同じ id の ToolResult）を
//! 追記時点で検査して、違反したら即座にエラーにする。

use crate::error::Error;
use crate::msg::{ContentBlock, Role, ToolResultEnvelope, ToolUse, Turn};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// 直前の assistant ターンが ToolUse で終わり、まだ結果が追記されていなければその ToolUse
    pub fn pending_tool_use(&self) -> Option<&ToolUse> {
        let last = self.turns.last()?;
        if last.role != Role::Assistant {
            return None;
        }
        last.tool_uses().next()
    }

    /// ユーザー発話を追記する
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<(), Error> {
        if let Some(pending) = self.pending_tool_use() {
            return Err(Error::protocol(format!(
                "tool use {} has no result; cannot append a user message",
                pending.tool_use_id
            )));
        }
        if let Some(last) = self.turns.last() {
            if last.role != Role::Assistant {
                return Err(Error::protocol(
                    "user message must follow an assistant turn",
                ));
            }
        }
        self.turns.push(Turn::user(text));
        Ok(())
    }

    /// assistant ターンを追記する（ToolUse は 1 ブロックまで）
    pub fn push_assistant(&mut self, content: Vec<ContentBlock>) -> Result<(), Error> {
        match self.turns.last().map(|t| t.role) {
            Some(Role::User) | Some(Role::ToolResultCarrier) => {}
            Some(Role::Assistant) => {
                return Err(Error::protocol("assistant turn must follow a user turn"));
            }
            None => {
                return Err(Error::protocol("conversation must start with a user turn"));
            }
        }
        if content.is_empty() {
            return Err(Error::protocol("assistant turn has no content"));
        }
        // 空白だけの text ブロックは推論 API が受け付けない
        if content
            .iter()
            .any(|b| matches!(b, ContentBlock::Text(t) if t.trim().is_empty()))
        {
            return Err(Error::protocol("assistant turn has a blank text block"));
        }
        let tool_uses = content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse(_)))
            .count();
        if tool_uses > 1 {
            return Err(Error::protocol(format!(
                "assistant turn has {} tool uses; only one per turn is supported",
                tool_uses
            )));
        }
        if content.iter().any(|b| matches!(b, ContentBlock::ToolResult(_))) {
            return Err(Error::protocol("assistant turn cannot carry a tool result"));
        }
        self.turns.push(Turn::assistant(content));
        Ok(())
    }

    /// ToolResult を運ぶターンを追記する。直前の ToolUse と id が一致しなければエラー。
    pub fn push_tool_result(&mut self, envelope: ToolResultEnvelope) -> Result<(), Error> {
        let expected = self
            .pending_tool_use()
            .map(|t| t.tool_use_id.clone())
            .ok_or_else(|| {
                Error::protocol(format!(
                    "tool result {} has no preceding tool use",
                    envelope.tool_use_id()
                ))
            })?;
        if expected != envelope.tool_use_id() {
            return Err(Error::protocol(format!(
                "tool result id {} does not match tool use id {}",
                envelope.tool_use_id(),
                expected
            )));
        }
        self.turns.push(Turn::tool_result(envelope));
        Ok(())
    }

    /// 次のモデルリクエストを出せる状態か（最後が user 側で、未解決の ToolUse が無い）
    pub fn ensure_ready_for_request(&self) -> Result<(), Error> {
        match self.turns.last().map(|t| t.role) {
            None => Err(Error::protocol("conversation is empty")),
            Some(Role::Assistant) => {
                if let Some(pending) = self.pending_tool_use() {
                    Err(Error::protocol(format!(
                        "tool use {} has no result",
                        pending.tool_use_id
                    )))
                } else {
                    Err(Error::protocol("last turn is from the assistant"))
                }
            }
            Some(_) => Ok(()),
        }
    }

    /// 全体を走査して、各 ToolUse の直後のターンに同じ id の ToolResult があるかを検査する
    pub fn validate(&self) -> Result<(), Error> {
        for (i, turn) in self.turns.iter().enumerate() {
            for tool_use in turn.tool_uses() {
                let answered = self
                    .turns
                    .get(i + 1)
                    .map(|next| {
                        next.tool_results()
                            .any(|r| r.tool_use_id() == tool_use.tool_use_id)
                    })
                    .unwrap_or(false);
                // 末尾の ToolUse は呼び出し中なので許容する
                if !answered && i + 1 < self.turns.len() {
                    return Err(Error::protocol(format!(
                        "tool use {} at turn {} is not answered by the next turn",
                        tool_use.tool_use_id, i
                    )));
                }
            }
        }
        Ok(())
    }
}
