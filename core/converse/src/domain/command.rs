//! converse コマンドの enum（Command Pattern）
//!
//! 単発の問い合わせ・対話ループ・受信イベント処理の分岐を enum で明示する。

use std::path::PathBuf;

/// 受信イベントの読み元
#[derive(Debug, Clone, PartialEq)]
pub enum EventSource {
    Stdin,
    File(PathBuf),
}

impl EventSource {
    /// `-` は標準入力
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            EventSource::Stdin
        } else {
            EventSource::File(PathBuf::from(arg))
        }
    }
}

/// converse の実行モード
#[derive(Debug, Clone, PartialEq)]
pub enum ConverseCommand {
    /// ヘルプ表示
    Help,
    /// 登録済みツールの一覧
    ListTools,
    /// WebSocket 受信イベント 1 件を処理する
    HandleEvent(EventSource),
    /// 1 メッセージだけ送って終了
    Ask(String),
    /// 標準入力から 1 行ずつ読む対話ループ
    Repl,
}

impl ConverseCommand {
    /// ログ用の名前
    pub fn name(&self) -> &'static str {
        match self {
            ConverseCommand::Help => "help",
            ConverseCommand::ListTools => "list-tools",
            ConverseCommand::HandleEvent(_) => "event",
            ConverseCommand::Ask(_) => "ask",
            ConverseCommand::Repl => "repl",
        }
    }
}
