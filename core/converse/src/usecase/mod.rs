//! ユースケース層: 会話ターンの実行と、その呼び出し口（対話ループ・受信イベント）

pub(crate) mod chat;
pub(crate) mod inbound;
pub(crate) mod turn_orchestrator;
