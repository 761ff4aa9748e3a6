//! Ports & Adapters のポート定義
//!
//! - inbound: ドライバ（CLI / 受信イベント）がアプリを呼び出す口
//! - outbound: アプリが外界に依頼するための trait（converse 固有のもの）

pub mod inbound;
pub mod outbound;
