//! converse 共通ライブラリ
//!
//! 会話状態・ストリーム復号・ツール実行・配信 Sink など、`converse` コマンドと
//! 組み込み利用者で共有される機能を提供します。

/// エラーハンドリング
pub mod error;

/// 会話のメッセージ型
pub mod msg;

/// 会話状態（ターン列と不変条件）
pub mod conversation;

/// 推論 API（リクエスト・ストリーム復号・転送）
pub mod llm;

/// ツールの宣言と実行
pub mod tool;

/// 配信 Sink
pub mod sink;

/// 設定ファイル・環境変数
pub mod config;

/// Ports & Adapters のポート定義
pub mod ports;

/// 標準アダプター（ログ・接続先 push）
pub mod adapter;
