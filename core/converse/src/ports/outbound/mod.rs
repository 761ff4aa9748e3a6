//! Outbound ポート: 割り込み検知・接続先トランスポート生成など converse 固有の外界依存
//!
//! ログ・推論トランスポート・配信は common::ports::outbound を使う。

pub mod connection_factory;
pub mod interrupt_checker;

pub use connection_factory::ConnectionTransportFactory;
pub use interrupt_checker::InterruptChecker;
