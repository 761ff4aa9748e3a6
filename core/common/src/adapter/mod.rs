//! アダプター（ログ出力先・接続先 push の標準実装）
//!
//! usecase は Log / ConnectionTransport trait 経由でのみ外界に触れる。テストでは NoopLog / MemoryLog を注入する。

pub mod api_gateway;
pub mod file_json_log;
pub mod stderr_log;

pub use api_gateway::ApiGatewayConnections;
pub use file_json_log::{FileJsonLog, NoopLog};
pub use stderr_log::{format_human, FanoutLog, MemoryLog, StderrLog};
