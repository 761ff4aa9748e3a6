//! 接続先 push トランスポートを作る Outbound ポート
//!
//! コールバック URL は受信イベントごとに決まるため、トランスポートはイベント単位で作る。

use common::error::Error;
use common::sink::ConnectionTransport;
use std::sync::Arc;

/// コールバック URL から ConnectionTransport を作る能力
pub trait ConnectionTransportFactory: Send + Sync {
    fn for_endpoint(&self, endpoint: &str) -> Result<Arc<dyn ConnectionTransport>, Error>;
}
