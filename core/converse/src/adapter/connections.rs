//! API Gateway の @connections へ push するトランスポートの生成

use common::adapter::ApiGatewayConnections;
use common::error::Error;
use common::sink::ConnectionTransport;
use std::sync::Arc;

use crate::ports::outbound::ConnectionTransportFactory;

/// イベントのコールバック URL ごとに ApiGatewayConnections を作る
pub struct ApiGatewayConnectionFactory {
    api_key_env: Option<String>,
}

impl ApiGatewayConnectionFactory {
    pub fn new(api_key_env: Option<String>) -> Self {
        Self { api_key_env }
    }
}

impl ConnectionTransportFactory for ApiGatewayConnectionFactory {
    fn for_endpoint(&self, endpoint: &str) -> Result<Arc<dyn ConnectionTransport>, Error> {
        Ok(Arc::new(ApiGatewayConnections::new(
            endpoint,
            self.api_key_env.clone(),
        )?))
    }
}
