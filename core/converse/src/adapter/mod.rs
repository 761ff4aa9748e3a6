pub(crate) mod connections;
pub(crate) mod sigint_checker;
pub(crate) mod sinks;
pub(crate) mod stub_transport;
pub(crate) mod tools;

pub(crate) use connections::ApiGatewayConnectionFactory;
pub(crate) use sigint_checker::{NoopInterruptChecker, SigintChecker};
pub(crate) use sinks::StdoutSink;
pub(crate) use tools::builtin_registry;
