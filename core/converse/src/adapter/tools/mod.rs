//! ツール実装（adapter 層）

pub(crate) mod get_weather;

pub(crate) use get_weather::GetWeatherTool;

use common::tool::ToolRegistry;
use std::sync::Arc;

/// 組み込みツールを登録したレジストリ（起動時に 1 回だけ作り、以降は読み取り専用で共有する）
pub(crate) fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetWeatherTool::new()));
    registry
}
