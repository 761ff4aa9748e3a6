//! 配線: 設定を解決し、標準アダプタで TurnOrchestrator 等を組み立てる

use std::sync::Arc;

use common::adapter::{FanoutLog, FileJsonLog, StderrLog};
use common::config::{resolve_config_path, std_env, ConverseConfig};
use common::error::Error;
use common::llm::http::HttpConverseTransport;
use common::llm::request::InferenceConfig;
use common::ports::outbound::{Log, LogLevel, LogRecord};
use common::tool::ToolRegistry;

use crate::adapter::{builtin_registry, ApiGatewayConnectionFactory, NoopInterruptChecker, SigintChecker};
use crate::cli::Config;
use crate::ports::outbound::InterruptChecker;
use crate::usecase::inbound::InboundHandler;
use crate::usecase::turn_orchestrator::TurnOrchestrator;

/// 組み立て済みのアプリ
pub struct App {
    pub config: ConverseConfig,
    pub log: Arc<dyn Log>,
    pub tools: Arc<ToolRegistry>,
    pub orchestrator: Arc<TurnOrchestrator>,
    /// SIGINT ハンドラを登録できなかったときや非対話では NoopInterruptChecker
    pub interrupt: Arc<dyn InterruptChecker>,
}

impl App {
    /// 受信イベント用のハンドラ（イベントごとに接続先が変わるのでファクトリを渡す）
    pub fn inbound_handler(&self) -> InboundHandler {
        InboundHandler::new(
            Arc::clone(&self.orchestrator),
            Arc::new(ApiGatewayConnectionFactory::new(
                self.config.connections_api_key_env.clone(),
            )),
            Arc::clone(&self.log),
        )
    }
}

/// 設定ファイル → 環境変数 → CLI 引数の順に重ねる
pub fn resolve_config(cli: &Config) -> Result<ConverseConfig, Error> {
    let path = match &cli.config_path {
        Some(p) => p.clone(),
        None => resolve_config_path(&std_env)?,
    };
    let mut cfg = ConverseConfig::load(&path)?;
    cfg.apply_env(&std_env)?;
    if let Some(model) = &cli.model {
        cfg.default_model = model.clone();
    }
    if let Some(mode) = cli.mode {
        cfg.mode = mode;
    }
    if let Some(n) = cli.max_tool_rounds {
        cfg.max_tool_rounds = n;
    }
    if cli.system.is_some() {
        cfg.system = cli.system.clone();
    }
    Ok(cfg)
}

fn build_log(cfg: &ConverseConfig, verbose: bool) -> Arc<dyn Log> {
    let stderr_level = if verbose { LogLevel::Debug } else { LogLevel::Warn };
    let mut logs: Vec<Arc<dyn Log>> = vec![Arc::new(StderrLog::new(stderr_level))];
    if let Some(path) = &cfg.log_file {
        logs.push(Arc::new(FileJsonLog::new(path)));
    }
    Arc::new(FanoutLog::new(logs))
}

/// 配線: 標準アダプタで App を組み立てる
///
/// `interactive` のときだけ SIGINT ハンドラを登録する。
pub fn wire_converse(cli: &Config, interactive: bool) -> Result<App, Error> {
    let config = resolve_config(cli)?;
    let log = build_log(&config, cli.verbose);
    let tools = Arc::new(builtin_registry());
    let transport = Arc::new(HttpConverseTransport::new(
        config.endpoint_url(),
        Some(config.api_key_env.clone()),
        None,
    )?);

    let interrupt: Arc<dyn InterruptChecker> = if interactive {
        match SigintChecker::new() {
            Ok(c) => Arc::new(c),
            Err(e) => {
                let _ = log.log(
                    &LogRecord::new(LogLevel::Warn, format!("Ctrl+C handler not installed: {}", e))
                        .layer("cli")
                        .kind("lifecycle"),
                );
                Arc::new(NoopInterruptChecker)
            }
        }
    } else {
        Arc::new(NoopInterruptChecker)
    };

    let orchestrator = TurnOrchestrator::new(transport, Arc::clone(&tools), config.default_model_id())
        .with_mode(config.mode)
        .with_max_tool_rounds(config.max_tool_rounds)
        .with_system(config.system.clone())
        .with_inference_config(InferenceConfig {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
        .with_log(Arc::clone(&log))
        .with_interrupt_checker(Arc::clone(&interrupt));

    Ok(App {
        config,
        log,
        tools,
        orchestrator: Arc::new(orchestrator),
        interrupt,
    })
}
