//! config.json の読み込みと実行時設定の解決
//!
//! 優先順位: CLI 引数 > 環境変数 > config.json > 組み込みデフォルト。
//! 環境変数の読み取りは `&dyn Fn(&str) -> Option<String>` で注入する（テストで差し替えられるように）。

use crate::error::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
pub const DEFAULT_MODEL: &str = "claude-3-sonnet";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// 組み込みのモデル別名
const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("claude-3-haiku", "anthropic.claude-3-haiku-20240307-v1:0"),
    ("claude-3-sonnet", "anthropic.claude-3-sonnet-20240229-v1:0"),
];

/// 応答の取り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// すべてのモデル呼び出しをストリームで行う
    #[default]
    Stream,
    /// 最初の 1 回だけ非ストリームで呼び、ツールを使わなければそのテキストを 1 チャンクで配信する
    ConverseThenStream,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Stream => "stream",
            ResponseMode::ConverseThenStream => "converse_then_stream",
        }
    }
}

impl std::str::FromStr for ResponseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stream" => Ok(ResponseMode::Stream),
            "converse_then_stream" | "hybrid" => Ok(ResponseMode::ConverseThenStream),
            other => Err(Error::invalid_argument(format!(
                "Unknown mode: {} (expected stream or converse_then_stream)",
                other
            ))),
        }
    }
}

/// 解決済みの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ConverseConfig {
    /// 推論 API のベース URL（None なら region から組み立てる）
    pub endpoint: Option<String>,
    pub region: String,
    /// Bearer キーを読む環境変数名
    pub api_key_env: String,
    /// 別名またはモデル id
    pub default_model: String,
    /// 別名 -> モデル id（組み込み別名を含む）
    pub models: BTreeMap<String, String>,
    pub mode: ResponseMode,
    pub max_tool_rounds: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
    pub log_file: Option<PathBuf>,
    /// 接続先 push 用の Bearer キーを読む環境変数名（None なら認証ヘッダを付けない）
    pub connections_api_key_env: Option<String>,
}

impl Default for ConverseConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            models: builtin_models(),
            mode: ResponseMode::Stream,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tokens: None,
            temperature: None,
            system: None,
            log_file: None,
            connections_api_key_env: None,
        }
    }
}

fn builtin_models() -> BTreeMap<String, String> {
    BUILTIN_MODELS
        .iter()
        .map(|(a, id)| (a.to_string(), id.to_string()))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConverseConfigRaw {
    #[serde(alias = "base_url")]
    endpoint: Option<String>,
    #[serde(alias = "aws_region")]
    region: Option<String>,
    api_key_env: Option<String>,
    #[serde(alias = "model")]
    default_model: Option<String>,
    models: Option<BTreeMap<String, String>>,
    #[serde(alias = "response_mode")]
    mode: Option<String>,
    #[serde(alias = "max_tool_calls")]
    max_tool_rounds: Option<usize>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    #[serde(alias = "system_prompt")]
    system: Option<String>,
    log_file: Option<PathBuf>,
    connections_api_key_env: Option<String>,
}

impl ConverseConfig {
    /// JSON 文字列からパース（未指定の項目はデフォルト）
    pub fn parse(json: &str) -> Result<Self, Error> {
        let raw: ConverseConfigRaw = serde_json::from_str(json)?;
        let mut cfg = ConverseConfig::default();
        if let Some(models) = raw.models {
            cfg.models.extend(models);
        }
        if let Some(mode) = raw.mode {
            cfg.mode = mode.parse().map_err(|e: Error| Error::config(e.to_string()))?;
        }
        if let Some(n) = raw.max_tool_rounds {
            cfg.max_tool_rounds = n;
        }
        cfg.endpoint = raw.endpoint.or(cfg.endpoint);
        cfg.region = raw.region.unwrap_or(cfg.region);
        cfg.api_key_env = raw.api_key_env.unwrap_or(cfg.api_key_env);
        cfg.default_model = raw.default_model.unwrap_or(cfg.default_model);
        cfg.max_tokens = raw.max_tokens;
        cfg.temperature = raw.temperature;
        cfg.system = raw.system.filter(|s| !s.trim().is_empty());
        cfg.log_file = raw.log_file;
        cfg.connections_api_key_env = raw.connections_api_key_env;
        Ok(cfg)
    }

    /// ファイルから読む。ファイルが無ければデフォルト、壊れていれば Err（メッセージにパスを含める）
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(ConverseConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io_msg(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// 環境変数での上書き（CONVERSE_MODEL / CONVERSE_ENDPOINT / CONVERSE_MAX_TOOL_ROUNDS）
    pub fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(m) = non_empty(env("CONVERSE_MODEL")) {
            self.default_model = m;
        }
        if let Some(e) = non_empty(env("CONVERSE_ENDPOINT")) {
            self.endpoint = Some(e);
        }
        if let Some(n) = non_empty(env("CONVERSE_MAX_TOOL_ROUNDS")) {
            self.max_tool_rounds = n.trim().parse().map_err(|_| {
                Error::config(format!("CONVERSE_MAX_TOOL_ROUNDS must be a number: {}", n))
            })?;
        }
        Ok(())
    }

    /// 推論 API のベース URL
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }

    /// 別名をモデル id へ。未知の文字列はそのまま返す。
    pub fn resolve_model_id(&self, alias_or_id: &str) -> String {
        self.models
            .get(alias_or_id)
            .cloned()
            .unwrap_or_else(|| alias_or_id.to_string())
    }

    /// 既定モデルの id
    pub fn default_model_id(&self) -> String {
        self.resolve_model_id(&self.default_model)
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// 設定ファイルのパスを解決する
///
/// 優先順位:
/// 1. CONVERSE_CONFIG
/// 2. $CONVERSE_HOME/config.json
/// 3. $XDG_CONFIG_HOME/converse/config.json
/// 4. $HOME/.config/converse/config.json
pub fn resolve_config_path(env: &dyn Fn(&str) -> Option<String>) -> Result<PathBuf, Error> {
    if let Some(p) = non_empty(env("CONVERSE_CONFIG")) {
        return Ok(PathBuf::from(p));
    }
    if let Some(home) = non_empty(env("CONVERSE_HOME")) {
        return Ok(PathBuf::from(home).join("config.json"));
    }
    if let Some(xdg) = non_empty(env("XDG_CONFIG_HOME")) {
        return Ok(PathBuf::from(xdg).join("converse").join("config.json"));
    }
    if let Some(home) = non_empty(env("HOME")) {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("converse")
            .join("config.json"));
    }
    Err(Error::config(
        "cannot locate config: none of CONVERSE_CONFIG, CONVERSE_HOME, XDG_CONFIG_HOME, HOME is set",
    ))
}

/// プロセス環境変数を読むデフォルトの env 関数
pub fn std_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
