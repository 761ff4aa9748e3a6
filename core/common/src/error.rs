//! エラーハンドリング
//!
//! 呼び出し元へ返す終端エラーを 1 つの enum に集約する。
//! ツール実行エラー（`tool::ToolError`）と配信先消失（`sink::DeliveryError::RecipientGone`）は
//! ここには含めず、それぞれの層で回復する。

/// 共通エラー型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// 推論エンドポイント・配信エンドポイントへの到達失敗、またはエラー応答
    #[error("transport error: {0}")]
    Transport(String),
    /// モデルがストリーム契約に違反した（引数 JSON 不正・必須フィールド欠落など）
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// 登録されていないツール名をモデルが要求した
    #[error("unknown tool: {0}")]
    ToolLookup(String),
    /// 1 ユーザーターン内のツール往復回数が上限を超えた
    #[error("tool round limit exceeded ({0})")]
    TurnLimit(usize),
    /// Ctrl+C 等で中断された
    #[error("interrupted")]
    Interrupted,
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("JSON error: {0}")]
    Json(String),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn io_msg(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }

    pub fn json(msg: impl Into<String>) -> Self {
        Error::Json(msg.into())
    }

    /// ログ・ハンドラ応答に載せる安定したラベル
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::ProtocolViolation(_) => "protocol_violation",
            Error::ToolLookup(_) => "tool_lookup",
            Error::TurnLimit(_) => "turn_limit",
            Error::Interrupted => "interrupted",
            Error::Config(_) => "config",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// プロセス終了コード（sysexits 準拠）
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => 64,
            Error::Json(_) => 65,
            Error::ToolLookup(_) => 69,
            Error::Transport(_) | Error::Io(_) => 74,
            Error::TurnLimit(_) => 75,
            Error::ProtocolViolation(_) => 76,
            Error::Config(_) => 78,
            Error::Interrupted => 130,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}
