use crate::domain::{ConverseCommand, EventSource};
use clap::builder::ArgAction;
use clap::value_parser;
use clap_complete::Shell;
use common::config::ResponseMode;
use common::error::Error;
use std::path::PathBuf;

const BIN_NAME: &str = "converse";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub help: bool,
    /// --list-tools: 登録済みツールの一覧を表示
    pub list_tools: bool,
    /// -v / --verbose: 不具合調査用の冗長ログを stderr に出力する
    pub verbose: bool,
    /// -m / --model: 別名（claude-3-haiku 等）またはモデル id
    pub model: Option<String>,
    pub mode: Option<ResponseMode>,
    pub max_tool_rounds: Option<usize>,
    pub system: Option<String>,
    /// --config: 設定ファイルのパス（省略時は環境変数から解決）
    pub config_path: Option<PathBuf>,
    /// --event: WebSocket イベント JSON のパス（`-` で標準入力）
    pub event: Option<String>,
    pub message_args: Vec<String>,
}

/// 解析結果: 通常の Config / 補完スクリプト生成
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Config(Config),
    GenerateCompletion(Shell),
}

fn build_clap_command() -> clap::Command {
    clap::Command::new(BIN_NAME)
        .about("Chat with a hosted model that can call tools, streaming the answer")
        .disable_help_flag(true)
        .arg(
            clap::Arg::new("help")
                .short('h')
                .long("help")
                .help("Show this help message")
                .action(ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("list-tools")
                .long("list-tools")
                .help("List the tools declared to the model")
                .action(ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Emit verbose debug logs to stderr (for troubleshooting)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("model")
                .short('m')
                .long("model")
                .value_name("model")
                .help("Model alias (claude-3-haiku, claude-3-sonnet) or model id")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("mode")
                .long("mode")
                .value_name("mode")
                .help("stream (default) or converse-then-stream")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("max-tool-rounds")
                .long("max-tool-rounds")
                .value_name("n")
                .help("Maximum tool invocations per message (default 4)")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("system")
                .short('S')
                .long("system")
                .value_name("instruction")
                .help("Set system instruction for this conversation")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("config")
                .long("config")
                .value_name("path")
                .help("Path to config.json (default: $CONVERSE_CONFIG or ~/.config/converse/config.json)")
                .value_parser(value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("event")
                .long("event")
                .value_name("path")
                .help("Handle one WebSocket event JSON from a file (or - for stdin)")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("generate")
                .long("generate")
                .value_name("shell")
                .help("Generate shell completion script")
                .value_parser(value_parser!(Shell))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("positional")
                .index(1)
                .help("Message words (omit to start an interactive session)")
                .num_args(0..)
                .trailing_var_arg(true),
        )
}

fn matches_to_config(matches: &clap::ArgMatches) -> Result<Config, Error> {
    let mode = matches
        .get_one::<String>("mode")
        .map(|s| s.parse::<ResponseMode>())
        .transpose()?;
    Ok(Config {
        help: matches.get_flag("help"),
        list_tools: matches.get_flag("list-tools"),
        verbose: matches.get_flag("verbose"),
        model: matches.get_one::<String>("model").cloned(),
        mode,
        max_tool_rounds: matches.get_one::<usize>("max-tool-rounds").copied(),
        system: matches.get_one::<String>("system").cloned(),
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        event: matches.get_one::<String>("event").cloned(),
        message_args: matches
            .get_many::<String>("positional")
            .map(|i| i.cloned().collect())
            .unwrap_or_default(),
    })
}

/// コマンドラインを解析する。補完生成が要求された場合は ParseOutcome::GenerateCompletion を返す。
pub fn parse_args() -> Result<ParseOutcome, Error> {
    let matches = build_clap_command()
        .try_get_matches()
        .map_err(|e| Error::invalid_argument(e.to_string()))?;

    if let Some(&shell) = matches.get_one::<Shell>("generate") {
        return Ok(ParseOutcome::GenerateCompletion(shell));
    }

    Ok(ParseOutcome::Config(matches_to_config(&matches)?))
}

/// テスト用: 引数スライスから解析する
#[cfg(test)]
pub fn parse_args_from(args: &[&str]) -> Result<Config, Error> {
    let matches = build_clap_command()
        .try_get_matches_from(args)
        .map_err(|e| Error::invalid_argument(e.to_string()))?;
    matches_to_config(&matches)
}

/// 補完スクリプトを標準出力に出力する。
pub fn print_completion(shell: Shell) {
    let mut cmd = build_clap_command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut std::io::stdout());
}

/// Config を ConverseCommand に変換する
pub fn config_to_command(config: &Config) -> ConverseCommand {
    if config.help {
        return ConverseCommand::Help;
    }
    if config.list_tools {
        return ConverseCommand::ListTools;
    }
    if let Some(event) = &config.event {
        return ConverseCommand::HandleEvent(EventSource::from_arg(event));
    }
    let message = config.message_args.join(" ");
    if message.trim().is_empty() {
        ConverseCommand::Repl
    } else {
        ConverseCommand::Ask(message)
    }
}
