mod adapter;
mod cli;
mod domain;
mod ports;
mod usecase;
mod wiring;

#[cfg(test)]
mod tests;

use std::io::{self, BufReader, Read};
use std::process;
use std::sync::Arc;

use cli::{config_to_command, parse_args, print_completion, Config, ParseOutcome};
use common::conversation::ConversationState;
use common::error::Error;
use common::ports::outbound::{LogLevel, LogRecord};
use domain::{ConverseCommand, EventSource};
use ports::inbound::UseCaseRunner;
use usecase::chat::ChatSession;
use wiring::{wire_converse, App};

use crate::adapter::StdoutSink;

/// ConverseCommand をディスパッチする Runner（match は main レイヤーに集約）
struct Runner {
    app: App,
}

impl Runner {
    fn handle_event(&self, source: &EventSource) -> Result<i32, Error> {
        let raw = match source {
            EventSource::Stdin => {
                let mut s = String::new();
                io::stdin().read_to_string(&mut s)?;
                s
            }
            EventSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::io_msg(format!("{}: {}", path.display(), e)))?,
        };
        let response = self.app.inbound_handler().handle_json(&raw);
        println!("{}", serde_json::to_string(&response)?);
        Ok(if response.is_success() { 0 } else { 1 })
    }

    fn ask(&self, message: &str) -> Result<i32, Error> {
        let mut state = ConversationState::new();
        let mut sink = StdoutSink::new();
        let outcome = self.app.orchestrator.run(&mut state, message, &mut sink)?;
        let level = if outcome.text.is_empty() {
            LogLevel::Warn
        } else {
            LogLevel::Debug
        };
        let _ = self.app.log.log(
            &LogRecord::new(level, "answer finished")
                .layer("cli")
                .kind("turn")
                .field("stop_reason", outcome.stop_reason.as_str())
                .field("tool_rounds", outcome.tool_rounds)
                .field("input_tokens", outcome.usage.input_tokens)
                .field("output_tokens", outcome.usage.output_tokens),
        );
        Ok(0)
    }

    fn repl(&self) -> Result<i32, Error> {
        let mut session = ChatSession::new(&self.app.orchestrator, Arc::clone(&self.app.log))
            .with_interrupt_checker(Arc::clone(&self.app.interrupt));
        let mut sink = StdoutSink::new();
        let summary = session.run(BufReader::new(io::stdin()), &mut sink, &mut io::stderr())?;
        Ok(if summary.failed > 0 && summary.completed == 0 {
            1
        } else {
            0
        })
    }
}

impl UseCaseRunner for Runner {
    fn run(&self, config: Config) -> Result<i32, Error> {
        let cmd = config_to_command(&config);
        let _ = self.app.log.log(
            &LogRecord::new(LogLevel::Info, "command started")
                .layer("cli")
                .kind("lifecycle")
                .field("command", cmd.name())
                .field("model", self.app.orchestrator.model_id())
                .field("mode", self.app.orchestrator.mode().as_str()),
        );

        let result = match &cmd {
            ConverseCommand::Help => {
                print_help();
                Ok(0)
            }
            ConverseCommand::ListTools => {
                for spec in self.app.tools.specs() {
                    println!("{}\t{}", spec.name, spec.description);
                }
                Ok(0)
            }
            ConverseCommand::HandleEvent(source) => self.handle_event(source),
            ConverseCommand::Ask(message) => self.ask(message),
            ConverseCommand::Repl => self.repl(),
        };

        let code = match &result {
            Ok(c) => *c,
            Err(e) => e.exit_code(),
        };
        let _ = self.app.log.log(
            &LogRecord::new(LogLevel::Info, "command finished")
                .layer("cli")
                .kind("lifecycle")
                .field("command", cmd.name())
                .field("exit_code", code),
        );
        if let Err(ref e) = result {
            let _ = self.app.log.log(
                &LogRecord::new(LogLevel::Debug, e.to_string())
                    .layer("cli")
                    .kind("error")
                    .field("error_kind", e.kind()),
            );
        }
        result
    }
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(e) => {
            if e.is_usage() {
                print_usage();
            }
            eprintln!("converse: {}", e);
            e.exit_code()
        }
    };
    process::exit(exit_code);
}

pub fn run() -> Result<i32, Error> {
    let config = match parse_args()? {
        ParseOutcome::Config(c) => c,
        ParseOutcome::GenerateCompletion(shell) => {
            print_completion(shell);
            return Ok(0);
        }
    };
    if config.help {
        print_help();
        return Ok(0);
    }
    let interactive = matches!(config_to_command(&config), ConverseCommand::Repl | ConverseCommand::Ask(_));
    let app = wire_converse(&config, interactive)?;
    let runner = Runner { app };
    runner.run(config)
}

fn print_usage() {
    eprintln!("Usage: converse [options] [message...]");
}

fn print_help() {
    println!("Usage: converse [options] [message...]");
    println!("Options:");
    println!("  -h, --help                     Show this help message");
    println!("  -m, --model <model>            Model alias (claude-3-haiku, claude-3-sonnet) or model id");
    println!("      --mode <mode>              stream (default) or converse-then-stream");
    println!("      --max-tool-rounds <n>      Maximum tool invocations per message (default 4)");
    println!("  -S, --system <instruction>     Set system instruction for this conversation");
    println!("      --config <path>            Path to config.json");
    println!("      --event <path|->           Handle one WebSocket event JSON and print the handler response");
    println!("      --list-tools               List the tools declared to the model");
    println!("  -v, --verbose                  Emit verbose debug logs to stderr");
    println!("      --generate <shell>         Generate shell completion script (bash, zsh, fish, ...)");
    println!();
    println!("Environment:");
    println!("  CONVERSE_CONFIG            Config file path (default $CONVERSE_HOME/config.json,");
    println!("                             $XDG_CONFIG_HOME/converse/config.json or ~/.config/converse/config.json)");
    println!("  CONVERSE_MODEL             Default model alias or id");
    println!("  CONVERSE_ENDPOINT          Inference endpoint base URL");
    println!("  CONVERSE_MAX_TOOL_ROUNDS   Default tool round limit");
    println!("  AWS_BEARER_TOKEN_BEDROCK   Bearer key for the inference endpoint (name configurable via api_key_env)");
    println!();
    println!("Description:");
    println!("  Send a message to the model and stream the answer. When the model asks for a tool");
    println!("  (e.g. get_weather) the tool runs locally and its result is sent back to the model.");
    println!("  Without a message, each line read from stdin is sent in one conversation");
    println!("  (/reset starts over, /exit or Ctrl+C at the prompt quits, Ctrl+C during an");
    println!("  answer stops that answer).");
    println!();
    println!("Examples:");
    println!("  converse What\\'s the weather in Osaka?");
    println!("  converse -m claude-3-haiku --mode converse-then-stream Hello");
    println!("  converse --event event.json");
}
