mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use otcom_bridge::BridgeConfig;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "otcom", version, about = "Serial-to-TCP bridge for Mpipe devices")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). `serve` falls back to the config file.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn effective_log_level(&self) -> LogLevel {
        if let Some(level) = self.log_level {
            return level;
        }
        let Command::Serve(args) = &self.command else {
            return LogLevel::Info;
        };
        // Load errors are reported by `serve` itself.
        args.config
            .as_ref()
            .and_then(|path| BridgeConfig::load(path).ok())
            .and_then(|config| LogLevel::from_name(&config.log_level))
            .unwrap_or(LogLevel::Info)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.effective_log_level());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
