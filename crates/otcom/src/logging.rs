use clap::ValueEnum;
use otcom_bridge::CONSOLE_TARGET;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Parse a level name as written in a config file.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }
}

/// Diagnostics follow `level`; device traffic on the console target stays
/// at least at `info` since the print mode already decides what it shows.
fn filter(level: LogLevel) -> Targets {
    Targets::new()
        .with_default(level.as_filter())
        .with_target(CONSOLE_TARGET, level.as_filter().max(LevelFilter::INFO))
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn config_level_names_parse() {
        assert_eq!(LogLevel::from_name("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name(" WARN "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_name("loud"), None);
    }

    #[test]
    fn console_traffic_survives_quiet_levels() {
        let targets = filter(LogLevel::Warn);
        assert!(targets.would_enable(CONSOLE_TARGET, &Level::INFO));
        assert!(!targets.would_enable("otcom_bridge::device", &Level::INFO));
        assert!(targets.would_enable("otcom_bridge::device", &Level::WARN));
    }

    #[test]
    fn verbose_levels_apply_everywhere() {
        let targets = filter(LogLevel::Debug);
        assert!(targets.would_enable(CONSOLE_TARGET, &Level::DEBUG));
        assert!(targets.would_enable("otcom_mpipe::mpipe2", &Level::DEBUG));
    }
}
