use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Crates whose events follow `--log-level`.
const KRPC_TARGETS: [&str; 4] = ["krpc", "krpc_agent", "krpc_frame", "krpc_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` for the krpc crates; anything else is capped at warn.
pub fn event_filter(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    KRPC_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Events go to stderr with thread names, so dispatch workers
/// (`krpc-<endpoint>`) and the link's receive thread are told apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(event_filter(level));

    match format {
        LogFormat::Text => {
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Json => {
            let _ = registry.with(layer.json()).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn level_applies_to_krpc_crates_only() {
        let filter = event_filter(LogLevel::Debug);

        assert!(filter.would_enable("krpc_agent::endpoint", &Level::DEBUG));
        assert!(filter.would_enable("krpc_transport::loopback", &Level::DEBUG));
        assert!(!filter.would_enable("krpc_agent::endpoint", &Level::TRACE));
        assert!(!filter.would_enable("clap_builder", &Level::INFO));
        assert!(filter.would_enable("clap_builder", &Level::WARN));
    }

    #[test]
    fn quiet_level_also_quiets_other_crates() {
        let filter = event_filter(LogLevel::Error);

        assert!(!filter.would_enable("krpc_agent::registry", &Level::WARN));
        assert!(!filter.would_enable("clap_builder", &Level::WARN));
        assert!(filter.would_enable("clap_builder", &Level::ERROR));
    }
}
