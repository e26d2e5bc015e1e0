use std::sync::Once;

use log::LevelFilter;

/// How the standalone logger is set up when no host provides one.
///
/// The library itself only emits through the `log` facade. `env_filter` uses
/// `env_logger` directive syntax, e.g. `"tilewire::poller=trace"` to follow
/// every poll tick.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { env_filter: None, write_style: env_logger::WriteStyle::Auto }
    }
}

/// Filter directives in effect: the configured filter, else `rust_log`.
/// `None` means fall back to `info`.
fn effective_filter(configured: Option<String>, rust_log: Option<String>) -> Option<String> {
    configured.or(rust_log).filter(|f| !f.trim().is_empty())
}

static INIT: Once = Once::new();

/// Installs an `env_logger` backend for standalone hosts such as the CLI.
///
/// When tilewire is embedded in a 3D application that has already installed
/// its own `log` backend, installation fails and this call does nothing;
/// tilewire records then go to the host's logger. Only the first call in a
/// process has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match effective_filter(config.env_filter, std::env::var("RUST_LOG").ok()) {
            Some(directives) => builder.parse_filters(&directives),
            None => builder.filter_level(LevelFilter::Info),
        };
        builder.write_style(config.write_style);

        match builder.try_init() {
            Ok(()) => log::debug!("tilewire logger installed"),
            Err(_) => log::debug!("global logger already set; keeping the host's"),
        }
    });
}
