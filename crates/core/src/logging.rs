use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber for an embedding process. Call once
/// at startup; later calls return an error from the subscriber registry.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|error| error.to_string())?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};
    use crate::logging::init;

    #[test]
    fn second_initialization_is_rejected_not_panicking() {
        let config = LoggingConfig { level: "info".to_string(), format: LogFormat::Compact };
        let first = init(&config);
        let second = init(&config);
        // Exactly one installation can win; the other must fail cleanly.
        assert!(first.is_ok() || second.is_err());
    }
}
