//! Log initialisation. Output goes to stderr so JSON on stdout stays clean.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

fn filter_from_config(config: &Config) -> EnvFilter {
    EnvFilter::new(config.log_level.as_filter_str())
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: &Config) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_from_config(config))
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_uses_config_level() {
        let config = Config::default().apply_overrides(Some(LogLevel::Debug));
        assert_eq!(filter_from_config(&config).to_string(), "debug");
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        let config = Config::default();
        init_logging(&config);
        init_logging(&config);
    }
}
