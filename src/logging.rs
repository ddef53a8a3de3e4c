//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` (e.g.
/// `"daqflow=debug"`). Returns false when a global subscriber was already
/// installed, which makes repeated calls harmless.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

/// [`init`] with the directive from a loaded configuration, if any.
pub fn init_from_config(config: &crate::config::DaqConfig) -> bool {
    init(config.log_filter.as_deref().unwrap_or("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init("daqflow=trace");
        assert!(!init("daqflow=debug"));
    }
}
