//! Process-wide log subscriber for hosts embedding the core.

use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Target under which backend output is forwarded.
pub const CONAN_TARGET: &str = "conan";

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(default_filter: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(std::env::var("RUST_LOG").ok(), default_filter))
        .with_target(true)
        .try_init()
}

fn filter(env: Option<String>, default_filter: &str) -> EnvFilter {
    env.and_then(|directives| {
        EnvFilter::try_new(&directives)
            .inspect_err(|e| eprintln!("Ignoring RUST_LOG '{directives}': {e}"))
            .ok()
    })
    .unwrap_or_else(|| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_default_filter_enables_conan_target() {
        let filter = filter(None, &format!("warn,{CONAN_TARGET}=debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_env_overrides_default() {
        let filter = filter(Some("error".to_string()), "debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn test_second_init_is_rejected() {
        let _first = init("info");
        assert!(init("info").is_err());
    }
}
