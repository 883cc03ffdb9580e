pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Drain, Logger};

/// Builds the default terminal logger used by the services and tools.
pub fn init() -> Logger {
    init_with_level("debug")
}

/// Builds a terminal logger with the supplied level ("trace", "debug", "info", ...).
pub fn init_with_level(level: &str) -> Logger {
    use sloggers::{Config, LoggerConfig};

    let config: LoggerConfig = serdeconv::from_toml_str(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    ))
    .expect("Error parsing logger configuration");

    config.build_logger().expect("Error building logger")
}

/// A logger that swallows all records. Used by tests and as a fallback.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_logger() {
        let log = discard();
        info!(log, "no-op"; "key" => 1);
    }

    #[test]
    fn test_init_levels() {
        let _ = init_with_level("info");
        let _ = init_with_level("trace");
    }
}
