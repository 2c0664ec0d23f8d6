use std::path::Path;

use anyhow::Result;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const LOG_PREFIX: &str = "tick-tock";

/// Log to stderr and to a daily rotated file under `log_dir`.
///
/// `RUST_LOG` picks the level unless `debug` forces it to `debug`.
pub fn enable_logging(log_dir: &Path, debug: bool) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;

    let level = if debug {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!(
            "{}={level}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
        )))
        .with_ansi(false)
        .with_writer(std::io::stderr.and(appender))
        .init();
    Ok(())
}

/// Route log output of the library into the test harness. Safe to call from
/// every test.
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    use tracing::level_filters::LevelFilter;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(LevelFilter::TRACE)
            .with_test_writer()
            .try_init();
    });
}
