use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

use crate::ResearchError;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually the
/// `[logging].level` config value) is used. Safe to call multiple times; only
/// the first invocation installs the subscriber.
pub fn init_telemetry(default_level: &str) -> Result<(), ResearchError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_level.to_string());

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| {
            ResearchError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}
