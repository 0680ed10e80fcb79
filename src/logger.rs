use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::state::{LogLevel, LogLine, SessionState, MAX_LOGS};

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Appends to the session's activity log and forwards to tracing.
pub fn log(state: &mut SessionState, level: LogLevel, msg: impl Into<String>) {
    let text = msg.into();

    match level {
        LogLevel::Info | LogLevel::Success => tracing::info!("{text}"),
        LogLevel::Warn => tracing::warn!("{text}"),
        LogLevel::Error => tracing::error!("{text}"),
    }

    if state.logs.len() >= MAX_LOGS {
        state.logs.pop_front();
    }

    state.logs.push_back(LogLine {
        level,
        text,
        at: Instant::now(),
    });
}
