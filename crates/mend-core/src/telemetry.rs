//! Tracing subscriber setup

use crate::error::TelemetryError;
use tracing_subscriber::EnvFilter;

/// Filter directive used when neither `MEND_LOG` nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "info";

/// Filter from `MEND_LOG`, then `RUST_LOG`, then [`DEFAULT_FILTER`]
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("MEND_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global fmt subscriber, as JSON lines when `json` is set
///
/// Logs go to stderr so command output on stdout stays machine-readable.
///
/// # Errors
/// [`TelemetryError::Install`] if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), TelemetryError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder
            .json()
            .try_init()
            .map_err(TelemetryError::Install)?;
    } else {
        builder
            .try_init()
            .map_err(TelemetryError::Install)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_typed_error() {
        let _ = init_tracing(false);
        let err = init_tracing(true).unwrap_err();
        assert!(matches!(err, TelemetryError::Install(_)));
        assert!(err.to_string().starts_with("failed to install tracing subscriber"));
    }
}
