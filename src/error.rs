//! Public error type for the crate, mirroring the error taxonomy in
//! `spec.md` §7: transport, harness, protocol and programmer errors.

use std::fmt;

/// Top-level error type returned by the public API.
///
/// Internal plumbing uses `anyhow::Result` throughout and is converted to
/// this type only at the `Lighterceptor::run()` boundary, per the policy
/// that `run()` only rejects for unrecoverable root failures — everything
/// else is captured into the `Snapshot` as a per-record `error` string.
#[derive(Debug)]
pub enum LighterceptorError {
    /// Filesystem or other std::io failure.
    Io(std::io::Error),
    /// The embedded script engine raised an error that could not be
    /// attributed to a single resource (e.g. failure constructing the
    /// root document's harness).
    Js(String),
    /// A transport-level failure surfaced past the point where it could be
    /// recorded on an individual `RequestRecord`.
    Transport(String),
    /// DOM/script harness construction failed for the root document.
    Harness(String),
    /// A collaborator (adapter, replay preamble) was misused: missing
    /// globals, unknown target kind, malformed callback result.
    Protocol(String),
    /// Anything else, carrying a human-readable message.
    Other(String),
}

impl fmt::Display for LighterceptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LighterceptorError::Io(err) => write!(f, "io error: {err}"),
            LighterceptorError::Js(msg) => write!(f, "script error: {msg}"),
            LighterceptorError::Transport(msg) => {
                write!(f, "transport error: {msg}")
            }
            LighterceptorError::Harness(msg) => {
                write!(f, "dom harness error: {msg}")
            }
            LighterceptorError::Protocol(msg) => {
                write!(f, "protocol error: {msg}")
            }
            LighterceptorError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LighterceptorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LighterceptorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LighterceptorError {
    fn from(err: std::io::Error) -> Self {
        LighterceptorError::Io(err)
    }
}

impl From<anyhow::Error> for LighterceptorError {
    fn from(err: anyhow::Error) -> Self {
        LighterceptorError::Other(format!("{err:?}"))
    }
}

pub type Result<T> = std::result::Result<T, LighterceptorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_variant_context() {
        let err = LighterceptorError::Transport("timed out".to_string());
        assert_eq!(err.to_string(), "transport error: timed out");
    }

    #[test]
    fn from_anyhow_preserves_message() {
        let inner = anyhow::anyhow!("boom");
        let err: LighterceptorError = inner.into();
        assert!(err.to_string().contains("boom"));
    }
}
