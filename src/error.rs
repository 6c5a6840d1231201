use std::process::ExitStatus;
use std::time::Duration;

/// Failure taxonomy for a conformance run.
///
/// Setup failures are fatal to the whole suite (no test steps run); the
/// remaining variants each fail exactly one step. Envelope and body
/// mismatches are reported separately so a broken control-channel framing
/// is never misdiagnosed as a wrong response body.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The server binary could not be launched at all.
    #[error("failed to spawn server process `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The server never sent its readiness datagram.
    #[error("server did not signal readiness within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    /// The server process exited while the suite still expected it alive.
    #[error("server exited unexpectedly with status {status}")]
    UnexpectedExit { status: ExitStatus },

    /// No response arrived within the per-step read timeout.
    #[error("step {step} ({label}): no response within {timeout:?}")]
    TransportTimeout {
        step: usize,
        label: String,
        timeout: Duration,
    },

    /// The fixed control-channel response framing did not match.
    #[error("control response envelope mismatch; got:\n{}", String::from_utf8_lossy(.actual))]
    EnvelopeMismatch { actual: Vec<u8> },

    /// The response body did not match the expected pattern.
    #[error("response did not match pattern:\n{expected}\ngot:\n{}", String::from_utf8_lossy(.actual))]
    PatternMismatch { expected: String, actual: Vec<u8> },
}

impl HarnessError {
    /// True for failures that abort the suite before any step runs.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            HarnessError::SpawnFailed { .. }
                | HarnessError::ReadinessTimeout { .. }
                | HarnessError::UnexpectedExit { .. }
        )
    }
}
