//! Black-box conformance harness for a SIP signaling server with an
//! XML-RPC control interface.
//!
//! The harness launches the server-under-test as a child process, waits
//! for its readiness datagram, then drives it over raw UDP (SIP) and
//! TCP/HTTP (XML-RPC) exchanges, asserting each response against an
//! expected byte pattern. The server is never inspected from the inside;
//! everything the harness knows, it learned from bytes on a socket.

pub type Result<T> = color_eyre::eyre::Result<T>;

pub mod codec;
pub mod config;
pub mod error;
pub mod matcher;
pub mod readiness;
pub mod runner;
pub mod scenarios;
pub mod sip;
pub mod supervisor;

pub use config::{RegisterCacheTiming, TestRunConfig, ValgrindMode};
pub use error::HarnessError;
pub use readiness::{ReadinessChannel, READY_PAYLOAD};
pub use runner::{Scenario, ScenarioRunner, Step};
pub use supervisor::{ServerHarness, ServerProcess};
