//! Conformance suite against the `register-cache` server configuration:
//! the full externally observable life of a registration binding, from
//! creation through expiry and garbage collection to explicit removal.
//!
//! Opt-in: runs only when `SERVER_BINARY` points at the server under
//! test (with `SERVER_CONFIG_DIR` holding `register-cache.conf`). The
//! scenario sleeps through real expiry and GC intervals, so expect it to
//! take tens of seconds.

use sipconform::scenarios;
use sipconform::{RegisterCacheTiming, ServerHarness, TestRunConfig, READY_PAYLOAD};

const SIP_PORT: u16 = 5060;

#[tokio::test]
async fn register_cache_conformance() -> sipconform::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let Some(config) = TestRunConfig::from_env("register-cache", SIP_PORT) else {
        eprintln!("SERVER_BINARY not set, skipping register-cache conformance suite");
        return Ok(());
    };

    let mut harness = ServerHarness::start(config).await?;
    assert_eq!(harness.ready_payload(), READY_PAYLOAD);

    let timing = RegisterCacheTiming::default();
    harness.run(&scenarios::register_cache(&timing)?).await?;

    harness.shutdown().await?;
    Ok(())
}
