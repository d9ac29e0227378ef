//! Shared fixtures for the integration tests.

#![allow(dead_code, unused_imports)]

pub use modelrelay::test_support::{
    CountingFactory, FailingTransport, RecordedCall, ScriptedTransport,
};

/// Route test logs through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
