//! Shared helpers for the autopatcher integration tests: sandbox and config
//! builders, in-memory fakes for the filesystem and process table, and a
//! tracing setup that routes through the test harness.

pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

/// Upper bound for any single job or verifier future under test.
pub const TEST_DEADLINE: Duration = Duration::from_secs(30);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output only shows for failing tests; `RUST_LOG=autopatcher=trace` narrows it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("autopatcher=debug,warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// Await `fut`, panicking if it runs past [`TEST_DEADLINE`].
///
/// The job tests drive real child processes and sleep on wall clocks, so a
/// hang here means a waiter or verifier loop never terminated.
pub async fn with_timeout<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_DEADLINE, fut).await {
        Ok(value) => value,
        Err(_) => panic!("test future did not finish within {TEST_DEADLINE:?}"),
    }
}
