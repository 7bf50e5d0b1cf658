//! Shared helpers for jobhost's unit, integration and property tests.

pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use jobhost::logging::LOG_ENV;
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for anything a test awaits through [`with_timeout`].
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `JOBHOST_LOG`, then `RUST_LOG`, then
/// `jobhost=info`. Output is captured and only shown for failing tests
/// (or with `-- --nocapture`).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("jobhost=info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `future`, panicking after [`TEST_TIMEOUT`].
///
/// Under a paused clock the deadline is measured in virtual time.
pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("test future did not finish within {TEST_TIMEOUT:?}"),
    }
}
