use plp_bookstore::{DocumentStore, MemoryDbConnection};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

pub const TEST_COLLECTION: &str = "books";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestBackend {
    Memory,
    Arango,
}

impl TestBackend {
    fn token(&self) -> &'static str {
        match self {
            TestBackend::Memory => "memory",
            TestBackend::Arango => "arango",
        }
    }
}

/// Backends listed in `PLP_BOOKSTORE_TEST_BACKENDS` (comma separated).
/// Unset means memory only, so the suite runs without Docker.
pub fn configured_backends() -> Vec<TestBackend> {
    let wants = std::env::var("PLP_BOOKSTORE_TEST_BACKENDS").unwrap_or_default();
    let tokens: Vec<String> = wants
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if tokens.is_empty() {
        return vec![TestBackend::Memory];
    }
    [TestBackend::Memory, TestBackend::Arango]
        .into_iter()
        .filter(|b| cfg!(feature = "arango") || *b != TestBackend::Arango)
        .filter(|b| tokens.iter().any(|t| t == b.token()))
        .collect()
}

pub fn backend_enabled(backend: TestBackend) -> bool {
    configured_backends().contains(&backend)
}

static TEST_RT: OnceLock<Arc<Runtime>> = OnceLock::new();

pub(crate) fn runtime() -> Arc<Runtime> {
    TEST_RT
        .get_or_init(|| {
            Arc::new(
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build test tokio runtime"),
            )
        })
        .clone()
}

/// Run any async future on the shared test runtime.
pub fn run_async<F: std::future::Future>(fut: F) -> F::Output {
    runtime().block_on(fut)
}

/// This function will be executed once when the test binary starts.
#[ctor::ctor]
fn initialize_logging() {
    // Default to warn to avoid noisy logs; allow override via RUST_LOG.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .init();
}

/// A fresh, empty store for one test. ArangoDB tests each get their own
/// database inside the shared container.
pub fn setup_backend(backend: TestBackend) -> Arc<dyn DocumentStore> {
    match backend {
        TestBackend::Memory => Arc::new(MemoryDbConnection::new()),
        #[cfg(feature = "arango")]
        TestBackend::Arango => super::arango::fresh_database(),
        #[cfg(not(feature = "arango"))]
        TestBackend::Arango => unreachable!("arango backend is filtered out without the feature"),
    }
}
