use super::setup::runtime;
use plp_bookstore::{ArangoConnectionConfig, ArangoDbConnection, DocumentStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use testcontainers::{core::WaitFor, runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt};
use tokio::runtime::Runtime;

const ARANGO_ROOT_PASSWORD: &str = "password";

struct GlobalContainerState {
    rt: Arc<Runtime>,
    container: Option<ContainerAsync<GenericImage>>,
    base_url: String,
}

impl Drop for GlobalContainerState {
    fn drop(&mut self) {
        // the container must drop inside a Tokio runtime
        let _enter = self.rt.enter();

        let keep = std::env::var("PLP_BOOKSTORE_KEEP_CONTAINER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if keep {
            if let Some(c) = self.container.take() {
                std::mem::forget(c);
            }
            eprintln!(
                "[plp_bookstore tests] PLP_BOOKSTORE_KEEP_CONTAINER=1 set; leaving ArangoDB running at {}",
                self.base_url
            );
            return;
        }
        drop(self.container.take());
    }
}

static GLOBAL: OnceLock<GlobalContainerState> = OnceLock::new();
static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

async fn start_container() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("arangodb", "3.12.5")
        .with_wait_for(WaitFor::message_on_stdout("is ready for business"))
        .with_env_var("ARANGO_ROOT_PASSWORD", ARANGO_ROOT_PASSWORD)
        .start()
        .await
        .expect("Failed to start ArangoDB container");

    let host_port = container
        .get_host_port_ipv4(8529)
        .await
        .expect("ArangoDB container exposes no port 8529");
    (container, format!("http://127.0.0.1:{}", host_port))
}

fn ensure_global() -> &'static GlobalContainerState {
    GLOBAL.get_or_init(|| {
        let rt = runtime();
        let (container, base_url) = rt.block_on(start_container());
        GlobalContainerState {
            rt,
            container: Some(container),
            base_url,
        }
    })
}

/// Create `test_db_<n>` in the shared container and connect to it.
pub fn fresh_database() -> Arc<dyn DocumentStore> {
    let state = ensure_global();
    let db_name = format!("test_db_{}", DB_COUNTER.fetch_add(1, Ordering::Relaxed));
    let config = ArangoConnectionConfig::new(
        state.base_url.clone(),
        "root",
        ARANGO_ROOT_PASSWORD,
        db_name,
    );
    let db = state.rt.block_on(async {
        ArangoDbConnection::ensure_database(&config)
            .await
            .expect("Failed to create database");
        ArangoDbConnection::connect(config)
            .await
            .expect("Failed to connect to per-test database")
    });
    Arc::new(db)
}
