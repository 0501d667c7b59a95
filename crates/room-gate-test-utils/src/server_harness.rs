//! Test server harness for end-to-end gate tests.
//!
//! Provides `TestGateServer` for spawning a real gate on a random port.

use room_gate::classifier::AdmissionClassifier;
use room_gate::config::Config;
use room_gate::observability::init_metrics_recorder;
use room_gate::routes::{self, AppState};
use room_gate::services::{build_registrar, MembershipManager};
use room_gate::store::{InMemoryRoomStore, RoomStore};
use room_gate::token::RandomTokenGenerator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the room gate in integration tests.
///
/// # Example
/// ```rust,ignore
/// let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
/// let server = TestGateServer::spawn(store).await?;
///
/// let response = gate_client().get(server.room_url("r1")).send().await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGateServer {
    addr: SocketAddr,
    config: Config,
    handle: JoinHandle<()>,
}

impl TestGateServer {
    /// Spawn a gate over an in-memory store with default configuration.
    pub async fn spawn(store: InMemoryRoomStore) -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(store), &[]).await
    }

    /// Spawn a gate over any room store with extra environment variables.
    ///
    /// `REDIS_URL` defaults to `memory://` (the store passed in is used
    /// regardless) and `BIND_ADDRESS` to `127.0.0.1:0`.
    ///
    /// # Example
    /// ```rust,ignore
    /// let server = TestGateServer::spawn_with(
    ///     Arc::new(store),
    ///     &[("REGISTRATION_STRATEGY", "lease")],
    /// )
    /// .await?;
    /// ```
    pub async fn spawn_with(
        store: Arc<dyn RoomStore>,
        vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut env = HashMap::from([
            ("REDIS_URL".to_string(), "memory://".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (name, value) in vars {
            env.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&env)
            .map_err(|e| anyhow::anyhow!("Invalid test configuration: {}", e))?;

        let classifier = AdmissionClassifier::new(&config.bot_signatures)
            .map_err(|e| anyhow::anyhow!("Invalid bot signatures: {}", e))?;
        let registrar = build_registrar(&config, store.clone());
        let membership = MembershipManager::new(
            store.clone(),
            registrar,
            Arc::new(RandomTokenGenerator::new()),
            config.max_room_participants,
        );

        let state = Arc::new(AppState {
            config: config.clone(),
            classifier: Arc::new(classifier),
            membership: Arc::new(membership),
            store,
        });

        // Only one global recorder per test process; later servers get a
        // standalone one
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of a room entry on the test server
    pub fn room_url(&self, room_id: &str) -> String {
        format!("{}/room/{}", self.url(), room_id)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestGateServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
