//! # Room Gate Test Utilities
//!
//! Shared test utilities for the room gate.
//!
//! ## Modules
//!
//! - `server_harness` - Spawns a real gate server on a random port
//! - `flaky_store` - Room store wrapper that injects failures
//! - `fixtures` - User agents, cookies and an HTTP client for gate tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_gate::store::InMemoryRoomStore;
//! use room_gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
//!     let server = TestGateServer::spawn(store.clone()).await?;
//!
//!     let response = gate_client()
//!         .get(server.room_url("r1"))
//!         .header("user-agent", BROWSER_USER_AGENT)
//!         .send()
//!         .await?;
//!
//!     assert!(credential_from(&response).is_some());
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod flaky_store;
pub mod server_harness;

pub use fixtures::*;
pub use flaky_store::FlakyRoomStore;
pub use server_harness::TestGateServer;
