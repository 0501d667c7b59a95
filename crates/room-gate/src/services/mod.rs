//! Service layer for the room gate.
//!
//! # Components
//!
//! - `membership` - Membership Manager (lookup, membership and capacity checks)
//! - `registration` - Swappable participant registration strategies

pub mod membership;
pub mod registration;

pub use membership::MembershipManager;
pub use registration::{
    build_registrar, AtomicAppendRegistrar, LeaseRegistrar, OptimisticRegistrar,
    ParticipantRegistrar,
};
// Mock registrar exposed for integration tests
#[allow(unused_imports)]
pub use registration::mock::MockRegistrar;
