//! # cloak-core
//!
//! Core types and lifecycle logic for the cloak-link token service.
//!
//! This crate provides:
//! - `TokenStore` trait for pluggable key/record storage with TTLs
//! - `MemoryTokenStore`, a process-local store
//! - `TokenManager`, the single-use token state machine
//! - `ExpirySweeper` for inline cleanup of past-deadline records
//! - `CloakedLinks` for building intermediary redirect URLs
//! - `CloakError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloak_core::{ManagerSettings, MemoryTokenStore, TokenManager};
//! use std::sync::Arc;
//!
//! let manager = TokenManager::new(Arc::new(MemoryTokenStore::new()), ManagerSettings::default());
//!
//! // Mint a token for a pending checkout session
//! let issued = manager.create("cs_test_123").await?;
//!
//! // Later, from the thank-you page
//! if manager.query(&issued.token).await?.is_valid {
//!     manager.complete(&issued.token).await?;
//! }
//! ```

pub mod clock;
pub mod error;
pub mod links;
pub mod manager;
pub mod memory;
pub mod record;
pub mod store;
pub mod sweeper;
pub mod token;

// Re-exports for convenience
pub use clock::{deadline_after, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{CloakError, CloakResult};
pub use links::CloakedLinks;
pub use manager::{DeleteOutcome, ManagerSettings, TokenManager};
pub use memory::MemoryTokenStore;
pub use record::{IssuedToken, TokenRecord, TokenStatus};
pub use store::{BoxedTokenStore, Namespace, TokenStore};
pub use sweeper::{ExpirySweeper, SweepReport};
