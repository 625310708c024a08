//! # cloak-api
//!
//! HTTP API layer for cloak-link-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Token lifecycle endpoints
//! - Cloaked link issuance
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check with backend probe |
//! | GET | `/env-status` | Configured secrets (presence only) |
//! | POST | `/tokens` | Create / bind / complete / expire |
//! | GET | `/tokens?token=` | Token status |
//! | DELETE | `/tokens` | Reset one token or all |
//! | POST | `/cloak` | Issue cloaked URLs |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
