//! ESDR Server - Application Layer
//!
//! Ties the feed directory, datastore, and multifeed composer together behind
//! endpoint-level handlers, and persists state as JSON snapshots.
//!
//! Key Features:
//! - Per-endpoint credential policy (read endpoints degrade, write endpoints reject)
//! - Feed-key upload shorthand for constrained uploaders
//! - JSON snapshot persistence with tile and bounds rebuild on load
//! - `esdr` command-line binary
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod handlers;
pub mod state;

pub use handlers::ErrorResponse;
pub use state::AppState;
