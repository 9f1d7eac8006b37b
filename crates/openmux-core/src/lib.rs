//! The gateway core (SPEC_FULL.md §4): request-independent collaborators —
//! the forwarder, bootstrap, authentication, and the shared error taxonomy —
//! that `openmux-router`'s axum handlers are built around.

pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod errors;
pub mod forwarder;

pub use app_state::AppState;
pub use bootstrap::{Bootstrap, CliArgs, bootstrap, bootstrap_from_env};
pub use errors::GatewayError;
pub use forwarder::{AccountSelection, DispatchResult, Forwarder};
