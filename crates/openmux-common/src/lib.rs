//! Shared primitives used across the gateway crates.
//!
//! This crate intentionally does not depend on axum, tokio's IO features, or any
//! concrete HTTP client — it holds only data shapes and pure helper functions that
//! every other crate in the workspace needs: the merged runtime configuration, the
//! JWT-payload peek used by adapter credential recognition, and the two vendor
//! request-signing algorithms.

pub mod config;
pub mod jwt;
pub mod requestid;
pub mod signing;

pub use config::{GlobalConfig, GlobalConfigError, GlobalConfigPatch, LoadBalanceStrategy};
pub use jwt::{JwtPayload, decode_jwt_payload, looks_like_jwt};
pub use requestid::new_chat_completion_id;
