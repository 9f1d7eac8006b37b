//! The configuration collaborator (SPEC_FULL.md §3, §6): `Provider`, `Account`,
//! `ModelMapping`, and the `ConfigStore` read/write-narrow interface the
//! forwarder and balancer consult. Owns no durable database (§1 Non-goals) — an
//! in-memory, optionally file-hydrated snapshot stands in for it.

pub mod account;
pub mod mapping;
pub mod provider;
pub mod store;

pub use account::{Account, AccountPatch, AccountStatus};
pub use mapping::{ModelMapping, ResolvedModel, resolve_model};
pub use provider::{AuthStyle, Provider, model_pattern_matches};
pub use store::{ConfigSnapshot, ConfigStore, InMemoryConfigStore, RuntimeSettings, providers_by_id};
