//! Load balancing and account-health bookkeeping (SPEC_FULL.md §4.3, §4.6).
//!
//! `LoadBalancer` enumerates candidate `(account, provider, actualModel)`
//! triples and arbitrates between them with one of three strategies;
//! `StatusCollector` tracks global request counters and per-{model|provider|
//! account} usage tallies independently of selection. Both hold their state
//! behind short-lived `parking_lot::Mutex` guards rather than an async lock —
//! selection never crosses an `.await` point (§5).

pub mod balancer;
pub mod collector;
pub mod failure;
pub mod selection;
pub mod strategy;

pub use balancer::LoadBalancer;
pub use collector::{Statistics, StatusCollector};
pub use failure::{FAIL_THRESHOLD, RECOVERY_TIME, FailureWindow};
pub use selection::{AccountSelection, Candidate};
