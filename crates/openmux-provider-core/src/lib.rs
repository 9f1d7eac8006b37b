//! The upstream-adapter capability contract (SPEC_FULL.md §4.5, §9): the
//! `Provider` trait every vendor adapter implements, the `Credential`/
//! `ForwardOutcome` tagged unions it exchanges with the forwarder, and the
//! registry that looks adapters up by name.

pub mod credential;
pub mod errors;
pub mod forward;
pub mod headers;
pub mod provider;
pub mod registry;

pub use credential::{AccountInfo, Credential, CredentialBag, CredentialKind, GUEST_ACCOUNT_ERROR, TokenValidation};
pub use errors::{ProviderError, ProviderResult};
pub use forward::{ByteStream, ForwardOutcome, ForwardResult, StreamItem};
pub use headers::{Headers, header_get, header_remove, header_set};
pub use provider::Provider;
pub use registry::ProviderRegistry;
