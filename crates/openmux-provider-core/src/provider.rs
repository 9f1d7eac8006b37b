//! The `Provider` capability-contract trait (SPEC_FULL.md §4.5, §9 redesign
//! flag): one adapter per vendor, dispatched exclusively through this trait —
//! nothing downstream special-cases a vendor by name.

use async_trait::async_trait;

use openmux_protocol::ChatCompletionRequest;

use crate::credential::{AccountInfo, Credential, CredentialBag, TokenValidation};
use crate::errors::ProviderResult;
use crate::forward::ForwardResult;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Vendor-agnostic identifier used for registry lookup and log fields,
    /// e.g. `"tokenvendor"`.
    fn name(&self) -> &'static str;

    /// Checks whether `credentials` authenticates against the vendor and
    /// rejects guest accounts (§4.5).
    async fn validate_token(&self, credentials: &CredentialBag) -> TokenValidation;

    /// Produces a fresh access credential from a refresh credential, or
    /// `Ok(None)` if the vendor doesn't support refresh or the bag carries no
    /// refresh material. A refresh failure here does not fail the in-flight
    /// request (§7 "Refresh failures") — callers proceed with the existing
    /// credentials and let the failure window catch the resulting 401.
    async fn refresh_token(&self, credentials: &CredentialBag) -> ProviderResult<Option<Credential>>;

    /// Issues the upstream call and returns either a buffered body or a live
    /// stream plus `skip_transform` (§4.5, §9).
    async fn forward_chat_completion(
        &self,
        request: &ChatCompletionRequest,
        credentials: &CredentialBag,
        actual_model: &str,
    ) -> ProviderResult<ForwardResult>;

    /// Optional enrichment used at account creation; `Ok(None)` when the
    /// vendor exposes no introspection endpoint.
    async fn get_account_info(&self, credentials: &CredentialBag) -> ProviderResult<Option<AccountInfo>>;
}
