//! `Credential` (SPEC_FULL.md §3): the in-memory projection an adapter's
//! refresh operation hands back to the forwarder.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Access,
    Refresh,
    Jwt,
    Cookie,
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub kind: CredentialKind,
    pub value: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl Credential {
    pub fn access(value: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Access,
            value: value.into(),
            refresh_token: None,
            expires_at: None,
        }
    }
}

/// The opaque per-account credential bag the configuration collaborator owns
/// (§3 Account.credentials); shape depends on the bound provider's `AuthStyle`
/// (§6 "Adapter credential shapes").
pub type CredentialBag = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_guest: bool,
}

impl AccountInfo {
    /// §4.5 guest-account rejection: an `@guest.com` email, an explicit guest
    /// flag, or — for vendors with no email/phone at all — the complete
    /// absence of both.
    pub fn is_guest_account(&self, phone: Option<&str>) -> bool {
        if self.is_guest {
            return true;
        }
        if let Some(email) = &self.email {
            if email.ends_with("@guest.com") {
                return true;
            }
            return false;
        }
        phone.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TokenValidation {
    pub valid: bool,
    pub token_type: Option<String>,
    pub account_info: Option<AccountInfo>,
    pub error: Option<String>,
}

impl TokenValidation {
    pub fn ok(account_info: AccountInfo) -> Self {
        Self {
            valid: true,
            token_type: None,
            account_info: Some(account_info),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            token_type: None,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// The stable message every guest-account rejection uses (§4.5).
pub const GUEST_ACCOUNT_ERROR: &str = "account is a guest/ephemeral session and cannot be used";
