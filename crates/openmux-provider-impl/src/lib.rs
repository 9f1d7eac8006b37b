//! The five vendor adapters (SPEC_FULL.md §4.5): one per authentication
//! style named in §3/§6. Each implements `openmux_provider_core::Provider`
//! and is reachable only through that trait — nothing here is special-cased
//! by name outside the registration call in `apps/gateway`.

pub mod compositevendor;
pub mod jwtvendor;
pub mod refreshvendor;
pub mod shared;
pub mod ticketvendor;
pub mod tokenvendor;

pub use compositevendor::CompositeVendorProvider;
pub use jwtvendor::JwtVendorProvider;
pub use refreshvendor::RefreshVendorProvider;
pub use ticketvendor::TicketVendorProvider;
pub use tokenvendor::TokenVendorProvider;
