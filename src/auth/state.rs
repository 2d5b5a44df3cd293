//! Authentication state traits and macro.

use axum::http::HeaderName;

use crate::jwt::TokenIssuer;

/// Trait for state types that can authenticate requests.
pub trait HasAuthBackend {
    fn issuer(&self) -> &TokenIssuer;
    fn csrf_header(&self) -> &HeaderName;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `issuer: Arc<TokenIssuer>`
/// - `csrf_header: HeaderName`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub issuer: Arc<TokenIssuer>,
///     pub csrf_header: HeaderName,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn issuer(&self) -> &$crate::jwt::TokenIssuer {
                &self.issuer
            }
            fn csrf_header(&self) -> &::axum::http::HeaderName {
                &self.csrf_header
            }
        }
    };
}
