//! `garrison-auth`: pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: tokens are decoded elsewhere, this crate
//! validates claims and maps roles to permissions and base scope.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize, role_permissions};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use roles::Role;
