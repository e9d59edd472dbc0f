// Session verification for the realtime endpoints
//
// PulseBoard does not issue sessions; it verifies the HS256 access tokens
// the account service hands to the dashboard.

pub mod config;
pub mod jwt;
pub mod middleware;

pub use config::{AuthConfig, JwtConfig};
pub use jwt::{AccessTokenClaims, JwtService};
pub use middleware::{AuthError, AuthState, AuthUser};
