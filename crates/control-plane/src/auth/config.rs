// Authentication configuration loaded from environment variables.
// Decision: AUTH_ prefix for all auth config
// Decision: Without AUTH_JWT_SECRET a random per-process secret is used (dev mode)

use std::time::Duration;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWTs
    pub secret: String,
    /// Access token lifetime
    pub access_token_lifetime: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_lifetime: Duration::from_secs(15 * 60), // 15 minutes
        }
    }
}

/// Complete authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// JWT configuration
    pub jwt: JwtConfig,
    /// The secret was generated for this process only
    pub ephemeral_secret: bool,
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// - `AUTH_JWT_SECRET`: HS256 signing secret shared with the issuer
    /// - `AUTH_JWT_ACCESS_TOKEN_LIFETIME`: seconds (default: 900)
    pub fn from_env() -> Self {
        let (secret, ephemeral_secret) = match std::env::var("AUTH_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => (secret, false),
            _ => {
                tracing::warn!(
                    "AUTH_JWT_SECRET not set, using a random secret; tokens will not survive a restart"
                );
                (random_secret(), true)
            }
        };

        let access_token_lifetime = std::env::var("AUTH_JWT_ACCESS_TOKEN_LIFETIME")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(15 * 60));

        Self {
            jwt: JwtConfig {
                secret,
                access_token_lifetime,
            },
            ephemeral_secret,
        }
    }

    /// Configuration with a fixed secret (tests, tooling)
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt: JwtConfig {
                secret: secret.into(),
                ..Default::default()
            },
            ephemeral_secret: false,
        }
    }
}

fn random_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
