//! JWT service for session credential issuance and validation
//!
//! Tokens are signed either with a shared secret (HS256) or with an RSA key
//! pair (RS256), and carry the user id and email the appointment service
//! authorizes against.

use anyhow::Result;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::models::User;

/// Default token lifetime: one day
const DEFAULT_TOKEN_EXPIRY: u64 = 86_400;

/// Signing material for tokens
#[derive(Clone)]
pub enum JwtKeys {
    /// Shared secret, HS256
    Secret(String),
    /// PEM encoded key pair, RS256
    Rsa {
        private_key: String,
        public_key: String,
    },
}

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    pub keys: JwtKeys,
    /// Token expiration time in seconds
    pub token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: Shared HS256 secret. When set, the RSA variables are ignored
    /// - `JWT_PRIVATE_KEY`: Private key for signing tokens (PEM format) or path to private key file
    /// - `JWT_PUBLIC_KEY`: Public key for verifying tokens (PEM format) or path to public key file
    /// - `JWT_TOKEN_EXPIRY`: Token expiry in seconds (default: 86400)
    pub fn from_env() -> Result<Self> {
        let token_expiry = std::env::var("JWT_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_EXPIRY);

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if secret.is_empty() {
                anyhow::bail!("JWT_SECRET must not be empty");
            }
            return Ok(Self::with_secret(secret, token_expiry));
        }

        let private_key = read_key("JWT_PRIVATE_KEY")?;
        let public_key = read_key("JWT_PUBLIC_KEY")?;

        Ok(JwtConfig {
            keys: JwtKeys::Rsa {
                private_key,
                public_key,
            },
            token_expiry,
        })
    }

    /// Configuration using a shared HS256 secret
    pub fn with_secret(secret: impl Into<String>, token_expiry: u64) -> Self {
        JwtConfig {
            keys: JwtKeys::Secret(secret.into()),
            token_expiry,
        }
    }
}

/// Read a PEM key from an environment variable holding either the key itself
/// or a path to it
fn read_key(var: &str) -> Result<String> {
    let value = std::env::var(var)
        .map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;

    if value.starts_with("-----BEGIN") {
        return Ok(value);
    }

    let key = std::fs::read_to_string(&value)
        .map_err(|e| anyhow::anyhow!("Failed to read key file {}: {}", value, e))?
        .trim()
        .to_string();

    Ok(key)
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// User email, the identity participants are matched against
    pub email: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
    token_expiry: u64,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let (encoding_key, decoding_key, algorithm) = match &config.keys {
            JwtKeys::Secret(secret) => (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
                Algorithm::HS256,
            ),
            JwtKeys::Rsa {
                private_key,
                public_key,
            } => (
                EncodingKey::from_rsa_pem(private_key.as_bytes())?,
                DecodingKey::from_rsa_pem(public_key.as_bytes())?,
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            algorithm,
            validation,
            token_expiry: config.token_expiry,
        })
    }

    /// Issue a session token bound to the user's id and email
    pub fn sign(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: now,
            exp: now + self.token_expiry,
        };

        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        let token = encode(&Header::new(self.algorithm), claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Token lifetime in seconds
    pub fn token_expiry(&self) -> u64 {
        self.token_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serial_test::serial;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Alan Turing".to_string(),
            email: "alan@example.com".to_string(),
            timezone: "Europe/London".to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn service(secret: &str) -> JwtService {
        JwtService::new(JwtConfig::with_secret(secret, 3600)).unwrap()
    }

    #[test]
    fn signed_token_round_trips_identity() {
        let jwt = service("test-secret");
        let user = user();

        let token = jwt.sign(&user).unwrap();
        let claims = jwt.verify(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = service("one-secret").sign(&user()).unwrap();
        assert!(service("another-secret").verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = service("test-secret");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "late@example.com".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };

        let token = jwt.encode_claims(&claims).unwrap();
        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(service("test-secret").verify("not.a.token").is_err());
    }

    #[test]
    #[serial]
    fn config_prefers_shared_secret() {
        unsafe {
            std::env::set_var("JWT_SECRET", "from-env");
            std::env::set_var("JWT_TOKEN_EXPIRY", "120");
        }

        let config = JwtConfig::from_env().unwrap();
        assert!(matches!(config.keys, JwtKeys::Secret(ref s) if s == "from-env"));
        assert_eq!(config.token_expiry, 120);

        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_TOKEN_EXPIRY");
        }
    }

    #[test]
    #[serial]
    fn config_without_keys_is_an_error() {
        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_PRIVATE_KEY");
            std::env::remove_var("JWT_PUBLIC_KEY");
        }

        assert!(JwtConfig::from_env().is_err());
    }
}
