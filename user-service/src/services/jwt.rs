use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use std::fs;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{JwtConfig, SigningKeyConfig};
use crate::models::{Claims, CredentialPair, TokenKind};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(anyhow::Error),
}

/// Signs and verifies claim sets. Verification checks signature and expiry
/// only; the token kind is checked by [`JwtService`].
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &Claims) -> Result<String, TokenError>;
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;
}

/// `jsonwebtoken`-backed signer for HS256 or RS256.
pub struct JwtSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtSigner {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn rs256_from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding_key,
            decoding_key,
        })
    }

    /// Load an RS256 key pair from PEM files
    pub fn rs256_from_files(
        private_key_path: &str,
        public_key_path: &str,
    ) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                private_key_path,
                e
            )
        })?;
        let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
            anyhow::anyhow!("Failed to read public key from {}: {}", public_key_path, e)
        })?;

        Self::rs256_from_pem(private_key_pem.as_bytes(), public_key_pem.as_bytes())
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(anyhow::anyhow!("{}", e)))
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

/// Issues and checks access/refresh tokens.
#[derive(Clone)]
pub struct JwtService {
    signer: Arc<dyn TokenSigner>,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        access_token_expiry_minutes: i64,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            signer,
            access_token_expiry_minutes,
            refresh_token_expiry_days,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let signer = match &config.signing {
            SigningKeyConfig::Hmac { secret } => {
                tracing::info!("JWT service initialized with HS256 secret");
                JwtSigner::hs256(secret.expose_secret().as_bytes())
            }
            SigningKeyConfig::Rsa {
                private_key_path,
                public_key_path,
            } => {
                let signer = JwtSigner::rs256_from_files(private_key_path, public_key_path)?;
                tracing::info!("JWT service initialized with RS256 keys");
                signer
            }
        };

        Ok(Self::new(
            Arc::new(signer),
            config.access_token_expiry_minutes,
            config.refresh_token_expiry_days,
        ))
    }

    fn ttl(&self, kind: TokenKind) -> Result<Duration, TokenError> {
        let ttl = match kind {
            TokenKind::Access => Duration::try_minutes(self.access_token_expiry_minutes),
            TokenKind::Refresh => Duration::try_days(self.refresh_token_expiry_days),
        };
        ttl.ok_or_else(|| {
            TokenError::Signing(anyhow::anyhow!(
                "{} token lifetime out of range",
                kind.as_str()
            ))
        })
    }

    /// Sign a fresh token of `kind` for `user_id`, returning it with its claims.
    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<(String, Claims), TokenError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl(kind)?).ok_or_else(|| {
            TokenError::Signing(anyhow::anyhow!(
                "{} token expiry out of range",
                kind.as_str()
            ))
        })?;
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            typ: kind,
        };
        let token = self.signer.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<CredentialPair, TokenError> {
        let (access_token, _) = self.issue(user_id, TokenKind::Access)?;
        let (refresh_token, _) = self.issue(user_id, TokenKind::Refresh)?;

        Ok(CredentialPair::new(
            access_token,
            refresh_token,
            self.access_token_expiry_seconds(),
        ))
    }

    /// Verify signature and expiry, then require the expected kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.signer.verify(token)?;
        if claims.typ != expected {
            tracing::debug!(
                expected = expected.as_str(),
                actual = claims.typ.as_str(),
                "Token kind mismatch"
            );
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    pub fn sign_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        self.signer.sign(claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes.saturating_mul(60)
    }
}
