use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::{
    dtos::auth::{LoginRequest, RegisterRequest},
    models::{Claims, CredentialPair, TokenKind, User},
    services::{
        users::create_account, JwtService, ServiceError, TokenBlacklist, UserStore,
    },
    utils::{verify_against_dummy, verify_password, Password, PasswordHashString},
};

/// Blacklist entries outlive the token's own `exp` second by this margin.
const BLACKLIST_TTL_SLACK_SECONDS: i64 = 1;

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        jwt: JwtService,
    ) -> Self {
        Self {
            users,
            blacklist,
            jwt,
        }
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
    ) -> Result<(User, CredentialPair), ServiceError> {
        let user = create_account(self.users.as_ref(), req, false).await?;
        let tokens = self.jwt.issue_pair(user.id)?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok((user, tokens))
    }

    /// `req.username` may be a username or an email address.
    pub async fn login(&self, req: LoginRequest) -> Result<(User, CredentialPair), ServiceError> {
        req.validate()?;

        let identifier = req.username.trim();
        let user = match self.users.find_by_username(identifier).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(identifier).await?,
        };
        let password = Password::new(req.password);

        let Some(user) = user else {
            verify_against_dummy(&password);
            tracing::warn!("Login failed: unknown account");
            return Err(ServiceError::InvalidCredentials);
        };

        if verify_password(&password, &PasswordHashString::new(user.password_hash.clone()))
            .is_err()
        {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login refused: account disabled");
            return Err(ServiceError::AccountDisabled);
        }

        let tokens = self.jwt.issue_pair(user.id)?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok((user, tokens))
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked; only one concurrent caller can win the revocation.
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ServiceError> {
        let claims = self.jwt.verify(refresh_token, TokenKind::Refresh)?;
        let jti = claims.jti.to_string();

        if self.is_blacklisted(&jti).await? {
            tracing::warn!(user_id = %claims.sub, jti = %jti, "Refresh token reuse rejected");
            return Err(ServiceError::TokenInvalid);
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::TokenInvalid)?;

        if !self.revoke(&claims).await? {
            tracing::warn!(user_id = %user.id, jti = %jti, "Refresh token reuse rejected");
            return Err(ServiceError::TokenInvalid);
        }

        let tokens = self.jwt.issue_pair(user.id)?;

        tracing::info!(user_id = %user.id, jti = %jti, "Token refreshed");

        Ok(tokens)
    }

    /// Revoke the access token and, when it belongs to the same user, the
    /// supplied refresh token. Repeating a logout is not an error.
    pub async fn logout(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), ServiceError> {
        let claims = self.jwt.verify(access_token, TokenKind::Access)?;
        let newly_revoked = self.revoke(&claims).await?;

        if let Some(token) = refresh_token {
            match self.jwt.verify(token, TokenKind::Refresh) {
                Ok(refresh) if refresh.sub == claims.sub => {
                    self.revoke(&refresh).await?;
                }
                Ok(_) => {
                    tracing::warn!(user_id = %claims.sub, "Logout ignored refresh token of another user");
                }
                Err(e) => {
                    tracing::debug!(user_id = %claims.sub, error = %e, "Logout ignored unusable refresh token");
                }
            }
        }

        tracing::info!(
            user_id = %claims.sub,
            jti = %claims.jti,
            newly_revoked,
            "User logged out"
        );

        Ok(())
    }

    /// Verify an access token and make sure it has not been revoked.
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, ServiceError> {
        let claims = self.jwt.verify(access_token, TokenKind::Access)?;
        if self.is_blacklisted(&claims.jti.to_string()).await? {
            return Err(ServiceError::TokenInvalid);
        }
        Ok(claims)
    }

    pub async fn current_user(&self, access_token: &str) -> Result<User, ServiceError> {
        let claims = self.authenticate(access_token).await?;
        self.user_for(&claims).await
    }

    /// Resolve the owner of already-authenticated claims.
    pub async fn user_for(&self, claims: &Claims) -> Result<User, ServiceError> {
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }
        Ok(user)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, ServiceError> {
        self.blacklist
            .is_blacklisted(jti)
            .await
            .map_err(ServiceError::Store)
    }

    async fn revoke(&self, claims: &Claims) -> Result<bool, ServiceError> {
        let ttl = claims.remaining_seconds(Utc::now()) + BLACKLIST_TTL_SLACK_SECONDS;
        self.blacklist
            .revoke(&claims.jti.to_string(), ttl)
            .await
            .map_err(ServiceError::Store)
    }
}
