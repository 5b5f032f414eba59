//! Linked access/refresh pairs: issuance and rotation.

use crate::token::{
    claims::{AccessClaims, Claims, RefreshClaims},
    jwt::{now_unix_seconds, seconds, Signer},
    Error,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Freshly signed credentials. The refresh token is in its signed form, not
/// the transport encoding handed to clients.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_id: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("access_id", &self.access_id)
            .finish()
    }
}

/// Mints linked pairs and rotates them.
#[derive(Debug, Clone)]
pub struct PairIssuer {
    signer: Signer,
}

impl PairIssuer {
    #[must_use]
    pub fn new(signer: Signer) -> Self {
        Self { signer }
    }

    #[must_use]
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Issue a new pair for `subject` bound to `origin_ip`.
    ///
    /// # Errors
    ///
    /// Returns the signer error if either token cannot be signed.
    pub fn issue_pair(&self, subject: &str, origin_ip: &str) -> Result<TokenPair, Error> {
        self.issue_pair_at(subject, origin_ip, now_unix_seconds())
    }

    /// # Errors
    ///
    /// Returns the signer error if either token cannot be signed.
    pub fn issue_pair_at(
        &self,
        subject: &str,
        origin_ip: &str,
        now: i64,
    ) -> Result<TokenPair, Error> {
        let config = self.signer.config();
        let access_id = Uuid::new_v4().to_string();

        let access = Claims::Access(AccessClaims {
            sub: subject.to_string(),
            user_ip: origin_ip.to_string(),
            jti: access_id.clone(),
            iat: now,
            exp: now.saturating_add(seconds(config.access_ttl())),
        });
        let refresh = Claims::Refresh(RefreshClaims {
            sub: subject.to_string(),
            user_ip: origin_ip.to_string(),
            access_id: access_id.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(seconds(config.refresh_ttl())),
        });

        let access_token = self.signer.issue(&access)?;
        let refresh_token = self.signer.issue(&refresh)?;

        debug!(subject, access_id = %access_id, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_id,
        })
    }

    /// Replace a verified pair with a new one bound to `current_origin_ip`.
    ///
    /// Both claim sets must already be verified; only the linkage between them
    /// is checked here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokensNotPaired`] if the refresh token was not issued
    /// with this access token, or a signer error.
    pub fn rotate(
        &self,
        access: &AccessClaims,
        refresh: &RefreshClaims,
        current_origin_ip: &str,
    ) -> Result<TokenPair, Error> {
        self.rotate_at(access, refresh, current_origin_ip, now_unix_seconds())
    }

    /// # Errors
    ///
    /// See [`PairIssuer::rotate`].
    pub fn rotate_at(
        &self,
        access: &AccessClaims,
        refresh: &RefreshClaims,
        current_origin_ip: &str,
        now: i64,
    ) -> Result<TokenPair, Error> {
        Self::check_linkage(access, refresh)?;
        self.issue_pair_at(&refresh.sub, current_origin_ip, now)
    }

    /// Confirm `refresh` was issued together with `access`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokensNotPaired`] when `refresh.access_id` is not `access.jti`.
    pub fn check_linkage(access: &AccessClaims, refresh: &RefreshClaims) -> Result<(), Error> {
        if access.jti != refresh.access_id {
            warn!(
                subject = %refresh.sub,
                access_id = %access.jti,
                paired_access_id = %refresh.access_id,
                "refresh token presented with a foreign access token"
            );
            return Err(Error::TokensNotPaired);
        }
        Ok(())
    }
}
