//! Register, login and refresh flows over the token core and the user store.

use crate::tandem::{
    notify::Notifier,
    store::{StoreError, UserRecord, UserStore},
};
use crate::token::{
    self, check_origin,
    transport::{decode_refresh, encode_refresh},
    MismatchPolicy, OriginCheck, PairIssuer, SecretHasher,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Token(#[from] token::Error),
    #[error("persistence failure")]
    PersistenceFailure(#[source] StoreError),
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("request origin does not match the session")]
    OriginMismatch,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("internal error")]
    Internal(String),
}

impl SessionError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Token(err) if err.is_credential_failure() => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::UserExists => StatusCode::CONFLICT,
            Self::OriginMismatch => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Token(_) | Self::PersistenceFailure(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("session failure: {self:#}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// What a successful login or refresh hands back to the client.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedPair {
    pub access_token: String,
    /// Base64 transport form of the refresh token; this is the cookie value.
    pub refresh_cookie: String,
    pub expires_in: u64,
}

impl std::fmt::Debug for IssuedPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedPair")
            .field("access_token", &"***")
            .field("refresh_cookie", &"***")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct SessionService {
    issuer: PairIssuer,
    hasher: SecretHasher,
    store: Arc<dyn UserStore>,
    notifier: Notifier,
    policy: MismatchPolicy,
}

impl SessionService {
    #[must_use]
    pub fn new(
        issuer: PairIssuer,
        hasher: SecretHasher,
        store: Arc<dyn UserStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            issuer,
            hasher,
            store,
            notifier,
            policy: MismatchPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> u64 {
        self.issuer.signer().config().access_ttl().as_secs()
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> u64 {
        self.issuer.signer().config().refresh_ttl().as_secs()
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a malformed email or empty password, `UserExists`
    /// for a taken email, `PersistenceFailure` if the store fails.
    pub async fn register(&self, email: &str, password: &str) -> Result<Uuid, SessionError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(SessionError::InvalidRequest("invalid email"));
        }
        if password.is_empty() {
            return Err(SessionError::InvalidRequest("password required"));
        }
        if self
            .store
            .find_by_email(&email)
            .await
            .map_err(persistence)?
            .is_some()
        {
            return Err(SessionError::UserExists);
        }

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash = blocking(move || hasher.hash_password(&password)).await?;

        let record = UserRecord {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            refresh_token_hash: None,
        };

        match self.store.create(&record).await {
            Ok(()) => {
                info!(user_id = %record.user_id, "user registered");
                Ok(record.user_id)
            }
            Err(StoreError::Conflict) => Err(SessionError::UserExists),
            Err(err) => Err(persistence(err)),
        }
    }

    /// Authenticate `user_id` and issue a pair bound to `ip`.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `InvalidCredentials`, or `PersistenceFailure` when the
    /// new refresh hash cannot be stored (the pair is then discarded).
    pub async fn login(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        ip: &str,
    ) -> Result<IssuedPair, SessionError> {
        let user = self.load_user(user_id).await?;

        let hasher = self.hasher.clone();
        let stored = user.password_hash.clone();
        let password = password.to_string();
        let password_ok =
            blocking(move || Ok(hasher.verify_password(&stored, &password))).await?;

        if user.email != normalize_email(email) || !password_ok {
            return Err(SessionError::InvalidCredentials);
        }

        let pair = self.issuer.issue_pair(&user.user_id.to_string(), ip)?;
        let issued = self.persist(user.user_id, pair.access_token, &pair.refresh_token).await?;

        info!(user_id = %user.user_id, %ip, "user logged in");
        Ok(issued)
    }

    /// Rotate a presented pair after checking its linkage, the stored hash and
    /// the observed origin, in that order. An unpaired pair never reaches the
    /// origin check, so it neither notifies nor reports `OriginMismatch`.
    ///
    /// # Errors
    ///
    /// Token verification errors, `UserNotFound`, `SecretMismatch` when the
    /// refresh token is not the one last stored, `OriginMismatch` under
    /// [`MismatchPolicy::RejectOnMismatch`], `TokensNotPaired`, or
    /// `PersistenceFailure`.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_cookie: &str,
        ip: &str,
    ) -> Result<IssuedPair, SessionError> {
        let refresh_cookie = refresh_cookie.trim();
        let signer = self.issuer.signer();
        let access = signer.verify_access(access_token)?;
        let refresh = signer.verify_refresh(&decode_refresh(refresh_cookie)?)?;
        PairIssuer::check_linkage(&access, &refresh)?;

        let user = self.load_user(&refresh.sub).await?;

        let Some(stored) = user.refresh_token_hash.clone() else {
            warn!(user_id = %user.user_id, "refresh presented with no stored hash");
            return Err(token::Error::SecretMismatch.into());
        };
        let hasher = self.hasher.clone();
        let presented = refresh_cookie.to_string();
        if !blocking(move || Ok(hasher.compare(&stored, &presented))).await? {
            warn!(user_id = %user.user_id, "refresh token does not match stored hash");
            return Err(token::Error::SecretMismatch.into());
        }

        if check_origin(&access, &refresh, ip) == OriginCheck::Anomalous {
            warn!(
                user_id = %user.user_id,
                %ip,
                access_ip = %access.user_ip,
                refresh_ip = %refresh.user_ip,
                policy = %self.policy,
                "refresh from unrecognized ip"
            );
            self.notifier.notify_new_origin(&user.email, ip);
            if self.policy == MismatchPolicy::RejectOnMismatch {
                return Err(SessionError::OriginMismatch);
            }
        }

        let pair = self.issuer.rotate(&access, &refresh, ip)?;
        let issued = self.persist(user.user_id, pair.access_token, &pair.refresh_token).await?;

        info!(user_id = %user.user_id, %ip, "token pair rotated");
        Ok(issued)
    }

    async fn load_user(&self, user_id: &str) -> Result<UserRecord, SessionError> {
        let user_id = Uuid::parse_str(user_id).map_err(|_| SessionError::UserNotFound)?;
        self.store
            .find_by_id(user_id)
            .await
            .map_err(persistence)?
            .ok_or(SessionError::UserNotFound)
    }

    async fn persist(
        &self,
        user_id: Uuid,
        access_token: String,
        refresh_token: &str,
    ) -> Result<IssuedPair, SessionError> {
        let refresh_cookie = encode_refresh(refresh_token);

        let hasher = self.hasher.clone();
        let encoded = refresh_cookie.clone();
        let digest = blocking(move || hasher.hash(&encoded)).await?;

        self.store
            .update_refresh_hash(user_id, &digest)
            .await
            .map_err(persistence)?;

        Ok(IssuedPair {
            access_token,
            refresh_cookie,
            expires_in: self.access_ttl_seconds(),
        })
    }
}

fn persistence(err: StoreError) -> SessionError {
    error!("user store failure: {err:#}");
    SessionError::PersistenceFailure(err)
}

async fn blocking<T, F>(f: F) -> Result<T, SessionError>
where
    F: FnOnce() -> Result<T, token::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| SessionError::Internal(err.to_string()))?
        .map_err(SessionError::from)
}
