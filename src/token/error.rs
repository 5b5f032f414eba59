use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("unknown claims shape")]
    UnknownClaimsShape,
    #[error("tokens are not paired")]
    TokensNotPaired,
    #[error("refresh token does not match stored secret")]
    SecretMismatch,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid key material: {0}")]
    KeyMaterial(&'static str),
    #[error("signing failed")]
    Signing,
    #[error("hash error")]
    Hash,
}

impl Error {
    /// Errors caused by the presented credential rather than by this process.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken
                | Self::Expired
                | Self::UnknownClaimsShape
                | Self::TokensNotPaired
                | Self::SecretMismatch
        )
    }
}
