use serde::{Deserialize, Serialize};
use std::fmt;

/// The two credential kinds. Each kind has its own secret and signature strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn algorithm(self) -> Algorithm {
        match self {
            Self::Access => Algorithm::Hs512,
            Self::Refresh => Algorithm::Hs256,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Hs256,
    Hs512,
}

impl Algorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs512 => "HS512",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub user_ip: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub user_ip: String,
    /// `jti` of the access token this refresh token was issued with.
    pub access_id: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signed token payload, tagged with its kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Claims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl Claims {
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Access(_) => TokenKind::Access,
            Self::Refresh(_) => TokenKind::Refresh,
        }
    }

    #[must_use]
    pub const fn issued_at(&self) -> i64 {
        match self {
            Self::Access(claims) => claims.iat,
            Self::Refresh(claims) => claims.iat,
        }
    }

    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        match self {
            Self::Access(claims) => claims.exp,
            Self::Refresh(claims) => claims.exp,
        }
    }
}

impl From<AccessClaims> for Claims {
    fn from(claims: AccessClaims) -> Self {
        Self::Access(claims)
    }
}

impl From<RefreshClaims> for Claims {
    fn from(claims: RefreshClaims) -> Self {
        Self::Refresh(claims)
    }
}
