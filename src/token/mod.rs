//! Paired access/refresh credentials.
//!
//! An access token (HS512, short lived) and a refresh token (HS256, long
//! lived) are always issued together. The refresh token carries the access
//! token's `jti` as `access_id`, and rotation refuses any pair where the two
//! do not line up. Both tokens also carry the IP they were issued to, which
//! the caller compares against the IP presenting them.
//!
//! The public surface is small:
//!
//! - [`PairIssuer::issue_pair`] and [`PairIssuer::rotate`]
//! - [`Signer::verify_access`] and [`Signer::verify_refresh`]
//! - [`SecretHasher::hash`] and [`SecretHasher::compare`]
//!
//! Everything here is synchronous and holds no mutable state, so a single
//! instance can be shared across request handlers.

pub mod claims;
mod error;
pub mod jwt;
pub mod origin;
pub mod pair;
pub mod secret;
pub mod transport;

pub use claims::{AccessClaims, Algorithm, Claims, RefreshClaims, TokenKind};
pub use error::Error;
pub use jwt::{Signer, TokenConfig};
pub use origin::{check_origin, MismatchPolicy, OriginCheck};
pub use pair::{PairIssuer, TokenPair};
pub use secret::{HashParams, SecretHasher};
