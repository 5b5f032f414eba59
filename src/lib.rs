//! # Tandem
//!
//! `tandem` issues access and refresh tokens as a linked pair and rotates
//! them together.
//!
//! ## Tokens
//!
//! The access token is a short lived HS512 JWT; the refresh token is a long
//! lived HS256 JWT signed with a different secret. The refresh token records
//! the access token's `jti`, so a refresh token only rotates the access token
//! it was issued with. Both carry the client IP seen at issuance.
//!
//! ## Storage
//!
//! Only a salted hash of the current refresh token is stored per user. Every
//! rotation overwrites it, so a refresh token works exactly once.
//!
//! ## Origin checks
//!
//! A refresh from an IP matching neither bound address emails the user. The
//! rotation then continues or is refused depending on the configured
//! [`token::MismatchPolicy`].

pub mod cli;
pub mod tandem;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
