use crate::token::{
    claims::{AccessClaims, Algorithm, Claims, RefreshClaims, TokenKind},
    Error,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::time::{Duration, SystemTime};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(10);

/// Secret material and lifetimes for both credential kinds.
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    leeway: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            leeway: DEFAULT_LEEWAY,
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"***")
            .field("refresh_secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway", &self.leeway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn new(alg: Algorithm) -> Self {
        Self {
            alg: alg.as_str().to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Issues and verifies compact HMAC-signed tokens for both credential kinds.
#[derive(Debug, Clone)]
pub struct Signer {
    config: TokenConfig,
}

impl Signer {
    /// Build a signer from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterial`] if either secret is empty or both secrets are identical.
    pub fn new(config: TokenConfig) -> Result<Self, Error> {
        let access = config.access_secret.expose_secret();
        let refresh = config.refresh_secret.expose_secret();
        if access.is_empty() {
            return Err(Error::KeyMaterial("access secret is empty"));
        }
        if refresh.is_empty() {
            return Err(Error::KeyMaterial("refresh secret is empty"));
        }
        if access == refresh {
            return Err(Error::KeyMaterial("access and refresh secrets must differ"));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.config.access_secret.expose_secret().as_bytes(),
            TokenKind::Refresh => self.config.refresh_secret.expose_secret().as_bytes(),
        }
    }

    /// Sign claims with the secret and algorithm of their kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signing fails.
    pub fn issue(&self, claims: &Claims) -> Result<String, Error> {
        let kind = claims.kind();
        let payload = serde_json::to_vec(claims)?;
        encode_segments(kind.algorithm(), self.secret(kind), &payload)
    }

    /// Verify a token of the given kind against the system clock.
    ///
    /// # Errors
    ///
    /// See [`Signer::verify_at`].
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, Error> {
        self.verify_at(kind, token, now_unix_seconds())
    }

    /// Verify a token of the given kind and return its decoded claims.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the token is malformed, uses another algorithm, or the signature is invalid ([`Error::InvalidToken`]),
    /// - the payload does not decode into claims of `kind` ([`Error::UnknownClaimsShape`]),
    /// - `now` is outside `[iat - leeway, exp + leeway]` ([`Error::Expired`]).
    pub fn verify_at(&self, kind: TokenKind, token: &str, now: i64) -> Result<Claims, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::InvalidToken)?;
        let claims_b64 = parts.next().ok_or(Error::InvalidToken)?;
        let sig_b64 = parts.next().ok_or(Error::InvalidToken)?;
        if parts.next().is_some() {
            return Err(Error::InvalidToken);
        }

        let header_bytes =
            Base64UrlUnpadded::decode_vec(header_b64).map_err(|_| Error::InvalidToken)?;
        let header: TokenHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| Error::InvalidToken)?;
        let alg = kind.algorithm();
        if header.alg != alg.as_str() {
            return Err(Error::InvalidToken);
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::InvalidToken)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        verify_signature(alg, self.secret(kind), signing_input.as_bytes(), &signature)?;

        let payload = Base64UrlUnpadded::decode_vec(claims_b64).map_err(|_| Error::InvalidToken)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|err| match err.classify() {
            Category::Data => Error::UnknownClaimsShape,
            _ => Error::InvalidToken,
        })?;
        if claims.kind() != kind {
            return Err(Error::UnknownClaimsShape);
        }

        let leeway = seconds(self.config.leeway);
        if now > claims.expires_at().saturating_add(leeway) {
            return Err(Error::Expired);
        }
        if claims.issued_at() > now.saturating_add(leeway) {
            return Err(Error::Expired);
        }

        Ok(claims)
    }

    /// # Errors
    ///
    /// See [`Signer::verify_at`].
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, Error> {
        self.verify_access_at(token, now_unix_seconds())
    }

    /// # Errors
    ///
    /// See [`Signer::verify_at`].
    pub fn verify_access_at(&self, token: &str, now: i64) -> Result<AccessClaims, Error> {
        match self.verify_at(TokenKind::Access, token, now)? {
            Claims::Access(claims) => Ok(claims),
            Claims::Refresh(_) => Err(Error::UnknownClaimsShape),
        }
    }

    /// # Errors
    ///
    /// See [`Signer::verify_at`].
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, Error> {
        self.verify_refresh_at(token, now_unix_seconds())
    }

    /// # Errors
    ///
    /// See [`Signer::verify_at`].
    pub fn verify_refresh_at(&self, token: &str, now: i64) -> Result<RefreshClaims, Error> {
        match self.verify_at(TokenKind::Refresh, token, now)? {
            Claims::Refresh(claims) => Ok(claims),
            Claims::Access(_) => Err(Error::UnknownClaimsShape),
        }
    }
}

fn encode_segments(alg: Algorithm, secret: &[u8], payload: &[u8]) -> Result<String, Error> {
    let header = serde_json::to_vec(&TokenHeader::new(alg))?;
    let header_b64 = Base64UrlUnpadded::encode_string(&header);
    let claims_b64 = Base64UrlUnpadded::encode_string(payload);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature = sign(alg, secret, signing_input.as_bytes())?;
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);
    Ok(format!("{signing_input}.{signature_b64}"))
}

fn sign(alg: Algorithm, secret: &[u8], input: &[u8]) -> Result<Vec<u8>, Error> {
    match alg {
        Algorithm::Hs256 => {
            let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::Signing)?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        Algorithm::Hs512 => {
            let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| Error::Signing)?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

// constant-time comparison via `verify_slice`
fn verify_signature(
    alg: Algorithm,
    secret: &[u8],
    input: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    match alg {
        Algorithm::Hs256 => {
            let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::InvalidToken)?;
            mac.update(input);
            mac.verify_slice(signature).map_err(|_| Error::InvalidToken)
        }
        Algorithm::Hs512 => {
            let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| Error::InvalidToken)?;
            mac.update(input);
            mac.verify_slice(signature).map_err(|_| Error::InvalidToken)
        }
    }
}

pub(crate) fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) const NOW: i64 = 1_700_000_000;

    pub(crate) fn test_signer() -> Signer {
        let config = TokenConfig::new(
            SecretString::from("access-secret-for-tests"),
            SecretString::from("refresh-secret-for-tests"),
        );
        Signer::new(config).expect("valid test secrets")
    }

    fn access_claims() -> AccessClaims {
        AccessClaims {
            sub: "u1".to_string(),
            user_ip: "10.0.0.1".to_string(),
            jti: "access-1".to_string(),
            iat: NOW,
            exp: NOW + 1800,
        }
    }

    fn refresh_claims() -> RefreshClaims {
        RefreshClaims {
            sub: "u1".to_string(),
            user_ip: "10.0.0.1".to_string(),
            access_id: "access-1".to_string(),
            jti: "refresh-1".to_string(),
            iat: NOW,
            exp: NOW + 604_800,
        }
    }

    #[test]
    fn access_round_trip() -> Result<(), Error> {
        let signer = test_signer();
        let claims = access_claims();
        let token = signer.issue(&claims.clone().into())?;
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(signer.verify_access_at(&token, NOW)?, claims);
        Ok(())
    }

    #[test]
    fn refresh_round_trip() -> Result<(), Error> {
        let signer = test_signer();
        let claims = refresh_claims();
        let token = signer.issue(&claims.clone().into())?;
        assert_eq!(signer.verify_refresh_at(&token, NOW)?, claims);
        Ok(())
    }

    #[test]
    fn header_names_kind_algorithm() -> Result<(), Error> {
        let signer = test_signer();
        let access = signer.issue(&access_claims().into())?;
        let refresh = signer.issue(&refresh_claims().into())?;

        let header = |token: &str| -> Result<TokenHeader, Error> {
            let segment = token.split('.').next().ok_or(Error::InvalidToken)?;
            let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| Error::InvalidToken)?;
            Ok(serde_json::from_slice(&bytes)?)
        };
        assert_eq!(header(&access)?.alg, "HS512");
        assert_eq!(header(&refresh)?.alg, "HS256");
        Ok(())
    }

    #[test]
    fn expiry_respects_leeway() -> Result<(), Error> {
        let signer = test_signer();
        let claims = access_claims();
        let token = signer.issue(&claims.clone().into())?;
        let leeway = seconds(signer.config().leeway());

        assert!(signer.verify_access_at(&token, claims.exp - leeway).is_ok());
        assert!(signer.verify_access_at(&token, claims.exp + leeway).is_ok());
        assert!(matches!(
            signer.verify_access_at(&token, claims.exp + leeway + 1),
            Err(Error::Expired)
        ));
        Ok(())
    }

    #[test]
    fn issued_in_the_future_is_rejected() -> Result<(), Error> {
        let signer = test_signer();
        let token = signer.issue(&access_claims().into())?;
        let leeway = seconds(signer.config().leeway());

        assert!(signer.verify_access_at(&token, NOW - leeway).is_ok());
        assert!(matches!(
            signer.verify_access_at(&token, NOW - leeway - 1),
            Err(Error::Expired)
        ));
        Ok(())
    }

    #[test]
    fn corrupted_signature_is_invalid() -> Result<(), Error> {
        let signer = test_signer();
        let token = signer.issue(&access_claims().into())?;

        let sig_start = token.rfind('.').ok_or(Error::InvalidToken)? + 1;
        let mut bytes = token.into_bytes();
        let target = sig_start + 5;
        bytes[target] = if bytes[target] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).map_err(|_| Error::InvalidToken)?;

        assert!(matches!(
            signer.verify_access_at(&corrupted, NOW),
            Err(Error::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_invalid() {
        let signer = test_signer();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**", "eyJ9.eyJ9.AA"] {
            assert!(
                matches!(
                    signer.verify_at(TokenKind::Access, token, NOW),
                    Err(Error::InvalidToken)
                ),
                "token {token:?} should be invalid"
            );
        }
    }

    #[test]
    fn access_token_is_not_a_refresh_token() -> Result<(), Error> {
        let signer = test_signer();
        let access = signer.issue(&access_claims().into())?;
        let refresh = signer.issue(&refresh_claims().into())?;

        assert!(matches!(
            signer.verify_refresh_at(&access, NOW),
            Err(Error::InvalidToken)
        ));
        assert!(matches!(
            signer.verify_access_at(&refresh, NOW),
            Err(Error::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn kind_mismatch_under_valid_signature_is_unknown_shape() -> Result<(), Error> {
        let signer = test_signer();
        let payload = serde_json::to_vec(&Claims::Refresh(refresh_claims()))?;
        let token = encode_segments(
            Algorithm::Hs512,
            signer.secret(TokenKind::Access),
            &payload,
        )?;

        assert!(matches!(
            signer.verify_access_at(&token, NOW),
            Err(Error::UnknownClaimsShape)
        ));
        Ok(())
    }

    #[test]
    fn missing_fields_under_valid_signature_is_unknown_shape() -> Result<(), Error> {
        let signer = test_signer();
        let payload = serde_json::to_vec(&json!({ "kind": "access", "sub": "u1" }))?;
        let token = encode_segments(
            Algorithm::Hs512,
            signer.secret(TokenKind::Access),
            &payload,
        )?;

        assert!(matches!(
            signer.verify_access_at(&token, NOW),
            Err(Error::UnknownClaimsShape)
        ));
        Ok(())
    }

    #[test]
    fn foreign_secret_is_invalid() -> Result<(), Error> {
        let signer = test_signer();
        let other = Signer::new(TokenConfig::new(
            SecretString::from("another-access-secret"),
            SecretString::from("another-refresh-secret"),
        ))?;
        let token = other.issue(&access_claims().into())?;

        assert!(matches!(
            signer.verify_access_at(&token, NOW),
            Err(Error::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn signer_rejects_weak_key_material() {
        let same = TokenConfig::new(SecretString::from("same"), SecretString::from("same"));
        assert!(matches!(Signer::new(same), Err(Error::KeyMaterial(_))));

        let empty = TokenConfig::new(SecretString::from(""), SecretString::from("refresh"));
        assert!(matches!(Signer::new(empty), Err(Error::KeyMaterial(_))));
    }

    #[test]
    fn config_debug_redacts_secrets() {
        let config = TokenConfig::new(
            SecretString::from("top-secret-access"),
            SecretString::from("top-secret-refresh"),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("***"));
    }
}
