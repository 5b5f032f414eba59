pub mod health;
pub use self::health::health;

pub mod register;
pub use self::register::register;

pub mod login;
pub use self::login::login;

pub mod refresh;
pub use self::refresh::refresh;

// common functions for the handlers
use crate::tandem::session::{IssuedPair, SessionService};
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use utoipa::ToSchema;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Where the client address is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpSource {
    /// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer.
    #[default]
    Forwarded,
    /// Socket peer only.
    Remote,
}

impl IpSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for IpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "forwarded" => Ok(Self::Forwarded),
            "remote" => Ok(Self::Remote),
            other => Err(format!("invalid ip source: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: String,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            secure: false,
        }
    }
}

/// Shared handler state, installed as an `Extension<Arc<AppState>>`.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionService,
    pub cookies: CookieSettings,
    pub login_ip: IpSource,
    pub refresh_ip: IpSource,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("policy", &self.session.policy())
            .field("cookies", &self.cookies)
            .field("login_ip", &self.login_ip)
            .field("refresh_ip", &self.refresh_ip)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub message: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, source: IpSource) -> String {
    if source == IpSource::Forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok());

        for candidate in [forwarded, real_ip].into_iter().flatten() {
            if let Ok(ip) = candidate.trim().parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }

    peer.ip().to_string()
}

/// Value of the named cookie from any `Cookie` header.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn set_cookie(name: &str, value: &str, max_age: u64, settings: &CookieSettings) -> String {
    let secure = if settings.secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; Max-Age={max_age}; Path=/; Domain={}; HttpOnly; SameSite=Lax{secure}",
        settings.domain
    )
}

/// `Set-Cookie` values for both credentials. Both live as long as the refresh
/// token so the access token is still around when it is time to rotate.
#[must_use]
pub fn session_cookies(state: &AppState, issued: &IssuedPair) -> [(header::HeaderName, String); 2] {
    let max_age = state.session.refresh_ttl_seconds();
    [
        (
            header::SET_COOKIE,
            set_cookie(ACCESS_COOKIE, &issued.access_token, max_age, &state.cookies),
        ),
        (
            header::SET_COOKIE,
            set_cookie(REFRESH_COOKIE, &issued.refresh_cookie, max_age, &state.cookies),
        ),
    ]
}
