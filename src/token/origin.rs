use crate::token::claims::{AccessClaims, RefreshClaims};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// What to do with a rotation whose origin matches neither bound IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Notify the subject and still rotate.
    #[default]
    NotifyAndContinue,
    /// Notify the subject and refuse the rotation.
    RejectOnMismatch,
}

impl MismatchPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotifyAndContinue => "notify-and-continue",
            Self::RejectOnMismatch => "reject-on-mismatch",
        }
    }
}

impl fmt::Display for MismatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "notify-and-continue" => Ok(Self::NotifyAndContinue),
            "reject-on-mismatch" => Ok(Self::RejectOnMismatch),
            other => Err(format!("invalid ip mismatch policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginCheck {
    Trusted,
    Anomalous,
}

/// Check an observed origin against the IPs bound into a pair. Either match is enough.
#[must_use]
pub fn check_origin(access: &AccessClaims, refresh: &RefreshClaims, observed: &str) -> OriginCheck {
    if same_ip(&access.user_ip, observed) || same_ip(&refresh.user_ip, observed) {
        OriginCheck::Trusted
    } else {
        OriginCheck::Anomalous
    }
}

/// Compare two addresses, treating IPv4-mapped IPv6 as its IPv4 form.
#[must_use]
pub fn same_ip(bound: &str, observed: &str) -> bool {
    match (parse_ip(bound), parse_ip(observed)) {
        (Some(a), Some(b)) => a == b,
        _ => bound.trim() == observed.trim(),
    }
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    let ip = value.trim().parse::<IpAddr>().ok()?;
    Some(match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 @ IpAddr::V4(_) => v4,
    })
}
