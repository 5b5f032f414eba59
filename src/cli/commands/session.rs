use crate::tandem::handlers::{CookieSettings, IpSource};
use crate::token::MismatchPolicy;
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};

pub const ARG_IP_MISMATCH_POLICY: &str = "ip-mismatch-policy";
pub const ARG_LOGIN_IP_SOURCE: &str = "login-ip-source";
pub const ARG_REFRESH_IP_SOURCE: &str = "refresh-ip-source";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug, Clone)]
pub struct Options {
    pub policy: MismatchPolicy,
    pub login_ip: IpSource,
    pub refresh_ip: IpSource,
    pub cookies: CookieSettings,
}

impl Options {
    /// Parse origin policy and cookie arguments.
    ///
    /// # Errors
    /// Returns an error if the cookie domain is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let domain = matches
            .get_one::<String>(ARG_COOKIE_DOMAIN)
            .map(|d| d.trim().to_string())
            .unwrap_or_default();
        if domain.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_COOKIE_DOMAIN}");
        }

        Ok(Self {
            policy: matches
                .get_one::<MismatchPolicy>(ARG_IP_MISMATCH_POLICY)
                .copied()
                .unwrap_or_default(),
            login_ip: matches
                .get_one::<IpSource>(ARG_LOGIN_IP_SOURCE)
                .copied()
                .unwrap_or_default(),
            refresh_ip: matches
                .get_one::<IpSource>(ARG_REFRESH_IP_SOURCE)
                .copied()
                .unwrap_or_default(),
            cookies: CookieSettings {
                domain,
                secure: matches.get_flag(ARG_COOKIE_SECURE),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IP_MISMATCH_POLICY)
                .long(ARG_IP_MISMATCH_POLICY)
                .help("What to do when a refresh comes from neither bound IP")
                .long_help(
                    "What to do when a refresh comes from neither bound IP.\n\n\
                     notify-and-continue: email the user and rotate anyway.\n\
                     reject-on-mismatch: email the user and answer 403.",
                )
                .env("TANDEM_IP_MISMATCH_POLICY")
                .default_value("notify-and-continue")
                .value_parser(ValueParser::new(|s: &str| s.parse::<MismatchPolicy>())),
        )
        .arg(
            Arg::new(ARG_LOGIN_IP_SOURCE)
                .long(ARG_LOGIN_IP_SOURCE)
                .help("Client address for login: forwarded (X-Forwarded-For) or remote (socket peer)")
                .env("TANDEM_LOGIN_IP_SOURCE")
                .default_value("forwarded")
                .value_parser(ValueParser::new(|s: &str| s.parse::<IpSource>())),
        )
        .arg(
            Arg::new(ARG_REFRESH_IP_SOURCE)
                .long(ARG_REFRESH_IP_SOURCE)
                .help("Client address for refresh: forwarded (X-Forwarded-For) or remote (socket peer)")
                .env("TANDEM_REFRESH_IP_SOURCE")
                .default_value("forwarded")
                .value_parser(ValueParser::new(|s: &str| s.parse::<IpSource>())),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute of the session cookies")
                .env("TANDEM_COOKIE_DOMAIN")
                .default_value("localhost"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookies Secure")
                .env("TANDEM_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}
