use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_ACCESS_SECRET: &str = "access-secret";
pub const ARG_REFRESH_SECRET: &str = "refresh-secret";
pub const ARG_ACCESS_TTL: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl-seconds";
pub const ARG_LEEWAY: &str = "leeway-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub leeway: Duration,
}

impl Options {
    /// Parse signing secrets and lifetimes.
    ///
    /// # Errors
    /// Returns an error if a secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = |id: &str| -> anyhow::Result<SecretString> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => Ok(SecretString::from(value.clone())),
                _ => anyhow::bail!("missing required argument: --{id}"),
            }
        };
        let seconds = |id: &str| Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(0));

        Ok(Self {
            access_secret: secret(ARG_ACCESS_SECRET)?,
            refresh_secret: secret(ARG_REFRESH_SECRET)?,
            access_ttl: seconds(ARG_ACCESS_TTL),
            refresh_ttl: seconds(ARG_REFRESH_TTL),
            leeway: seconds(ARG_LEEWAY),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_SECRET)
                .long(ARG_ACCESS_SECRET)
                .help("HMAC secret for access tokens (HS512)")
                .env("TANDEM_ACCESS_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_SECRET)
                .long(ARG_REFRESH_SECRET)
                .help("HMAC secret for refresh tokens (HS256), must differ from the access secret")
                .env("TANDEM_REFRESH_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token TTL in seconds")
                .env("TANDEM_ACCESS_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token TTL in seconds, also the cookie Max-Age")
                .env("TANDEM_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LEEWAY)
                .long(ARG_LEEWAY)
                .help("Clock skew tolerated when checking iat and exp, in seconds")
                .env("TANDEM_LEEWAY_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn command() -> Command {
        with_args(Command::new("tandem"))
    }

    #[test]
    fn parses_secrets_and_defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("TANDEM_ACCESS_SECRET", None::<&str>),
                ("TANDEM_REFRESH_SECRET", None::<&str>),
                ("TANDEM_ACCESS_TTL_SECONDS", None::<&str>),
                ("TANDEM_REFRESH_TTL_SECONDS", None::<&str>),
                ("TANDEM_LEEWAY_SECONDS", None::<&str>),
            ],
            || {
                let matches = command().try_get_matches_from([
                    "tandem",
                    "--access-secret",
                    "a-secret",
                    "--refresh-secret",
                    "r-secret",
                ])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.access_secret.expose_secret(), "a-secret");
                assert_eq!(options.refresh_secret.expose_secret(), "r-secret");
                assert_eq!(options.access_ttl, Duration::from_secs(1800));
                assert_eq!(options.refresh_ttl, Duration::from_secs(604_800));
                assert_eq!(options.leeway, Duration::from_secs(10));
                Ok(())
            },
        )
    }

    #[test]
    fn reads_env() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("TANDEM_ACCESS_SECRET", Some("env-access")),
                ("TANDEM_REFRESH_SECRET", Some("env-refresh")),
                ("TANDEM_ACCESS_TTL_SECONDS", Some("60")),
                ("TANDEM_REFRESH_TTL_SECONDS", Some("3600")),
                ("TANDEM_LEEWAY_SECONDS", Some("0")),
            ],
            || {
                let matches = command().try_get_matches_from(["tandem"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.access_secret.expose_secret(), "env-access");
                assert_eq!(options.access_ttl, Duration::from_secs(60));
                assert_eq!(options.refresh_ttl, Duration::from_secs(3600));
                assert_eq!(options.leeway, Duration::ZERO);
                Ok(())
            },
        )
    }

    #[test]
    fn missing_or_blank_secret_fails() {
        temp_env::with_vars(
            [
                ("TANDEM_ACCESS_SECRET", Some("  ")),
                ("TANDEM_REFRESH_SECRET", Some("env-refresh")),
            ],
            || {
                let matches = command().get_matches_from(["tandem"]);
                let err = Options::parse(&matches).map(|_| ()).map_err(|e| e.to_string());
                assert_eq!(
                    err,
                    Err("missing required argument: --access-secret".to_string())
                );
            },
        );
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let result = command().try_get_matches_from([
            "tandem",
            "--access-secret",
            "a",
            "--refresh-secret",
            "b",
            "--access-ttl-seconds",
            "0",
        ]);
        assert!(result.is_err());
    }
}
