use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_MAIL_FROM: &str = "mail-from";

#[derive(Debug, Clone)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, SecretString)>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` means notifications are only logged.
    pub smtp: Option<SmtpOptions>,
}

impl Options {
    /// Parse SMTP arguments.
    ///
    /// # Errors
    /// Returns an error if only one of username and password is given.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(host) = get_non_empty(ARG_SMTP_HOST) else {
            return Ok(Self { smtp: None });
        };

        let credentials = match (
            get_non_empty(ARG_SMTP_USERNAME),
            get_non_empty(ARG_SMTP_PASSWORD),
        ) {
            (Some(user), Some(pass)) => Some((user, SecretString::from(pass))),
            (None, None) => None,
            _ => anyhow::bail!(
                "--{ARG_SMTP_USERNAME} and --{ARG_SMTP_PASSWORD} must be given together"
            ),
        };

        Ok(Self {
            smtp: Some(SmtpOptions {
                host,
                port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
                credentials,
                from: get_non_empty(ARG_MAIL_FROM)
                    .unwrap_or_else(|| "tandem@localhost".to_string()),
            }),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay for new-IP notifications; without it messages are only logged")
                .env("TANDEM_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP port (STARTTLS)")
                .env("TANDEM_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("TANDEM_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("TANDEM_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address for notifications")
                .env("TANDEM_MAIL_FROM")
                .default_value("tandem@localhost"),
        )
}
