//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{mail, session, tokens};
use anyhow::{Context, Result};
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());
    if let Some(dsn) = &dsn {
        Url::parse(dsn).context("invalid --dsn")?;
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        tokens: tokens::Options::parse(matches)?,
        session: session::Options::parse(matches)?,
        mail: mail::Options::parse(matches)?,
    }))
}
