use crate::{
    cli::{
        commands::{mail, session, tokens},
        telemetry,
    },
    tandem::{
        self,
        handlers::AppState,
        notify::{spawn_worker, EmailSender, LogEmailSender, Notifier, SmtpEmailSender},
        session::SessionService,
        store::{MemoryUserStore, PgUserStore, UserStore},
    },
    token::{PairIssuer, SecretHasher, Signer, TokenConfig},
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub tokens: tokens::Options,
    pub session: session::Options,
    pub mail: mail::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the secrets are unusable, the database or SMTP relay
/// cannot be set up, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = TokenConfig::new(args.tokens.access_secret, args.tokens.refresh_secret)
        .with_access_ttl(args.tokens.access_ttl)
        .with_refresh_ttl(args.tokens.refresh_ttl)
        .with_leeway(args.tokens.leeway);
    let signer = Signer::new(config).context("invalid token secrets")?;

    let store: Arc<dyn UserStore> = if let Some(dsn) = &args.dsn {
        let store = PgUserStore::connect(dsn).await?;
        store.ensure_schema().await?;
        Arc::new(store)
    } else {
        warn!("no --dsn given, users are kept in memory");
        Arc::new(MemoryUserStore::new())
    };

    let sender: Arc<dyn EmailSender> = match args.mail.smtp {
        Some(smtp) => Arc::new(SmtpEmailSender::new(
            &smtp.host,
            smtp.port,
            smtp.credentials,
            &smtp.from,
        )?),
        None => {
            info!("no --smtp-host given, notifications are only logged");
            Arc::new(LogEmailSender)
        }
    };

    let (notifier, queue) = Notifier::channel();
    let worker = spawn_worker(queue, sender);

    let session = SessionService::new(
        PairIssuer::new(signer),
        SecretHasher::new(),
        store,
        notifier,
    )
    .with_policy(args.session.policy);

    let state = Arc::new(AppState {
        session,
        cookies: args.session.cookies,
        login_ip: args.session.login_ip,
        refresh_ip: args.session.refresh_ip,
    });

    let result = tandem::serve(args.port, state).await;

    // the router is gone, so the queue closes once pending messages drain
    if tokio::time::timeout(Duration::from_secs(5), worker).await.is_err() {
        warn!("notification worker did not finish in time");
    }
    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "store",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("access_ttl", format!("{}s", args.tokens.access_ttl.as_secs())),
        ("refresh_ttl", format!("{}s", args.tokens.refresh_ttl.as_secs())),
        ("leeway", format!("{}s", args.tokens.leeway.as_secs())),
        ("ip_mismatch_policy", args.session.policy.to_string()),
        ("login_ip_source", args.session.login_ip.to_string()),
        ("refresh_ip_source", args.session.refresh_ip.to_string()),
        ("cookie_domain", args.session.cookies.domain.clone()),
        ("cookie_secure", args.session.cookies.secure.to_string()),
        (
            "smtp",
            args.mail.smtp.as_ref().map_or_else(
                || "log-only".to_string(),
                |smtp| format!("{}:{}", smtp.host, smtp.port),
            ),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
