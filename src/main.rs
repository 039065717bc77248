//! maskboxd - the alias engine as a newline-delimited JSON daemon.
//!
//! Reads one [`Request`](maskbox::channel::Request) per stdin line and
//! writes one response per stdout line. A malformed line gets a
//! `channel:parse:error` response instead of killing the daemon.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use maskbox::adapters::sqlite::create_pool;
use maskbox::channel::{self, Request, Response};
use maskbox::config;
use maskbox::relay::HttpMailRelay;
use maskbox::state::{AccountContext, AppState};
use maskbox::types::error::{MaskboxError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "maskbox=info,error".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config::init_config()?;
    let mut cfg = config::get_config()?;
    let minted = cfg.account.secret_box_priv_key.is_none();
    let secret = cfg.account_secret();
    if minted {
        // The secret must survive restarts or registered namespaces can
        // no longer be re-derived.
        info!("Minted account root secret, saving config to {:?}", config_path);
        config::persist_config(&cfg, &config_path)?;
    }
    config::set_config(cfg.clone())?;

    if cfg.account.mail_domain.is_empty() {
        return Err(MaskboxError::Config(
            "account.mail_domain is not configured".to_string(),
        ));
    }

    let db_path = cfg.db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Opening message store at {:?}", db_path);
    let pool = create_pool(&db_path)?;

    let relay = HttpMailRelay::new(
        &cfg.relay.base_url,
        Duration::from_secs(cfg.relay.timeout_secs),
    )?;

    let state = AppState::new(
        pool,
        Arc::new(relay),
        AccountContext {
            mailbox_id: cfg.account.mailbox_id,
            mail_domain: cfg.account.mail_domain.clone(),
            secret_box_priv_key: secret,
        },
    );

    info!(
        "maskboxd serving aliases for mailbox {} on {}",
        cfg.account.mailbox_id, cfg.account.mail_domain
    );
    serve_stdio(state).await
}

async fn serve_stdio(state: AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => channel::dispatch(&state, request).await,
            Err(e) => {
                warn!("Dropping malformed request line: {e}");
                Response::failure(
                    "channel:parse",
                    &MaskboxError::Parse(format!("malformed request: {e}")),
                )
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
