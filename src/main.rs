mod auth;
mod config;
mod error;
mod gmail;
mod mailbox;
mod models;
mod responder;
mod server;

use anyhow::Context;
use google_gmail1::Gmail;
use tracing::info;

use crate::config::Config;
use crate::gmail::GmailClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::load();

    // Handle token reset
    if std::env::args().any(|arg| arg == "--reset-token") {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Please restart without --reset-token to re-authenticate.");
        return Ok(());
    }

    let secret = auth::Authenticator::load_secret(&config.credentials_path).await?;
    let auth = auth::Authenticator::authenticate(secret).await?;

    // Bootstrap is fatal: without a usable token there is nothing to serve.
    auth.token(auth::SCOPES)
        .await
        .context("Gmail authentication failed")?;

    let hub = Gmail::new(
        hyper::Client::builder().build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .expect("Failed to load native roots")
                .https_only()
                .enable_http1()
                .build(),
        ),
        auth,
    );
    let client = GmailClient::new(hub);

    let label_id = responder::resolve_label(&client, &config.label_name).await?;
    info!(label_id = %label_id, name = %config.label_name, "responder label resolved");

    let server_config = config.clone();
    tokio::spawn(async move {
        if let Err(err) = server::serve(&server_config).await {
            tracing::error!(%err, "health listener failed");
        }
    });

    responder::run(&client, &label_id, &config).await;

    Ok(())
}
