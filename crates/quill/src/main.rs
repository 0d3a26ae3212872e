mod app;
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use quill_nntp::NntpConnection;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::init_tracing(cli.log_level.as_deref());

    let server = config::resolve_server(&cli)?;
    tracing::info!(host = %server.host, port = server.port, "connecting");
    let mut conn = NntpConnection::connect(&server)
        .await
        .with_context(|| format!("connecting to {}:{}", server.host, server.port))?;

    if let (Some(user), Some(password)) = (&server.username, &server.password) {
        conn.authenticate(user, password)
            .await
            .context("authenticating")?;
    }

    let mut stdout = std::io::stdout();
    app::run(&mut conn, &cli.command, &mut stdout).await?;

    conn.quit().await.context("closing session")?;
    Ok(())
}
