use std::path::Path;

use anyhow::{Context, Result};
use quill_nntp::{DEFAULT_PORT, DEFAULT_TLS_PORT, Encryption, NewsServer};

use crate::cli::Cli;

pub fn load_server(path: &Path) -> Result<NewsServer> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading server config: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing server config: {}", path.display()))
}

/// Server settings from the optional config file with command-line flags applied on top.
pub fn resolve_server(cli: &Cli) -> Result<NewsServer> {
    let mut server = match (&cli.config, &cli.host) {
        (Some(path), _) => load_server(path)?,
        (None, Some(host)) => NewsServer::new(host.clone()),
        (None, None) => anyhow::bail!("no server given; use --host or --config"),
    };

    if let Some(host) = &cli.host {
        server.host = host.clone();
    }
    if cli.tls {
        server.encryption = Encryption::Tls;
        if server.port == DEFAULT_PORT {
            server.port = DEFAULT_TLS_PORT;
        }
    } else if cli.starttls {
        server.encryption = Encryption::StartTls;
    }
    if let Some(port) = cli.port {
        server.port = port;
    }
    if cli.insecure {
        server.cert_verification = false;
    }
    if let (Some(user), Some(password)) = (&cli.user, &cli.password) {
        server.username = Some(user.clone());
        server.password = Some(password.clone());
    }

    if server.host.is_empty() {
        anyhow::bail!("server host is empty");
    }
    Ok(server)
}
