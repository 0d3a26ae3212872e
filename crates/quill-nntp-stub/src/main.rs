use std::path::PathBuf;

use clap::Parser;

use quill_nntp_stub::{StubConfig, StubServer, load_fixtures};

#[derive(Parser, Debug)]
#[command(
    name = "quill-nntp-stub",
    about = "Fixture-driven NNTP stub server for exercising quill"
)]
struct Args {
    /// Address to listen on; every accepted connection gets its own session.
    #[arg(long, default_value = "127.0.0.1:3119")]
    bind: std::net::SocketAddr,

    /// JSON file with the greeting, capability lines and newsgroups to serve.
    #[arg(long, default_value = "fixtures/nntp/fixtures-basic.json")]
    fixtures: PathBuf,

    /// Answer 480 to everything but CAPABILITIES, AUTHINFO and QUIT until logged in.
    #[arg(long, default_value_t = false)]
    require_auth: bool,

    /// Accepted AUTHINFO USER name.
    #[arg(long, default_value = "test")]
    username: String,

    /// Accepted AUTHINFO PASS value.
    #[arg(long, default_value = "secret")]
    password: String,

    /// Drop the connection when this many commands have been received (0 = never).
    #[arg(long, default_value_t = 0)]
    disconnect_after: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let fixtures = load_fixtures(&args.fixtures)?;
    let fixtures_groups = fixtures.groups.len();
    let config = StubConfig {
        bind: args.bind,
        require_auth: args.require_auth,
        username: args.username,
        password: args.password,
        disconnect_after: args.disconnect_after,
    };
    let server = StubServer::new(config, fixtures);
    println!(
        "NNTP stub listening on {} with {} group(s) from {}",
        args.bind,
        fixtures_groups,
        args.fixtures.display()
    );
    server.serve().await?;
    Ok(())
}
