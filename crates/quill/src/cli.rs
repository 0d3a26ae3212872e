use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Command-line NNTP newsreader")]
pub struct Cli {
    /// JSON file describing the news server.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "QUILL_HOST")]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long, conflicts_with = "starttls", help = "Connect with implicit TLS")]
    pub tls: bool,

    #[arg(long, help = "Upgrade a plain connection with STARTTLS")]
    pub starttls: bool,

    #[arg(long, help = "Skip server certificate verification")]
    pub insecure: bool,

    #[arg(long, env = "QUILL_USER", requires = "password")]
    pub user: Option<String>,

    #[arg(long, env = "QUILL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(
        short,
        long,
        help = "Log filter (trace, debug, info, warn, error); defaults to RUST_LOG"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the server capability list
    Capabilities,
    /// List newsgroups, optionally filtered by a wildmat
    List { pattern: Option<String> },
    /// Select a group and print its article counts
    Group { name: String },
    /// Print overview lines for a range of articles in GROUP
    Over {
        group: String,
        low: Option<u64>,
        #[arg(requires = "low")]
        high: Option<u64>,
    },
    /// Print the overview field order
    OverviewFmt,
    /// Print a whole article by number or message-id
    Article { selector: String },
    /// Print article headers
    Head { selector: String },
    /// Print article body
    Body { selector: String },
    /// Post the article in FILE (headers, blank line, body)
    Post { file: PathBuf },
}
