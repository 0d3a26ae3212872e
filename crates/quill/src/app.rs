use std::io::Write;

use anyhow::{Context, Result};
use quill_nntp::{BodyReader, NntpConnection, PostingStatus};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Command;

/// Install the stderr subscriber. `log_level` wins over `RUST_LOG`.
pub fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run<W: Write>(conn: &mut NntpConnection, command: &Command, out: &mut W) -> Result<()> {
    match command {
        Command::Capabilities => {
            for line in conn.capabilities().await.context("CAPABILITIES")? {
                writeln!(out, "{line}")?;
            }
        }
        Command::List { pattern } => {
            let groups = conn.list(pattern.as_deref()).await.context("LIST")?;
            for group in groups {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    group.name,
                    group.low,
                    group.high,
                    posting_flag(group.posting)
                )?;
            }
        }
        Command::Group { name } => {
            let group = conn
                .group(name)
                .await
                .with_context(|| format!("selecting group {name}"))?;
            let count = group.count.unwrap_or_default();
            writeln!(out, "{}: {count} articles, {}-{}", group.name, group.low, group.high)?;
        }
        Command::Over { group, low, high } => {
            conn.group(group)
                .await
                .with_context(|| format!("selecting group {group}"))?;
            let bounds: Vec<u64> = low.iter().chain(high.iter()).copied().collect();
            for item in conn.over(&bounds).await.context("OVER")? {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    item.number, item.subject, item.from, item.date, item.message_id
                )?;
            }
        }
        Command::OverviewFmt => {
            for field in conn.list_overview_fmt().await.context("LIST OVERVIEW.FMT")? {
                writeln!(out, "{field}")?;
            }
        }
        Command::Article { selector } => {
            let (status, body) = conn.article(selector).await.context("ARTICLE")?;
            tracing::info!(number = status.number, message_id = %status.message_id, "article");
            copy_block(body, out).await?;
        }
        Command::Head { selector } => {
            let (_, body) = conn.head(selector).await.context("HEAD")?;
            copy_block(body, out).await?;
        }
        Command::Body { selector } => {
            let (_, body) = conn.body(selector).await.context("BODY")?;
            copy_block(body, out).await?;
        }
        Command::Post { file } => {
            let article = tokio::fs::File::open(file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            conn.post(article).await.context("POST")?;
            writeln!(out, "article posted")?;
        }
    }
    Ok(())
}

async fn copy_block<W: Write>(mut body: BodyReader<'_>, out: &mut W) -> Result<()> {
    while let Some(line) = body.read_line().await? {
        out.write_all(&line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn posting_flag(posting: PostingStatus) -> char {
    match posting {
        PostingStatus::Permitted => 'y',
        PostingStatus::Moderated => 'm',
        PostingStatus::NotPermitted => 'n',
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use quill_nntp::NntpStream;
    use quill_nntp_stub::{StubConfig, StubServer, load_fixtures};

    use super::*;

    fn stub() -> StubServer {
        let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/nntp/fixtures-basic.json");
        let config = StubConfig {
            bind: "127.0.0.1:0".parse().expect("addr"),
            require_auth: false,
            username: "test".to_string(),
            password: "secret".to_string(),
            disconnect_after: 0,
        };
        StubServer::new(config, load_fixtures(&fixtures).expect("fixtures load"))
    }

    async fn run_against_stub(command: Command) -> (Result<()>, String, StubServer) {
        let server = stub();
        let (client, server_io) = tokio::io::duplex(16 * 1024);
        let task_server = server.clone();
        let task =
            tokio::spawn(async move { task_server.serve_stream(server_io).await.expect("serve") });

        let mut conn = NntpConnection::from_stream(NntpStream::plain(client))
            .await
            .expect("greeting");
        let mut out = Vec::new();
        let result = run(&mut conn, &command, &mut out).await;
        conn.quit().await.expect("quit");
        task.await.expect("server task");
        (result, String::from_utf8(out).expect("utf-8"), server)
    }

    #[tokio::test]
    async fn prints_capabilities() {
        let (result, out, _) = run_against_stub(Command::Capabilities).await;
        result.expect("run");
        assert!(out.lines().any(|line| line == "VERSION 2"));
        assert!(out.lines().any(|line| line == "OVER"));
    }

    #[tokio::test]
    async fn prints_groups_with_posting_flags() {
        let (result, out, _) = run_against_stub(Command::List { pattern: None }).await;
        result.expect("run");
        assert_eq!(
            out,
            "alt.test\t1\t3\ty\ncomp.lang.rust\t10\t10\tm\nmisc.empty\t1\t0\tn\n"
        );
    }

    #[tokio::test]
    async fn prints_group_summary() {
        let (result, out, _) = run_against_stub(Command::Group {
            name: "alt.test".to_string(),
        })
        .await;
        result.expect("run");
        assert_eq!(out, "alt.test: 2 articles, 1-3\n");
    }

    #[tokio::test]
    async fn missing_group_carries_context() {
        let (result, _, _) = run_against_stub(Command::Group {
            name: "no.such".to_string(),
        })
        .await;
        let err = result.expect_err("411");
        assert!(format!("{err:#}").contains("selecting group no.such"));
    }

    #[tokio::test]
    async fn prints_overview_range() {
        let (result, out, _) = run_against_stub(Command::Over {
            group: "alt.test".to_string(),
            low: Some(1),
            high: Some(3),
        })
        .await;
        result.expect("run");
        let numbers: Vec<&str> = out
            .lines()
            .filter_map(|line| line.split('\t').next())
            .collect();
        assert_eq!(numbers, ["1", "3"]);
    }

    #[tokio::test]
    async fn prints_body_unstuffed() {
        let (result, out, _) = run_against_stub(Command::Body {
            selector: "<segment-1@test>".to_string(),
        })
        .await;
        result.expect("run");
        assert_eq!(out, "hello from the stub\n.leading dot line\nbye\n");
    }

    #[tokio::test]
    async fn posts_article_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            tmp,
            "From: dave@example.com\r\nNewsgroups: alt.test\r\nSubject: hi\r\n\r\nbody\r\n"
        )
        .expect("write");

        let (result, out, server) = run_against_stub(Command::Post {
            file: tmp.path().to_path_buf(),
        })
        .await;
        result.expect("run");
        assert_eq!(out, "article posted\n");
        let posted = server.posted().await;
        assert_eq!(posted.len(), 1);
        assert!(posted[0].starts_with("From: dave@example.com\n"));
        assert!(posted[0].ends_with("\n\nbody"));
    }
}
