use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub type StubError = Box<dyn std::error::Error + Send + Sync>;

const OVERVIEW_FMT: [&str; 7] = [
    "Subject:",
    "From:",
    "Date:",
    "Message-ID:",
    "References:",
    ":bytes",
    ":lines",
];

#[derive(Debug, Deserialize, Clone)]
pub struct FixtureConfig {
    pub greeting: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub posting_allowed: bool,
    pub groups: BTreeMap<String, GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    #[serde(default = "default_posting")]
    pub posting: String,
    pub articles: Vec<ArticleFixture>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArticleFixture {
    pub number: u64,
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    #[serde(default)]
    pub references: String,
    pub body: String,
}

impl ArticleFixture {
    fn head(&self) -> String {
        let mut head = format!(
            "Message-ID: {}\nSubject: {}\nFrom: {}\nDate: {}",
            self.message_id, self.subject, self.from, self.date
        );
        if !self.references.is_empty() {
            head.push_str(&format!("\nReferences: {}", self.references));
        }
        head
    }

    fn overview(&self) -> String {
        let body_lines = self.body.lines().count();
        [
            self.number.to_string(),
            self.subject.clone(),
            self.from.clone(),
            self.date.clone(),
            self.message_id.clone(),
            self.references.clone(),
            self.body.len().to_string(),
            body_lines.to_string(),
        ]
        .join("\t")
    }
}

fn default_posting() -> String {
    "y".to_string()
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub bind: SocketAddr,
    pub require_auth: bool,
    pub username: String,
    pub password: String,
    pub disconnect_after: usize,
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    current_group: Option<String>,
    current_article: Option<u64>,
    commands_seen: usize,
}

#[derive(Clone)]
pub struct StubServer {
    state: Arc<ServerState>,
}

impl StubServer {
    pub fn new(config: StubConfig, fixtures: FixtureConfig) -> Self {
        Self {
            state: Arc::new(ServerState {
                config,
                fixtures,
                posted: Mutex::new(Vec::new()),
            }),
        }
    }

    pub async fn serve(self) -> Result<(), StubError> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!(%peer, "stub client connected");
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, state).await {
                    tracing::warn!("client error: {err}");
                }
            });
        }
    }

    pub async fn serve_once(&self) -> Result<(), StubError> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        let (stream, _) = listener.accept().await?;
        handle_client(stream, Arc::clone(&self.state)).await
    }

    /// Serve a single session over an already connected stream.
    pub async fn serve_stream<S>(&self, stream: S) -> Result<(), StubError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        handle_client(stream, Arc::clone(&self.state)).await
    }

    /// Articles received through POST, in arrival order.
    pub async fn posted(&self) -> Vec<String> {
        self.state.posted.lock().await.clone()
    }
}

struct ServerState {
    config: StubConfig,
    fixtures: FixtureConfig,
    posted: Mutex<Vec<String>>,
}

impl ServerState {
    fn find_by_message_id(&self, message_id: &str) -> Option<&ArticleFixture> {
        self.fixtures
            .groups
            .values()
            .flat_map(|group| group.articles.iter())
            .find(|article| article.message_id == message_id)
    }
}

pub fn load_fixtures(path: &Path) -> Result<FixtureConfig, StubError> {
    let data = std::fs::read_to_string(path)?;
    let fixtures = serde_json::from_str(&data)?;
    Ok(fixtures)
}

async fn handle_client<S>(stream: S, state: Arc<ServerState>) -> Result<(), StubError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let greeting = state.fixtures.greeting.clone().unwrap_or_else(|| {
        if state.fixtures.posting_allowed {
            "200 quill stub ready".to_string()
        } else {
            "201 quill stub ready, posting prohibited".to_string()
        }
    });
    write_line(&mut writer, &greeting).await?;

    let mut session = SessionState {
        authenticated: !state.config.require_auth,
        ..SessionState::default()
    };

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        let command_line = line.trim();
        if command_line.is_empty() {
            continue;
        }

        session.commands_seen += 1;
        if should_disconnect(&state.config, &session) {
            return Ok(());
        }

        let (command, args) = match command_line.split_once(' ') {
            Some((command, args)) => (command.to_uppercase(), args.trim()),
            None => (command_line.to_uppercase(), ""),
        };

        let open = matches!(command.as_str(), "QUIT" | "CAPABILITIES" | "AUTHINFO" | "STARTTLS");
        if !open && !session.authenticated {
            write_line(&mut writer, "480 authentication required").await?;
            continue;
        }

        match command.as_str() {
            "QUIT" => {
                write_line(&mut writer, "205 closing connection").await?;
                break;
            }
            "CAPABILITIES" => {
                write_line(&mut writer, "101 capability list follows").await?;
                send_block(&mut writer, state.fixtures.capabilities.iter()).await?;
            }
            "STARTTLS" => {
                write_line(&mut writer, "580 can not initiate TLS negotiation").await?;
            }
            "AUTHINFO" => {
                handle_authinfo(args, &state, &mut session, &mut writer).await?;
            }
            "LIST" => {
                handle_list(args, &state, &mut writer).await?;
            }
            "GROUP" => {
                handle_group(args, &state, &mut session, &mut writer).await?;
            }
            "ARTICLE" | "HEAD" | "BODY" | "STAT" => {
                handle_article(&command, args, &state, &mut session, &mut writer).await?;
            }
            "OVER" | "XOVER" => {
                handle_over(args, &state, &session, &mut writer).await?;
            }
            "POST" => {
                handle_post(&state, &mut reader, &mut writer).await?;
            }
            _ => {
                write_line(&mut writer, "500 command not recognized").await?;
            }
        }
    }

    Ok(())
}

async fn handle_authinfo<W: AsyncWrite + Unpin>(
    args: &str,
    state: &ServerState,
    session: &mut SessionState,
    writer: &mut W,
) -> Result<(), StubError> {
    let Some((verb, value)) = args.split_once(' ') else {
        return write_line(writer, "501 syntax error").await;
    };

    match verb.to_uppercase().as_str() {
        "USER" => {
            if value == state.config.username {
                write_line(writer, "381 password required").await
            } else {
                write_line(writer, "481 authentication rejected").await
            }
        }
        "PASS" => {
            if value == state.config.password {
                session.authenticated = true;
                write_line(writer, "281 authentication accepted").await
            } else {
                write_line(writer, "481 authentication rejected").await
            }
        }
        _ => write_line(writer, "501 syntax error").await,
    }
}

async fn handle_list<W: AsyncWrite + Unpin>(
    args: &str,
    state: &ServerState,
    writer: &mut W,
) -> Result<(), StubError> {
    let mut parts = args.split_whitespace();
    let first = parts.next();
    let keyword = first.map(str::to_uppercase);

    // Anything that is not a known keyword is taken as a bare wildmat.
    let pattern = match keyword.as_deref() {
        Some("ACTIVE") => parts.next().unwrap_or("*"),
        Some("OVERVIEW.FMT") | None => "*",
        Some(_) => first.unwrap_or("*"),
    };

    match keyword.as_deref() {
        Some("OVERVIEW.FMT") => {
            write_line(writer, "215 order of fields in overview database").await?;
            send_block(writer, OVERVIEW_FMT.iter()).await
        }
        _ => {
            write_line(writer, "215 list of newsgroups follows").await?;
            let lines = state
                .fixtures
                .groups
                .iter()
                .filter(|(name, _)| wildmat(pattern, name))
                .map(|(name, group)| {
                    let (low, high) = water_marks(group);
                    format!("{name} {high} {low} {}", group.posting)
                });
            send_block(writer, lines).await
        }
    }
}

async fn handle_group<W: AsyncWrite + Unpin>(
    name: &str,
    state: &ServerState,
    session: &mut SessionState,
    writer: &mut W,
) -> Result<(), StubError> {
    let Some(group) = state.fixtures.groups.get(name) else {
        return write_line(writer, "411 no such group").await;
    };
    let count = group.articles.len();
    let (low, high) = water_marks(group);
    session.current_group = Some(name.to_string());
    session.current_article = group.articles.first().map(|article| article.number);
    write_line(writer, &format!("211 {count} {low} {high} {name}")).await
}

async fn handle_article<W: AsyncWrite + Unpin>(
    command: &str,
    selector: &str,
    state: &ServerState,
    session: &mut SessionState,
    writer: &mut W,
) -> Result<(), StubError> {
    let (number, article) = if selector.starts_with('<') {
        match state.find_by_message_id(selector) {
            Some(article) => (0, article),
            None => return write_line(writer, "430 no such article").await,
        }
    } else {
        let Some(group) = current_group(state, session) else {
            return write_line(writer, "412 no newsgroup selected").await;
        };
        let number = if selector.is_empty() {
            match session.current_article {
                Some(number) => number,
                None => return write_line(writer, "420 current article number is invalid").await,
            }
        } else {
            match selector.parse::<u64>() {
                Ok(number) => number,
                Err(_) => return write_line(writer, "501 syntax error").await,
            }
        };
        match group.articles.iter().find(|article| article.number == number) {
            Some(article) => {
                session.current_article = Some(number);
                (number, article)
            }
            None => return write_line(writer, "423 no article with that number").await,
        }
    };

    let message_id = &article.message_id;
    match command {
        "ARTICLE" => {
            write_line(writer, &format!("220 {number} {message_id} article follows")).await?;
            let text = format!("{}\n\n{}", article.head(), article.body);
            send_block(writer, text.split('\n')).await
        }
        "HEAD" => {
            write_line(writer, &format!("221 {number} {message_id} headers follow")).await?;
            send_block(writer, article.head().split('\n')).await
        }
        "BODY" => {
            write_line(writer, &format!("222 {number} {message_id} body follows")).await?;
            send_block(writer, article.body.split('\n')).await
        }
        _ => write_line(writer, &format!("223 {number} {message_id} article exists")).await,
    }
}

async fn handle_over<W: AsyncWrite + Unpin>(
    range: &str,
    state: &ServerState,
    session: &SessionState,
    writer: &mut W,
) -> Result<(), StubError> {
    let Some(group) = current_group(state, session) else {
        return write_line(writer, "412 no newsgroup selected").await;
    };
    let (low, high) = if range.is_empty() {
        match session.current_article {
            Some(number) => (number, number),
            None => return write_line(writer, "420 current article number is invalid").await,
        }
    } else {
        match parse_range(range) {
            Some(bounds) => bounds,
            None => return write_line(writer, "501 syntax error").await,
        }
    };

    let lines: Vec<String> = group
        .articles
        .iter()
        .filter(|article| article.number >= low && article.number <= high)
        .map(ArticleFixture::overview)
        .collect();
    if lines.is_empty() {
        return write_line(writer, "423 no articles in that range").await;
    }
    write_line(writer, "224 overview information follows").await?;
    send_block(writer, lines.iter()).await
}

async fn handle_post<R, W>(
    state: &ServerState,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), StubError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !state.fixtures.posting_allowed {
        return write_line(writer, "440 posting not permitted").await;
    }
    write_line(writer, "340 send article to be posted").await?;

    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err("connection closed during POST".into());
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "." {
            break;
        }
        let line = if line.starts_with("..") { &line[1..] } else { line };
        lines.push(line.to_string());
    }
    state.posted.lock().await.push(lines.join("\n"));
    write_line(writer, "240 article received OK").await
}

fn current_group<'a>(state: &'a ServerState, session: &SessionState) -> Option<&'a GroupConfig> {
    session
        .current_group
        .as_ref()
        .and_then(|name| state.fixtures.groups.get(name))
}

fn water_marks(group: &GroupConfig) -> (u64, u64) {
    let low = group.articles.iter().map(|a| a.number).min();
    let high = group.articles.iter().map(|a| a.number).max();
    match (low, high) {
        (Some(low), Some(high)) => (low, high),
        _ => (1, 0),
    }
}

/// `n`, `n-` or `n-m` as in RFC 3977 §8.3.
fn parse_range(range: &str) -> Option<(u64, u64)> {
    match range.split_once('-') {
        None => {
            let number = range.parse().ok()?;
            Some((number, number))
        }
        Some((low, "")) => Some((low.parse().ok()?, u64::MAX)),
        Some((low, high)) => Some((low.parse().ok()?, high.parse().ok()?)),
    }
}

/// Minimal wildmat: `*` and `?` only.
fn wildmat(pattern: &str, text: &str) -> bool {
    fn matches(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(&pattern[1..], text) || (!text.is_empty() && matches(pattern, &text[1..]))
            }
            (Some(b'?'), Some(_)) => matches(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => matches(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), text.as_bytes())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), StubError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn send_block<W, I, S>(writer: &mut W, lines: I) -> Result<(), StubError>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        let line = line.as_ref().trim_end_matches('\r');
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn should_disconnect(config: &StubConfig, session: &SessionState) -> bool {
    config.disconnect_after > 0 && session.commands_seen >= config.disconnect_after
}
