//! NNTP session and I/O layer.
//!
//! Implements the command/response exchange of
//! [RFC 3977 §3](https://datatracker.ietf.org/doc/html/rfc3977#section-3)
//! over any async byte stream, plus the STARTTLS upgrade of
//! [RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::ClientConfig;

use crate::capabilities::Capabilities;
use crate::error::NntpError;
use crate::model::{ArticleStatus, Encryption, Group, NewsServer, NntpResponse, OverviewItem};
use crate::parse::{self, ExpectCode};
use crate::tls::{build_tls_config, tls_connect};

pub trait NntpIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> NntpIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// The framed transport a session talks through.
///
/// STARTTLS swaps a `Plain` value for a `Tls` one wrapping the same
/// underlying connection.
pub enum NntpStream {
    Plain(BufReader<Box<dyn NntpIo>>),
    Tls(Box<BufReader<TlsStream<Box<dyn NntpIo>>>>),
}

impl NntpStream {
    pub fn plain<S: NntpIo + 'static>(io: S) -> Self {
        NntpStream::Plain(BufReader::new(Box::new(io)))
    }

    /// A stream whose peer is gone: reads hit EOF, writes fail.
    fn closed() -> Self {
        let (io, _) = tokio::io::duplex(1);
        Self::plain(io)
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, NntpStream::Tls(_))
    }

    async fn read_until_newline(&mut self, buf: &mut Vec<u8>) -> Result<(), NntpError> {
        let bytes = match self {
            NntpStream::Plain(reader) => reader.read_until(b'\n', buf).await?,
            NntpStream::Tls(reader) => reader.read_until(b'\n', buf).await?,
        };
        if bytes == 0 {
            return Err(NntpError::ConnectionClosed);
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), NntpError> {
        match self {
            NntpStream::Plain(s) => s.get_mut().write_all(data).await?,
            NntpStream::Tls(s) => s.get_mut().write_all(data).await?,
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), NntpError> {
        match self {
            NntpStream::Plain(s) => s.get_mut().flush().await?,
            NntpStream::Tls(s) => s.get_mut().flush().await?,
        }
        Ok(())
    }
}

/// A live NNTP session.
///
/// The protocol is half-duplex: every operation takes `&mut self`, and a
/// [`BodyReader`] holds the session borrowed until it is dropped.
pub struct NntpConnection {
    stream: NntpStream,
    banner: String,
    posting_allowed: bool,
    tls: bool,
    capabilities: Option<Capabilities>,
    body_pending: bool,
    read_buf: Vec<u8>,
}

/// Streaming reader over the data block of ARTICLE, HEAD or BODY.
///
/// Lines are returned without their CRLF and with dot-stuffing removed
/// ([RFC 3977 §3.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1.1)).
/// Dropping the reader early is allowed; the session skips the rest of
/// the block before its next command.
pub struct BodyReader<'a> {
    conn: &'a mut NntpConnection,
    done: bool,
}

impl<'a> BodyReader<'a> {
    fn new(conn: &'a mut NntpConnection) -> Self {
        Self { conn, done: false }
    }

    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, NntpError> {
        if self.done {
            return Ok(None);
        }
        match self.conn.read_block_line().await? {
            Some(line) => Ok(Some(line)),
            None => {
                self.done = true;
                self.conn.body_pending = false;
                Ok(None)
            }
        }
    }

    /// Read the remaining lines, joined with CRLF.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, NntpError> {
        let mut data = Vec::new();
        while let Some(line) = self.read_line().await? {
            data.extend_from_slice(&line);
            data.extend_from_slice(b"\r\n");
        }
        Ok(data)
    }

    /// Skip whatever is left of the block.
    pub async fn discard(mut self) -> Result<(), NntpError> {
        while self.read_line().await?.is_some() {}
        Ok(())
    }
}

impl NntpConnection {
    /// Read the greeting ([RFC 3977 §5.1](https://datatracker.ietf.org/doc/html/rfc3977#section-5.1))
    /// from an established stream.
    pub async fn from_stream(stream: NntpStream) -> Result<Self, NntpError> {
        let tls = stream.is_tls();
        let mut conn = NntpConnection {
            stream,
            banner: String::new(),
            posting_allowed: false,
            tls,
            capabilities: None,
            body_pending: false,
            read_buf: Vec::with_capacity(1024),
        };
        let greeting = conn.read_response(ExpectCode::Code(2)).await?;
        match greeting.code {
            200 => conn.posting_allowed = true,
            201 => conn.posting_allowed = false,
            _ => return Err(NntpError::UnexpectedResponse(greeting.code, greeting.message)),
        }
        tracing::debug!(code = greeting.code, banner = %greeting.message, "greeting received");
        conn.banner = greeting.message;
        Ok(conn)
    }

    /// Connect to an NNTP server, handling TLS/STARTTLS negotiation.
    ///
    /// Builds a fresh [`ClientConfig`] per call. Prefer
    /// [`connect_with_tls_config`](Self::connect_with_tls_config) when making
    /// repeated connections to the same server so TLS session tickets are
    /// reused.
    pub async fn connect(server: &NewsServer) -> Result<Self, NntpError> {
        Self::connect_with_tls_config(server, None).await
    }

    /// Connect to an NNTP server with a pre-built TLS configuration.
    ///
    /// Credentials on `server` are not sent; call
    /// [`authenticate`](Self::authenticate) afterwards.
    pub async fn connect_with_tls_config(
        server: &NewsServer,
        tls_config: Option<Arc<ClientConfig>>,
    ) -> Result<Self, NntpError> {
        let tcp = TcpStream::connect((server.host.as_str(), server.port)).await?;
        tracing::debug!(host = %server.host, port = server.port, encryption = ?server.encryption, "connected");

        let tls_config = match (server.encryption, tls_config) {
            (Encryption::None, _) => None,
            (_, Some(config)) => Some(config),
            (_, None) => Some(build_tls_config(server.cert_verification)?),
        };

        match (server.encryption, tls_config) {
            (Encryption::Tls, Some(config)) => {
                let io: Box<dyn NntpIo> = Box::new(tcp);
                let tls = tls_connect(io, &server.host, config).await?;
                Self::from_stream(NntpStream::Tls(Box::new(BufReader::new(tls)))).await
            }
            (Encryption::StartTls, Some(config)) => {
                let mut conn = Self::from_stream(NntpStream::plain(tcp)).await?;
                conn.start_tls(&server.host, config).await?;
                Ok(conn)
            }
            _ => Self::from_stream(NntpStream::plain(tcp)).await,
        }
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Whether the greeting was 200 rather than 201.
    pub fn posting_allowed(&self) -> bool {
        self.posting_allowed
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Capabilities from the most recent successful CAPABILITIES, if any.
    pub fn cached_capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Send one command line and check the status code against `expect`.
    pub async fn command(
        &mut self,
        line: &str,
        expect: impl Into<ExpectCode>,
    ) -> Result<NntpResponse, NntpError> {
        if line.contains(['\r', '\n']) {
            return Err(NntpError::InvalidArguments(format!(
                "command contains a line break: {:?}",
                redact(line)
            )));
        }
        if self.body_pending {
            tracing::warn!("previous article body not consumed, skipping it");
            self.skip_block().await?;
        }
        tracing::debug!(command = %redact(line), "sending");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_response(expect.into()).await
    }

    /// [`command`](Self::command) followed by reading the data block.
    pub async fn command_lines(
        &mut self,
        line: &str,
        expect: impl Into<ExpectCode>,
    ) -> Result<Vec<String>, NntpError> {
        self.command(line, expect).await?;
        self.read_block().await
    }

    /// Read a dot-terminated block as lossily decoded text lines.
    pub async fn read_block(&mut self) -> Result<Vec<String>, NntpError> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_block_line().await? {
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(lines)
    }

    /// Authenticate with AUTHINFO USER/PASS ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3)).
    ///
    /// Returns the message of the final 281 response.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, NntpError> {
        self.command(&format!("AUTHINFO USER {username}"), 381).await?;
        let resp = self.command(&format!("AUTHINFO PASS {password}"), 281).await?;
        Ok(resp.message)
    }

    /// List newsgroups with LIST ACTIVE ([RFC 3977 §7.6.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.6.3)).
    ///
    /// Lines that do not parse are skipped.
    pub async fn list(&mut self, pattern: Option<&str>) -> Result<Vec<Group>, NntpError> {
        let line = match pattern {
            Some(pattern) if !pattern.is_empty() => format!("LIST {pattern}"),
            _ => "LIST".to_string(),
        };
        let lines = self.command_lines(&line, 215).await?;
        Ok(lines
            .iter()
            .filter_map(|line| parse::parse_list_line(line))
            .collect())
    }

    /// Select a newsgroup ([RFC 3977 §6.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.1.1)).
    pub async fn group(&mut self, name: &str) -> Result<Group, NntpError> {
        let resp = self.command(&format!("GROUP {name}"), 211).await?;
        parse::parse_group_status(&resp.message)
    }

    /// Fetch a whole article ([RFC 3977 §6.2.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.1)).
    ///
    /// `selector` is a message-id, an article number, or empty for the
    /// current article.
    pub async fn article(&mut self, selector: &str) -> Result<(ArticleStatus, BodyReader<'_>), NntpError> {
        self.fetch_article_part("ARTICLE", selector, 220).await
    }

    /// Fetch article headers ([RFC 3977 §6.2.2](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.2)).
    pub async fn head(&mut self, selector: &str) -> Result<(ArticleStatus, BodyReader<'_>), NntpError> {
        self.fetch_article_part("HEAD", selector, 221).await
    }

    /// Fetch article body ([RFC 3977 §6.2.3](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.3)).
    pub async fn body(&mut self, selector: &str) -> Result<(ArticleStatus, BodyReader<'_>), NntpError> {
        self.fetch_article_part("BODY", selector, 222).await
    }

    /// Check article existence with STAT ([RFC 3977 §6.2.4](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.4)).
    pub async fn stat(&mut self, selector: &str) -> Result<ArticleStatus, NntpError> {
        let resp = self.command(&with_argument("STAT", selector), 223).await?;
        parse::parse_article_status(&resp.message)
    }

    /// Post an article ([RFC 3977 §6.3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.3.1)).
    ///
    /// `article` holds headers and body. If reading it or writing to the
    /// server fails part way, the error is returned without sending the
    /// terminator and the session is no longer usable.
    pub async fn post<R>(&mut self, article: R) -> Result<(), NntpError>
    where
        R: AsyncRead + Unpin,
    {
        self.command("POST", 340).await?;

        let mut reader = BufReader::new(article);
        let mut line = Vec::new();
        let mut out = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            out.clear();
            parse::stuff_line(parse::trim_crlf(&line), &mut out);
            self.stream.write_all(&out).await?;
        }
        self.stream.write_all(b".\r\n").await?;
        self.stream.flush().await?;

        self.read_response(ExpectCode::Code(240)).await?;
        Ok(())
    }

    /// Fetch and cache the capability list ([RFC 3977 §5.2](https://datatracker.ietf.org/doc/html/rfc3977#section-5.2)).
    pub async fn capabilities(&mut self) -> Result<Vec<String>, NntpError> {
        let lines = self.command_lines("CAPABILITIES", 101).await?;
        let capabilities = Capabilities::new(lines);
        let lines = capabilities.lines().to_vec();
        self.capabilities = Some(capabilities);
        Ok(lines)
    }

    /// Full cached capability line for `label`, matched case-insensitively.
    pub fn get_capability(&self, label: &str) -> Option<&str> {
        self.capabilities.as_ref()?.get(label)
    }

    /// Whether the cached `label` line lists `argument`.
    pub fn has_capability_argument(&self, label: &str, argument: &str) -> Result<bool, NntpError> {
        self.capabilities
            .as_ref()
            .ok_or(NntpError::CapabilitiesNotFetched)?
            .has_argument(label, argument)
    }

    /// Overview field names ([RFC 3977 §8.4](https://datatracker.ietf.org/doc/html/rfc3977#section-8.4)).
    ///
    /// An OVER line in the capabilities implies this LIST variant, so no
    /// capability check is made here.
    pub async fn list_overview_fmt(&mut self) -> Result<Vec<String>, NntpError> {
        self.command_lines("LIST OVERVIEW.FMT", 215).await
    }

    /// Fetch overview data ([RFC 3977 §8.3](https://datatracker.ietf.org/doc/html/rfc3977#section-8.3)).
    ///
    /// No bounds means the current article, one an article number, two an
    /// inclusive range. Lines with fewer than eight fields are skipped.
    pub async fn over(&mut self, bounds: &[u64]) -> Result<Vec<OverviewItem>, NntpError> {
        let line = parse::over_command(bounds)?;
        let lines = self.command_lines(&line, 224).await?;
        Ok(lines
            .iter()
            .filter_map(|line| parse::parse_overview_line(line))
            .collect())
    }

    /// Upgrade the session with STARTTLS ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642)).
    ///
    /// After the handshake the capability list is fetched again. If the
    /// handshake or that fetch fails, the session stays marked as TLS and
    /// is not usable.
    pub async fn start_tls(
        &mut self,
        host: &str,
        tls_config: Arc<ClientConfig>,
    ) -> Result<(), NntpError> {
        if self.tls {
            return Err(NntpError::TlsAlreadyActive);
        }
        self.command("STARTTLS", 382).await?;
        self.tls = true;
        self.capabilities = None;

        let reader = match std::mem::replace(&mut self.stream, NntpStream::closed()) {
            NntpStream::Plain(reader) => reader,
            NntpStream::Tls(reader) => {
                self.stream = NntpStream::Tls(reader);
                return Err(NntpError::TlsAlreadyActive);
            }
        };
        // Bytes already buffered were sent in the clear after 382.
        if !reader.buffer().is_empty() {
            return Err(NntpError::ProtocolError(
                "unexpected data after STARTTLS response".into(),
            ));
        }

        let tls = tls_connect(reader.into_inner(), host, tls_config).await?;
        self.stream = NntpStream::Tls(Box::new(BufReader::new(tls)));
        tracing::debug!(host, "TLS negotiated");

        self.capabilities().await?;
        Ok(())
    }

    /// Gracefully close the session ([RFC 3977 §5.4](https://datatracker.ietf.org/doc/html/rfc3977#section-5.4)).
    pub async fn quit(mut self) -> Result<(), NntpError> {
        self.command("QUIT", 205).await?;
        Ok(())
    }

    async fn fetch_article_part(
        &mut self,
        verb: &str,
        selector: &str,
        expect: u16,
    ) -> Result<(ArticleStatus, BodyReader<'_>), NntpError> {
        let resp = self.command(&with_argument(verb, selector), expect).await?;
        self.body_pending = true;
        let status = parse::parse_article_status(&resp.message)?;
        Ok((status, BodyReader::new(self)))
    }

    async fn read_response(&mut self, expect: ExpectCode) -> Result<NntpResponse, NntpError> {
        self.read_buf.clear();
        self.stream.read_until_newline(&mut self.read_buf).await?;
        let line = String::from_utf8_lossy(parse::trim_crlf(&self.read_buf)).into_owned();
        let resp = parse::parse_response(&line)?;
        tracing::trace!(code = resp.code, message = %resp.message, "response");
        if !expect.matches(resp.code) {
            return Err(NntpError::UnexpectedResponse(resp.code, resp.message));
        }
        Ok(resp)
    }

    /// Next unstuffed line of a data block, `None` at the terminator.
    async fn read_block_line(&mut self) -> Result<Option<Vec<u8>>, NntpError> {
        self.read_buf.clear();
        self.stream.read_until_newline(&mut self.read_buf).await?;
        let trimmed = parse::trim_crlf(&self.read_buf);
        if parse::is_body_terminator(trimmed) {
            return Ok(None);
        }
        Ok(Some(parse::unstuff(trimmed).to_vec()))
    }

    async fn skip_block(&mut self) -> Result<(), NntpError> {
        while self.read_block_line().await?.is_some() {}
        self.body_pending = false;
        Ok(())
    }
}

fn with_argument(verb: &str, argument: &str) -> String {
    if argument.is_empty() {
        verb.to_string()
    } else {
        format!("{verb} {argument}")
    }
}

fn redact(line: &str) -> std::borrow::Cow<'_, str> {
    const PASS: &str = "AUTHINFO PASS";
    match line.get(..PASS.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(PASS) => format!("{PASS} ****").into(),
        _ => line.into(),
    }
}
