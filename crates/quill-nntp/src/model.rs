use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 119;
pub const DEFAULT_TLS_PORT: u16 = 563;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsServer {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub encryption: Encryption,
    #[serde(default = "default_cert_verification")]
    pub cert_verification: bool,
}

impl NewsServer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            encryption: Encryption::None,
            cert_verification: true,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cert_verification() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    #[default]
    None,
    Tls,
    StartTls,
}

/// Parsed NNTP response line.
///
/// Response codes are defined in [RFC 3977 §3.2](https://datatracker.ietf.org/doc/html/rfc3977#section-3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NntpResponse {
    pub code: u16,
    pub message: String,
}

/// Posting indicator from a LIST ACTIVE line ([RFC 3977 §7.6.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.6.3)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingStatus {
    Permitted,
    Moderated,
    #[default]
    NotPermitted,
}

impl PostingStatus {
    pub fn from_indicator(indicator: &str) -> Self {
        match indicator {
            "y" => PostingStatus::Permitted,
            "m" => PostingStatus::Moderated,
            _ => PostingStatus::NotPermitted,
        }
    }
}

/// A newsgroup as reported by LIST or GROUP.
///
/// `count` is only known after GROUP; LIST does not report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub low: u64,
    pub high: u64,
    pub count: Option<u64>,
    pub posting: PostingStatus,
}

/// Article number and message-id from a 220/221/222/223 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleStatus {
    pub number: u64,
    pub message_id: String,
}

/// One line of OVER output ([RFC 3977 §8.3](https://datatracker.ietf.org/doc/html/rfc3977#section-8.3)).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewItem {
    pub number: u64,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub message_id: String,
    pub references: String,
    pub bytes: String,
    pub lines: String,
    /// Fields after `:lines`, as announced by LIST OVERVIEW.FMT.
    pub extra: Vec<String>,
}

impl OverviewItem {
    pub fn byte_count(&self) -> Option<u64> {
        self.bytes.trim().parse().ok()
    }

    pub fn line_count(&self) -> Option<u64> {
        self.lines.trim().parse().ok()
    }
}
