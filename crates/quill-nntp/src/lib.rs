//! NNTP (Network News Transfer Protocol) client implementation.
//!
//! Covers the reader side of [RFC 3977](https://datatracker.ietf.org/doc/html/rfc3977):
//! - Connection and greeting ([RFC 3977 §5.1](https://datatracker.ietf.org/doc/html/rfc3977#section-5.1))
//! - Generic command/response exchange with expected-code matching
//! - Multi-line response dot-unstuffing and dot-stuffed posting ([RFC 3977 §3.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1.1))
//! - Authentication via AUTHINFO USER/PASS ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3))
//! - LIST, GROUP, ARTICLE, HEAD, BODY, STAT, POST
//! - CAPABILITIES and capability lookups ([RFC 3977 §5.2](https://datatracker.ietf.org/doc/html/rfc3977#section-5.2))
//! - LIST OVERVIEW.FMT and OVER ([RFC 3977 §8](https://datatracker.ietf.org/doc/html/rfc3977#section-8))
//! - STARTTLS upgrade ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642))

mod capabilities;
mod error;
mod model;
pub mod parse;
mod protocol;
mod tls;

pub use crate::capabilities::Capabilities;
pub use crate::error::NntpError;
pub use crate::model::{
    ArticleStatus, DEFAULT_PORT, DEFAULT_TLS_PORT, Encryption, Group, NewsServer, NntpResponse,
    OverviewItem, PostingStatus,
};
pub use crate::parse::ExpectCode;
pub use crate::protocol::{BodyReader, NntpConnection, NntpIo, NntpStream};
pub use crate::tls::build_tls_config;
