//! Pure parsing for NNTP status lines and data-block records
//! ([RFC 3977](https://datatracker.ietf.org/doc/html/rfc3977)).
//!
//! Nothing in here performs I/O; [`crate::protocol`] feeds it lines.

use crate::error::{NntpError, parse_number};
use crate::model::{ArticleStatus, Group, NntpResponse, OverviewItem, PostingStatus};

const OVERVIEW_FIELDS: usize = 8;

/// Which response codes a command accepts.
///
/// `Code(n)` with three digits must match exactly. With one or two digits
/// it is a prefix: `Code(2)` accepts 200..=299, `Code(21)` accepts
/// 210..=219. `Code(0)` behaves like [`ExpectCode::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectCode {
    Any,
    Code(u16),
}

impl ExpectCode {
    pub fn matches(self, code: u16) -> bool {
        let expected = match self {
            ExpectCode::Any | ExpectCode::Code(0) => return true,
            ExpectCode::Code(n) => u32::from(n),
        };
        let scale = match expected {
            1..=9 => 100,
            10..=99 => 10,
            100..=999 => 1,
            _ => return false,
        };
        let code = u32::from(code);
        code >= expected * scale && code < (expected + 1) * scale
    }
}

impl From<u16> for ExpectCode {
    fn from(code: u16) -> Self {
        ExpectCode::Code(code)
    }
}

/// Split a status line into its three-digit code and message.
pub fn parse_response(line: &str) -> Result<NntpResponse, NntpError> {
    let bytes = line.as_bytes();
    let well_formed = bytes.len() >= 3
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && (bytes.len() == 3 || bytes[3] == b' ');
    if !well_formed {
        return Err(NntpError::ProtocolError(format!("invalid response line: {line:?}")));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| NntpError::ProtocolError(format!("invalid response line: {line:?}")))?;
    let message = line[3..].trim().to_string();
    Ok(NntpResponse { code, message })
}

pub fn is_body_terminator(line: &[u8]) -> bool {
    line == b"."
}

pub fn trim_crlf(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    &buf[..end]
}

// Dot-unstuffing per RFC 3977 §3.1.1
// <https://datatracker.ietf.org/doc/html/rfc3977#section-3.1.1>
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") {
        &line[1..]
    } else {
        line
    }
}

/// Append `line` to `out` dot-stuffed and CRLF-terminated.
pub fn stuff_line(line: &[u8], out: &mut Vec<u8>) {
    if line.first() == Some(&b'.') {
        out.push(b'.');
    }
    out.extend_from_slice(line);
    out.extend_from_slice(b"\r\n");
}

/// Parse the message of a 211 reply: `count low high name`.
pub fn parse_group_status(message: &str) -> Result<Group, NntpError> {
    let parts: Vec<&str> = message.split(' ').collect();
    let [count, low, high, name] = parts.as_slice() else {
        return Err(NntpError::Parse {
            what: "GROUP response",
            text: message.to_string(),
        });
    };
    Ok(Group {
        count: Some(parse_number("article count", count)?),
        low: parse_number("low water mark", low)?,
        high: parse_number("high water mark", high)?,
        name: (*name).to_string(),
        posting: PostingStatus::default(),
    })
}

/// Parse one LIST ACTIVE line: `name high low posting`.
///
/// Returns `None` for lines that do not have that shape.
pub fn parse_list_line(line: &str) -> Option<Group> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 4 {
        tracing::warn!(line, "skipping short LIST line");
        return None;
    }
    let (Ok(high), Ok(low)) = (parts[1].parse::<u64>(), parts[2].parse::<u64>()) else {
        tracing::warn!(line, "skipping LIST line with non-numeric bounds");
        return None;
    };
    Some(Group {
        name: parts[0].to_string(),
        high,
        low,
        count: None,
        posting: PostingStatus::from_indicator(parts[3]),
    })
}

/// Parse the message of a 220/221/222/223 reply: `number message-id [text]`.
pub fn parse_article_status(message: &str) -> Result<ArticleStatus, NntpError> {
    let mut parts = message.split_whitespace();
    let (Some(number), Some(message_id)) = (parts.next(), parts.next()) else {
        return Err(NntpError::Parse {
            what: "article response",
            text: message.to_string(),
        });
    };
    Ok(ArticleStatus {
        number: parse_number("article number", number)?,
        message_id: message_id.to_string(),
    })
}

/// Parse one tab-separated OVER line.
///
/// Lines with fewer than eight fields yield `None`.
pub fn parse_overview_line(line: &str) -> Option<OverviewItem> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < OVERVIEW_FIELDS {
        tracing::trace!(line, fields = fields.len(), "skipping short overview line");
        return None;
    }
    let Ok(number) = fields[0].parse::<u64>() else {
        tracing::warn!(line, "skipping overview line with non-numeric article number");
        return None;
    };
    Some(OverviewItem {
        number,
        subject: fields[1].to_string(),
        from: fields[2].to_string(),
        date: fields[3].to_string(),
        message_id: fields[4].to_string(),
        references: fields[5].to_string(),
        bytes: fields[6].to_string(),
        lines: fields[7].to_string(),
        extra: fields[OVERVIEW_FIELDS..]
            .iter()
            .map(|field| (*field).to_string())
            .collect(),
    })
}

/// Build the OVER command line for zero, one or two bounds.
pub fn over_command(bounds: &[u64]) -> Result<String, NntpError> {
    match bounds {
        [] => Ok("OVER".to_string()),
        [number] => Ok(format!("OVER {number}")),
        [low, high] => Ok(format!("OVER {low}-{high}")),
        _ => Err(NntpError::InvalidArguments(format!(
            "OVER takes at most two bounds, got {}",
            bounds.len()
        ))),
    }
}
