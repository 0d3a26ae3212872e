//! Capability list handling ([RFC 3977 §3.3](https://datatracker.ietf.org/doc/html/rfc3977#section-3.3)).

use crate::error::NntpError;

/// The lines of a CAPABILITIES response, uppercased.
///
/// "Each capability line consists of one or more tokens, which MUST be
/// separated by one or more space or TAB characters" (RFC 3977 §3.3.1).
/// The first token is the label; the rest are arguments, which for some
/// labels (`LIST ACTIVE NEWSGROUPS`) name keyword variants rather than
/// command arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    lines: Vec<String>,
}

impl Capabilities {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(|line| line.as_ref().to_uppercase())
                .collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Full line that equals `label` or whose first token is `label`,
    /// compared case-insensitively.
    pub fn get(&self, label: &str) -> Option<&str> {
        let label = label.to_uppercase();
        self.lines
            .iter()
            .find(|line| {
                **line == label
                    || line
                        .find([' ', '\t'])
                        .is_some_and(|end| line[..end] == label)
            })
            .map(String::as_str)
    }

    /// Whether the line for `label` lists `argument` among its tokens.
    pub fn has_argument(&self, label: &str, argument: &str) -> Result<bool, NntpError> {
        let line = self
            .get(label)
            .ok_or_else(|| NntpError::NoSuchCapability(label.to_string()))?;
        let argument = argument.to_uppercase();
        Ok(line.split_whitespace().skip(1).any(|token| token == argument))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }
}
