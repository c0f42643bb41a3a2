//! Newline-delimited wire protocol shared by the server and the client.
//!
//! Client → server: the first line is the display name, every later line is one
//! chat message body. Server → client lines carry a tag:
//!
//! ```text
//! JOIN <name>
//! LEAVE <name>
//! MSG <name> <body>
//! ERR <reason>
//! ```
//!
//! `<name>` is escaped so it never contains a space (`\` → `\\`, ` ` → `\s`);
//! `<body>` and `<reason>` run verbatim to the end of the line.

use std::fmt;

use thiserror::Error;

/// Port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 2133;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Longest accepted inbound line, in bytes (newline excluded).
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Display name the server keeps for its own notices.
pub const RESERVED_NAME: &str = "System";

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

pub const TAG_JOIN: &str = "JOIN";
pub const TAG_LEAVE: &str = "LEAVE";
pub const TAG_MSG: &str = "MSG";
pub const TAG_ERR: &str = "ERR";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
    #[error("`{tag}` line is missing its {field}")]
    MissingField {
        tag: &'static str,
        field: &'static str,
    },
    #[error("invalid escape sequence in name `{0}`")]
    BadEscape(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("display name cannot be empty")]
    Empty,
    #[error("display name is longer than {max} characters")]
    TooLong { max: usize },
}

// ---------------------------------------------------------------------------
// Server → Client line
// ---------------------------------------------------------------------------

/// One line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    Join { name: String },
    Leave { name: String },
    Msg { name: String, body: String },
    Error { reason: String },
}

impl ServerLine {
    /// Render to wire text, without the trailing newline.
    pub fn render(&self) -> String {
        match self {
            ServerLine::Join { name } => format!("{TAG_JOIN} {}", escape_name(name)),
            ServerLine::Leave { name } => format!("{TAG_LEAVE} {}", escape_name(name)),
            ServerLine::Msg { name, body } => format!("{TAG_MSG} {} {body}", escape_name(name)),
            ServerLine::Error { reason } => format!("{TAG_ERR} {reason}"),
        }
    }

    /// Parse one line of wire text (newline already stripped).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (tag, rest) = match line.split_once(' ') {
            Some((tag, rest)) => (tag, rest),
            None => (line, ""),
        };

        match tag {
            TAG_JOIN => Ok(ServerLine::Join {
                name: parse_name(TAG_JOIN, rest)?,
            }),
            TAG_LEAVE => Ok(ServerLine::Leave {
                name: parse_name(TAG_LEAVE, rest)?,
            }),
            TAG_MSG => {
                // An empty body renders as "MSG <name> " but tolerate the
                // space being gone.
                let (raw_name, body) = rest.split_once(' ').unwrap_or((rest, ""));
                Ok(ServerLine::Msg {
                    name: parse_name(TAG_MSG, raw_name)?,
                    body: body.to_string(),
                })
            }
            TAG_ERR => {
                if rest.is_empty() {
                    return Err(ProtocolError::MissingField {
                        tag: TAG_ERR,
                        field: "reason",
                    });
                }
                Ok(ServerLine::Error {
                    reason: rest.to_string(),
                })
            }
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn parse_name(tag: &'static str, raw: &str) -> Result<String, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::MissingField { tag, field: "name" });
    }
    unescape_name(raw)
}

// ---------------------------------------------------------------------------
// Name escaping
// ---------------------------------------------------------------------------

pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape_name(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            _ => return Err(ProtocolError::BadEscape(raw.to_string())),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Display names
// ---------------------------------------------------------------------------

/// Trim a requested display name and check it is non-empty and short enough.
pub fn validate_name(raw: &str) -> Result<&str, NameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(NameError::TooLong { max: MAX_NAME_LEN });
    }
    Ok(name)
}

pub fn is_reserved_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(RESERVED_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_tag() {
        let join = ServerLine::Join { name: "bob".into() };
        assert_eq!(join.render(), "JOIN bob");

        let leave = ServerLine::Leave { name: "bob".into() };
        assert_eq!(leave.render(), "LEAVE bob");

        let msg = ServerLine::Msg {
            name: "bob".into(),
            body: "hi".into(),
        };
        assert_eq!(msg.render(), "MSG bob hi");

        let err = ServerLine::Error {
            reason: "server is full".into(),
        };
        assert_eq!(err.to_string(), "ERR server is full");
    }

    #[test]
    fn names_with_spaces_and_backslashes_survive() {
        let line = ServerLine::Msg {
            name: r"dr. who \ co".into(),
            body: "hello,  world! \\ (50%) ;-)".into(),
        };
        let rendered = line.render();
        assert_eq!(rendered, r"MSG dr.\swho\s\\\sco hello,  world! \ (50%) ;-)");
        assert_eq!(ServerLine::parse(&rendered).unwrap(), line);
    }

    #[test]
    fn empty_body_parses_with_or_without_separator() {
        let expected = ServerLine::Msg {
            name: "bob".into(),
            body: String::new(),
        };
        assert_eq!(ServerLine::parse("MSG bob ").unwrap(), expected);
        assert_eq!(ServerLine::parse("MSG bob").unwrap(), expected);
    }

    #[test]
    fn body_keeps_leading_and_trailing_spaces() {
        let parsed = ServerLine::parse("MSG bob   spaced out  ").unwrap();
        assert_eq!(
            parsed,
            ServerLine::Msg {
                name: "bob".into(),
                body: "  spaced out  ".into(),
            }
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(ServerLine::parse(""), Err(ProtocolError::Empty));
        assert_eq!(
            ServerLine::parse("HELLO bob"),
            Err(ProtocolError::UnknownTag("HELLO".into()))
        );
        assert_eq!(
            ServerLine::parse("JOIN"),
            Err(ProtocolError::MissingField {
                tag: TAG_JOIN,
                field: "name"
            })
        );
        assert_eq!(
            ServerLine::parse("ERR "),
            Err(ProtocolError::MissingField {
                tag: TAG_ERR,
                field: "reason"
            })
        );
        assert!(matches!(
            ServerLine::parse(r"LEAVE bad\x"),
            Err(ProtocolError::BadEscape(_))
        ));
        assert!(matches!(
            ServerLine::parse(r"LEAVE trailing\"),
            Err(ProtocolError::BadEscape(_))
        ));
    }

    #[test]
    fn validate_name_trims_and_bounds() {
        assert_eq!(validate_name("  alice \t"), Ok("alice"));
        assert_eq!(validate_name("   "), Err(NameError::Empty));
        assert_eq!(validate_name(""), Err(NameError::Empty));

        let longest = "x".repeat(MAX_NAME_LEN);
        assert_eq!(validate_name(&longest), Ok(longest.as_str()));
        let too_long = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            validate_name(&too_long),
            Err(NameError::TooLong { max: MAX_NAME_LEN })
        );

        // Counted in characters, not bytes.
        let wide = "é".repeat(MAX_NAME_LEN);
        assert!(validate_name(&wide).is_ok());
    }

    #[test]
    fn reserved_name_is_case_insensitive() {
        assert!(is_reserved_name("System"));
        assert!(is_reserved_name("SYSTEM"));
        assert!(!is_reserved_name("systemd"));
    }
}
