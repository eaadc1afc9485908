//! Parsed IMAP argument trees
//!
//! One server response is handed to the state handlers as a tree of
//! [`ImapArg`] nodes. The handlers only ever need to tell atoms,
//! strings, NIL and lists apart; literals whose contents were not read
//! keep their declared size so size checks still work.

use std::borrow::Cow;
use std::fmt::Write as _;

/// One node of a parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapArg {
    Atom(String),
    /// Quoted string or literal contents.
    String(Vec<u8>),
    Nil,
    List(Vec<ImapArg>),
    /// A literal whose data was skipped; only its size is known.
    LiteralSize(u64),
}

impl ImapArg {
    /// Convenience constructor for quoted/literal strings.
    pub fn string(value: impl Into<Vec<u8>>) -> Self {
        Self::String(value.into())
    }

    pub fn atom(value: impl Into<String>) -> Self {
        Self::Atom(value.into())
    }

    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Bytes of an atom or string value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Atom(atom) => Some(atom.as_bytes()),
            Self::String(data) => Some(data),
            _ => None,
        }
    }

    /// Text of an atom or string value, lossily decoded.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        self.as_bytes().map(String::from_utf8_lossy)
    }

    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Serialize back to IMAP syntax.
    ///
    /// Lists are written with their parentheses; see
    /// [`list_to_imap_string`] for the bare contents of a list.
    #[must_use]
    pub fn to_imap_string(&self) -> String {
        let mut out = String::new();
        self.write_imap(&mut out);
        out
    }

    fn write_imap(&self, out: &mut String) {
        match self {
            Self::Atom(atom) => out.push_str(atom),
            Self::Nil => out.push_str("NIL"),
            Self::LiteralSize(size) => {
                let _ = write!(out, "{{{size}}}");
            }
            Self::String(data) => {
                out.push('"');
                for ch in String::from_utf8_lossy(data).chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
            Self::List(items) => {
                out.push('(');
                write_list(items, out);
                out.push(')');
            }
        }
    }
}

/// Serialize the contents of a list without the enclosing parentheses.
#[must_use]
pub fn list_to_imap_string(items: &[ImapArg]) -> String {
    let mut out = String::new();
    write_list(items, &mut out);
    out
}

fn write_list(items: &[ImapArg], out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        item.write_imap(out);
    }
}

/// Find the value following `name` in a FETCH-style name/value list.
///
/// Only atoms in name position are considered; the match is
/// case-insensitive.
#[must_use]
pub fn fetch_item<'a>(items: &'a [ImapArg], name: &str) -> Option<&'a ImapArg> {
    items
        .chunks_exact(2)
        .find(|pair| pair[0].as_atom().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .map(|pair| &pair[1])
}
