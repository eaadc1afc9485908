//! Builder for server transcripts
//!
//! ```ignore
//! let transcript = Transcript::new()
//!     .exists(1)
//!     .flags("\\Seen $Work")
//!     .fetch(1, "UID 10 FLAGS ($Work)")
//!     .fetch_literal(1, "UID 10 RFC822.HEADER", b"Subject: hi\r\n\r\n");
//! ```
//!
//! Every entry is one complete server response, terminated by CRLF,
//! with literals inline as they would arrive on the wire.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    responses: Vec<Vec<u8>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw response line; CRLF is added.
    pub fn line(mut self, line: &str) -> Self {
        self.responses.push(format!("{line}\r\n").into_bytes());
        self
    }

    /// `* <count> EXISTS`
    pub fn exists(self, count: u32) -> Self {
        self.line(&format!("* {count} EXISTS"))
    }

    /// `* <seq> EXPUNGE`
    pub fn expunge(self, seq: u32) -> Self {
        self.line(&format!("* {seq} EXPUNGE"))
    }

    /// `* FLAGS (<flags>)`
    pub fn flags(self, flags: &str) -> Self {
        self.line(&format!("* FLAGS ({flags})"))
    }

    /// `* OK [PERMANENTFLAGS (<flags>)] Limited`
    pub fn permanent_flags(self, flags: &str) -> Self {
        self.line(&format!("* OK [PERMANENTFLAGS ({flags})] Limited"))
    }

    /// `* <seq> FETCH (<items>)`
    pub fn fetch(self, seq: u32, items: &str) -> Self {
        self.line(&format!("* {seq} FETCH ({items})"))
    }

    /// `* <seq> FETCH (<items> {n}\r\n<literal>)`
    pub fn fetch_literal(mut self, seq: u32, items: &str, literal: &[u8]) -> Self {
        let mut response = format!("* {seq} FETCH ({items} {{{}}}\r\n", literal.len()).into_bytes();
        response.extend_from_slice(literal);
        response.extend_from_slice(b")\r\n");
        self.responses.push(response);
        self
    }

    /// The session sent a STORE touching `seq`.
    pub fn store(self, seq: u32) -> Self {
        self.line(&format!("> STORE {seq}"))
    }

    /// The session sent a FETCH touching `seq`.
    pub fn begin_fetch(self, seq: u32) -> Self {
        self.line(&format!("> FETCH {seq}"))
    }

    /// The tagged reply for a command touching `seq` arrived.
    pub fn done(self, seq: u32) -> Self {
        self.line(&format!("> DONE {seq}"))
    }

    pub fn responses(&self) -> &[Vec<u8>] {
        &self.responses
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.responses.concat()
    }

    /// Write the transcript to `dir/name` and return the path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()).expect("write transcript");
        path
    }
}

/// An ENVELOPE value whose Message-Id is `message_id`.
pub fn envelope(subject: &str, message_id: &str) -> String {
    format!(
        "(\"Mon, 1 Jan 2024 10:00:00 +0000\" \"{subject}\" \
         NIL NIL NIL NIL NIL NIL NIL \"{message_id}\")"
    )
}
