//! FETCH response handling
//!
//! A FETCH reply can bind the view's sequence number to a UID, bind the
//! UID to a Message-Id, and carry values that every later reply about
//! the same UID or message must agree with.

use crate::args::{ImapArg, fetch_item, list_to_imap_string};
use crate::error::Result;
use crate::handler::StateHandler;
use crate::message::{Message, MessageRef};
use crate::metadata::Uid;
use chrono::{DateTime, FixedOffset};
use tracing::debug;

/// `BODY`/`BODYSTRUCTURE` reply some servers send for unparsable messages.
pub const BODY_NIL_REPLY: &str = "\"text\" \"plain\" NIL NIL NIL \"7bit\" 0 0 NIL NIL NIL";
/// `ENVELOPE` reply with every field NIL.
pub const ENVELOPE_NIL_REPLY: &str = "NIL NIL NIL NIL NIL NIL NIL NIL NIL NIL";
/// `RFC822.SIZE` value meaning the size isn't known yet.
pub const RFC822_SIZE_NIL_REPLY: &str = "0";

const INTERNALDATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";
const ENVELOPE_MESSAGE_ID: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Structure {
    Body,
    BodyStructure,
    Envelope,
}

impl Structure {
    const fn name(self) -> &'static str {
        match self {
            Self::Body => "BODY",
            Self::BodyStructure => "BODYSTRUCTURE",
            Self::Envelope => "ENVELOPE",
        }
    }

    const fn nil_reply(self) -> &'static str {
        match self {
            Self::Body | Self::BodyStructure => BODY_NIL_REPLY,
            Self::Envelope => ENVELOPE_NIL_REPLY,
        }
    }

    /// The message's id together with this field.
    fn field(self, msg: &mut Message) -> (&str, &mut Option<String>) {
        let stored = match self {
            Self::Body => &mut msg.body,
            Self::BodyStructure => &mut msg.bodystructure,
            Self::Envelope => &mut msg.envelope,
        };
        (&msg.message_id, stored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Size {
    Full,
    Header,
    Text,
    Mime1,
}

impl Size {
    fn field(self, msg: &mut Message) -> (&str, &mut Option<u64>) {
        let stored = match self {
            Self::Full => &mut msg.full_size,
            Self::Header => &mut msg.header_size,
            Self::Text => &mut msg.body_size,
            Self::Mime1 => &mut msg.mime1_size,
        };
        (&msg.message_id, stored)
    }
}

impl StateHandler<'_> {
    /// Handle `* <seq> FETCH <args>`.
    ///
    /// Problems are reported and processing moves on to the next item,
    /// so a single reply can yield several reports.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fatal`] if fatal mode is configured and
    /// a consistency violation was found.
    pub fn handle_fetch(&mut self, seq: u32, args: &ImapArg) -> Result<()> {
        self.begin();
        self.fetch(seq, args);
        self.finish()
    }

    fn fetch(&mut self, seq: u32, args: &ImapArg) {
        let Some(items) = args.as_list() else {
            self.protocol_error("FETCH didn't return a list");
            return;
        };
        let Some(index) = self.view_index(seq) else {
            self.protocol_error(&format!(
                "FETCH for unknown sequence {seq} (mailbox has {})",
                self.view.len()
            ));
            return;
        };

        if let Some(value) = fetch_item(items, "UID") {
            self.update_uid(seq, index, value);
        }

        if let Some(uid) = self.view.sequence_to_uid[index] {
            let metadata = &mut self.view.messages[index];
            if metadata.canonical != Some(uid) {
                metadata.canonical = Some(uid);
                self.mailbox.uids.get_or_create(uid);
            }
            if let Some(envelope) = fetch_item(items, "ENVELOPE").and_then(ImapArg::as_list) {
                self.bind_message(uid, envelope);
            }
        }

        for i in (0..items.len().saturating_sub(1)).step_by(2) {
            let Some(name) = items[i].as_atom() else {
                continue;
            };
            self.fetch_pair(seq, index, &name.to_ascii_uppercase(), &items[i + 1..]);
        }
    }

    pub(crate) fn view_index(&self, seq: u32) -> Option<usize> {
        usize::try_from(seq)
            .ok()?
            .checked_sub(1)
            .filter(|&i| i < self.view.len())
    }

    fn update_uid(&mut self, seq: u32, index: usize, value: &ImapArg) {
        let Some(uid) = value
            .as_atom()
            .and_then(|v| v.parse::<Uid>().ok())
            .filter(|&uid| uid != 0)
        else {
            self.protocol_error(&format!("Invalid UID in FETCH: {}", value.to_imap_string()));
            return;
        };
        match self.view.sequence_to_uid[index] {
            Some(old) if old != uid => {
                self.protocol_error(&format!("UID changed for sequence {seq}: {old} -> {uid}"));
            }
            _ => {}
        }
        self.view.sequence_to_uid[index] = Some(uid);
    }

    fn bind_message(&mut self, uid: Uid, envelope: &[ImapArg]) {
        let Some(message_id) = envelope
            .get(ENVELOPE_MESSAGE_ID)
            .filter(|arg| arg.is_string())
            .and_then(ImapArg::as_text)
        else {
            return;
        };

        if let Some(msg) = self.mailbox.uids.get_or_create(uid).message {
            let existing = &self.mailbox.messages.get(msg).message_id;
            if *existing != message_id {
                let report = format!("UID {uid} changed Message-Id: {existing} -> {message_id}");
                self.protocol_error(&report);
            }
            return;
        }

        if self.mailbox.messages.find(&message_id).is_none() {
            debug!(session = %self.session(), "New message {} at UID {}", message_id, uid);
        }
        let msg = self.mailbox.messages.get_or_create(&message_id);
        self.mailbox.uids.get_or_create(uid).message = Some(msg);
    }

    /// Handle one name/value pair. `rest` starts at the value and runs
    /// to the end of the reply, since some items span several values.
    fn fetch_pair(&mut self, seq: u32, index: usize, name: &str, rest: &[ImapArg]) {
        let value = &rest[0];
        if name == "FLAGS" {
            match value.as_list() {
                Some(flags) => self.apply_flag_item(seq, flags),
                None => self.protocol_error("FLAGS reply isn't a list"),
            }
            return;
        }

        // The rest needs the UID to be known.
        let Some(uid) = self.view.messages[index].canonical else {
            return;
        };
        if name == "INTERNALDATE" {
            self.check_internaldate(uid, value);
            return;
        }

        // The rest needs the message to be known.
        let Some(msg) = self.mailbox.uids.get(uid).and_then(|m| m.message) else {
            return;
        };
        match name {
            "BODY" => self.check_structure(uid, msg, Structure::Body, value),
            "BODYSTRUCTURE" => self.check_structure(uid, msg, Structure::BodyStructure, value),
            "ENVELOPE" => self.check_structure(uid, msg, Structure::Envelope, value),
            "RFC822" | "BODY[]" => self.check_size(uid, msg, name, Size::Full, value),
            "RFC822.HEADER" | "BODY[HEADER]" => {
                self.check_size(uid, msg, name, Size::Header, value);
            }
            "RFC822.TEXT" | "BODY[TEXT]" => self.check_size(uid, msg, name, Size::Text, value),
            "BODY[1]" => self.check_size(uid, msg, name, Size::Mime1, value),
            "RFC822.SIZE" => self.check_rfc822_size(uid, msg, value),
            "BODY[HEADER.FIELDS" => self.check_header_fields(msg, rest),
            _ => {}
        }
    }

    fn check_internaldate(&mut self, uid: Uid, value: &ImapArg) {
        let Some(date) = value.as_text().as_deref().and_then(parse_internaldate) else {
            self.protocol_error("Broken INTERNALDATE");
            return;
        };
        if date.timestamp() == 0 {
            return;
        }
        let metadata = self.mailbox.uids.get_or_create(uid);
        match metadata.internaldate {
            None => metadata.internaldate = Some(date),
            Some(old) if old != date => {
                self.violation(&format!("UID={uid} INTERNALDATE changed {old} -> {date}"));
            }
            Some(_) => {}
        }
    }

    fn check_structure(&mut self, uid: Uid, msg: MessageRef, field: Structure, value: &ImapArg) {
        let Some(text) = value_text(value) else {
            return;
        };
        if starts_with_ignore_case(&text, field.nil_reply()) {
            return;
        }
        let (message_id, stored) = field.field(self.mailbox.messages.get_mut(msg));
        let report = match stored.as_deref() {
            Some(old) if old.eq_ignore_ascii_case(&text) => return,
            Some(old) => Some(format!(
                "uid={uid} {message_id}: {} changed '{old}' -> '{text}'",
                field.name()
            )),
            None => None,
        };
        *stored = Some(text);
        if let Some(report) = report {
            self.violation(&report);
        }
    }

    fn check_rfc822_size(&mut self, uid: Uid, msg: MessageRef, value: &ImapArg) {
        let Some(text) = value.as_text() else {
            return;
        };
        if text == RFC822_SIZE_NIL_REPLY {
            return;
        }
        match text.parse::<u64>() {
            Ok(size) => self.store_size(uid, msg, "RFC822.SIZE", Size::Full, size),
            Err(_) => self.protocol_error(&format!("Invalid RFC822.SIZE: {text}")),
        }
    }

    fn check_size(&mut self, uid: Uid, msg: MessageRef, name: &str, field: Size, value: &ImapArg) {
        let size = match value {
            ImapArg::LiteralSize(size) => *size,
            ImapArg::Atom(_) | ImapArg::String(_) => {
                value.as_bytes().map_or(0, |data| data.len() as u64)
            }
            ImapArg::Nil | ImapArg::List(_) => return,
        };
        self.store_size(uid, msg, name, field, size);
    }

    fn store_size(&mut self, uid: Uid, msg: MessageRef, name: &str, field: Size, size: u64) {
        let (message_id, stored) = field.field(self.mailbox.messages.get_mut(msg));
        let report = stored
            .replace(size)
            .filter(|&old| old != 0 && old != size)
            .map(|old| format!("uid={uid} {message_id}: {name} size changed {old} -> {size}"));
        if let Some(report) = report {
            self.violation(&report);
        }
    }
}

/// Textual form of a value, as used for structural comparisons.
fn value_text(value: &ImapArg) -> Option<String> {
    match value {
        ImapArg::List(items) => Some(list_to_imap_string(items)),
        ImapArg::LiteralSize(size) => Some(size.to_string()),
        ImapArg::Atom(_) | ImapArg::String(_) => value.as_text().map(|t| t.into_owned()),
        ImapArg::Nil => None,
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Parse an IMAP `date-time`, e.g. ` 7-Jul-1996 02:44:25 -0700`.
#[must_use]
pub fn parse_internaldate(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let padded;
    let value = if value.find('-') == Some(1) {
        padded = format!("0{value}");
        &padded
    } else {
        value
    };
    DateTime::parse_from_str(value, INTERNALDATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_internaldate() {
        let date = parse_internaldate("17-Jul-1996 02:44:25 -0700").unwrap();
        assert_eq!(date.timestamp(), 837_596_665);
    }

    #[test]
    fn parses_space_padded_day() {
        let padded = parse_internaldate(" 7-Jul-1996 02:44:25 -0700").unwrap();
        let zeroed = parse_internaldate("07-Jul-1996 02:44:25 -0700").unwrap();
        assert_eq!(padded, zeroed);
    }

    #[test]
    fn epoch_internaldate_is_zero() {
        let date = parse_internaldate("01-Jan-1970 00:00:00 +0000").unwrap();
        assert_eq!(date.timestamp(), 0);
    }

    #[test]
    fn rejects_garbage_internaldate() {
        assert!(parse_internaldate("yesterday").is_none());
    }

    #[test]
    fn value_text_of_list_has_no_parens() {
        let value = ImapArg::List(vec![ImapArg::string("text"), ImapArg::Nil]);
        assert_eq!(value_text(&value).as_deref(), Some("\"text\" NIL"));
        assert_eq!(value_text(&ImapArg::Nil), None);
    }

    #[test]
    fn nil_reply_prefix_is_case_insensitive() {
        assert!(starts_with_ignore_case(
            "\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 0 0 NIL NIL NIL",
            BODY_NIL_REPLY
        ));
        assert!(!starts_with_ignore_case("\"text\"", BODY_NIL_REPLY));
    }
}
