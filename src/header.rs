//! `BODY[HEADER.FIELDS (...)]` replies
//!
//! The reply is tokenized as the `BODY[HEADER.FIELDS` atom, the list of
//! requested field names, a `]` atom and finally the header block. Each
//! requested field ends up either with a value or marked missing, and
//! the result is merged into the message's stored headers.

use crate::args::ImapArg;
use crate::handler::StateHandler;
use crate::message::{MessageHeader, MessageRef};
use mailparse::MailParseError;

const END_OF_HEADERS: &str = "";

fn requested(name: &str) -> MessageHeader {
    MessageHeader {
        name: name.to_string(),
        value: Vec::new(),
        missing: true,
    }
}

/// Requested field names with duplicates dropped, followed by the
/// end-of-headers marker.
fn requested_fields(list: &[ImapArg]) -> Option<Vec<MessageHeader>> {
    let mut fields: Vec<MessageHeader> = Vec::new();
    for item in list {
        if !matches!(item, ImapArg::Atom(_) | ImapArg::String(_)) {
            return None;
        }
        let name = item.as_text()?;
        if !fields.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
            fields.push(requested(&name));
        }
    }
    fields.push(requested(END_OF_HEADERS));
    Some(fields)
}

/// Join a folded header value into one line.
fn unfold(raw: &[u8]) -> Vec<u8> {
    let joined: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();
    joined.trim_ascii().to_vec()
}

fn has_end_of_headers(data: &[u8]) -> bool {
    data.starts_with(b"\r\n")
        || data.starts_with(b"\n")
        || data.windows(3).any(|w| w == b"\n\r\n")
        || data.windows(2).any(|w| w == b"\n\n")
}

/// Fill `fields` from a returned header block.
///
/// Several lines with the same name are joined with `\n`. Returns the
/// names of headers that weren't requested.
fn fill_fields(
    fields: &mut [MessageHeader],
    data: &[u8],
) -> Result<Vec<String>, MailParseError> {
    let (headers, _) = mailparse::parse_headers(data)?;
    let mut unexpected = Vec::new();
    for header in &headers {
        let name = header.get_key();
        let value = unfold(header.get_value_raw());
        let field = fields
            .iter_mut()
            .find(|f| f.name != END_OF_HEADERS && f.name.eq_ignore_ascii_case(&name));
        match field {
            Some(field) if field.missing => {
                field.value = value;
                field.missing = false;
            }
            Some(field) => {
                field.value.push(b'\n');
                field.value.extend_from_slice(&value);
            }
            None => unexpected.push(name),
        }
    }
    if has_end_of_headers(data)
        && let Some(end) = fields.iter_mut().find(|f| f.name == END_OF_HEADERS)
    {
        end.missing = false;
    }
    Ok(unexpected)
}

fn describe(header: &MessageHeader) -> String {
    if header.missing {
        "(missing)".to_string()
    } else {
        String::from_utf8_lossy(&header.value).into_owned()
    }
}

/// Merge newly seen fields into `stored`. The stored value wins; every
/// disagreement is returned as a message.
fn merge_headers(stored: &mut Vec<MessageHeader>, fields: Vec<MessageHeader>) -> Vec<String> {
    let mut changes = Vec::new();
    for field in fields {
        match stored
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(&field.name))
        {
            None => stored.push(field),
            Some(old) if old.missing == field.missing && old.value == field.value => {}
            Some(old) => {
                let name = if old.name.is_empty() {
                    "end of headers"
                } else {
                    &old.name
                };
                changes.push(format!(
                    "Header {name} changed '{}' -> '{}'",
                    describe(old),
                    describe(&field)
                ));
            }
        }
    }
    changes
}

impl StateHandler<'_> {
    /// `rest` starts at the requested field list.
    pub(crate) fn check_header_fields(&mut self, msg: MessageRef, rest: &[ImapArg]) {
        let Some(mut fields) = rest
            .first()
            .and_then(ImapArg::as_list)
            .and_then(requested_fields)
        else {
            self.protocol_error("Broken HEADER.FIELDS request list");
            return;
        };
        if rest.get(1).and_then(ImapArg::as_atom) != Some("]") {
            self.protocol_error("HEADER.FIELDS list not followed by ']'");
            return;
        }
        let data = match rest.get(2) {
            // NIL: expunged. LiteralSize: body not delivered.
            None | Some(ImapArg::Nil | ImapArg::LiteralSize(_)) => return,
            Some(value) => match value.as_bytes() {
                // Cyrus returns "" for expunged messages.
                Some([]) => return,
                Some(data) => data,
                None => {
                    self.protocol_error("HEADER.FIELDS value isn't a string");
                    return;
                }
            },
        };

        match fill_fields(&mut fields, data) {
            Ok(unexpected) => {
                for name in unexpected {
                    self.protocol_error(&format!("Unexpected header in reply: {name}"));
                }
            }
            Err(err) => {
                self.protocol_error(&format!("Broken HEADER.FIELDS: {err}"));
                return;
            }
        }

        let message = self.mailbox.messages.get_mut(msg);
        let reports: Vec<String> = merge_headers(&mut message.headers, fields)
            .into_iter()
            .map(|change| format!("{}: {change}", message.message_id))
            .collect();
        for report in reports {
            self.violation(&report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<MessageHeader> {
        let list: Vec<ImapArg> = names.iter().map(|n| ImapArg::atom(*n)).collect();
        requested_fields(&list).unwrap()
    }

    #[test]
    fn duplicate_requests_are_dropped() {
        let fields = fields(&["Subject", "SUBJECT", "From"]);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Subject", "From", ""]);
        assert!(fields.iter().all(|f| f.missing));
    }

    #[test]
    fn nested_request_list_is_rejected() {
        let list = vec![ImapArg::atom("Subject"), ImapArg::List(vec![])];
        assert!(requested_fields(&list).is_none());
    }

    #[test]
    fn folded_value_is_joined() {
        let mut fields = fields(&["Subject"]);
        let unexpected = fill_fields(&mut fields, b"Subject: line1\r\n line2\r\n\r\n").unwrap();
        assert!(unexpected.is_empty());
        assert_eq!(fields[0].value, b"line1 line2");
        assert!(!fields[0].missing);
        assert!(!fields[1].missing);
    }

    #[test]
    fn repeated_header_lines_are_concatenated() {
        let mut fields = fields(&["Received"]);
        fill_fields(&mut fields, b"Received: a\r\nReceived: b\r\n\r\n").unwrap();
        assert_eq!(fields[0].value, b"a\nb");
    }

    #[test]
    fn unrequested_header_is_returned() {
        let mut fields = fields(&["Subject"]);
        let unexpected = fill_fields(&mut fields, b"From: x@example.com\r\n\r\n").unwrap();
        assert_eq!(unexpected, vec!["From".to_string()]);
        assert!(fields[0].missing);
    }

    #[test]
    fn end_of_headers_marker() {
        assert!(has_end_of_headers(b"\r\n"));
        assert!(has_end_of_headers(b"A: b\n\n"));
        assert!(has_end_of_headers(b"A: b\r\n\r\n"));
        assert!(!has_end_of_headers(b"A: b\r\n"));
    }

    #[test]
    fn merge_keeps_stored_value() {
        let mut stored = Vec::new();
        let mut first = fields(&["Subject"]);
        fill_fields(&mut first, b"Subject: hello\r\n\r\n").unwrap();
        assert!(merge_headers(&mut stored, first.clone()).is_empty());
        assert_eq!(stored.len(), 2);

        assert!(merge_headers(&mut stored, first).is_empty());

        let mut second = fields(&["subject"]);
        fill_fields(&mut second, b"Subject: bye\r\n\r\n").unwrap();
        let changes = merge_headers(&mut stored, second);
        assert_eq!(changes, vec!["Header Subject changed 'hello' -> 'bye'".to_string()]);
        assert_eq!(stored[0].value, b"hello");
    }

    #[test]
    fn missing_differs_from_empty() {
        let mut stored = vec![requested("X-Empty")];
        let mut present = requested("X-Empty");
        present.missing = false;
        let changes = merge_headers(&mut stored, vec![present]);
        assert_eq!(changes, vec!["Header X-Empty changed '(missing)' -> ''".to_string()]);
    }
}
