//! Tokenizer for IMAP server responses
//!
//! Turns one complete server response (including any literal data) into
//! [`ImapArg`] trees. It is deliberately lenient: it extracts argument
//! values and doesn't validate the finer points of the IMAP grammar.
//!
//! Arguments may directly follow each other without a separating space.
//! Atoms end at a space or a parenthesis, so a section specifier like
//! `BODY[HEADER.FIELDS (FROM TO)]` tokenizes as the atom
//! `BODY[HEADER.FIELDS`, the list `(FROM TO)` and the atom `]`.

use crate::args::ImapArg;
use crate::error::{Error, Result};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{cut, map, map_res, opt},
    error::{ErrorKind, ParseError},
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
};
use std::str::FromStr;

/// An untagged server response the state handlers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    /// `* <seq> FETCH <args>`
    Fetch { seq: u32, args: ImapArg },
    /// `* FLAGS <list>`
    Flags(ImapArg),
    /// `* OK [PERMANENTFLAGS <list>] ...`
    PermanentFlags(ImapArg),
    /// `* <count> EXISTS`
    Exists(u32),
    /// `* <seq> EXPUNGE`
    Expunge(u32),
    /// Any other untagged response.
    Other,
}

/// Parse a whole line of space-separated arguments.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the input isn't a sequence of
/// well-formed arguments.
pub fn parse_args(input: &[u8]) -> Result<Vec<ImapArg>> {
    let input = trim_line_end(input);
    match terminated(many0(preceded(space0, arg)), space0)(input) {
        Ok(([], args)) => Ok(args),
        Ok((rest, _)) => Err(Error::Parse(format!(
            "Unexpected data: {}",
            String::from_utf8_lossy(rest)
        ))),
        Err(e) => Err(parse_error(&e)),
    }
}

/// Parse one server response.
///
/// Returns `Ok(None)` for tagged replies and continuation requests.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a FETCH, FLAGS or PERMANENTFLAGS
/// response has a broken argument.
pub fn parse_untagged(line: &[u8]) -> Result<Option<Untagged>> {
    let line = trim_line_end(line);
    let Some(rest) = line.strip_prefix(b"* ") else {
        return Ok(None);
    };
    untagged(rest)
        .map(|(_, response)| Some(response))
        .map_err(|e| parse_error(&e))
}

fn parse_error(e: &nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match e {
        nom::Err::Incomplete(_) => Error::Parse("Incomplete response".to_string()),
        nom::Err::Error(inner) | nom::Err::Failure(inner) => Error::Parse(format!(
            "{:?} at: {}",
            inner.code,
            String::from_utf8_lossy(inner.input)
        )),
    }
}

fn trim_line_end(input: &[u8]) -> &[u8] {
    input
        .strip_suffix(b"\r\n")
        .or_else(|| input.strip_suffix(b"\n"))
        .unwrap_or(input)
}

fn untagged(input: &[u8]) -> IResult<&[u8], Untagged> {
    alt((
        numbered,
        map(preceded(terminated(tag_no_case("FLAGS"), space1), cut(arg)), Untagged::Flags),
        map(
            preceded(
                tuple((
                    alt((tag_no_case("OK"), tag_no_case("NO"))),
                    space1,
                    tag_no_case("[PERMANENTFLAGS"),
                    space1,
                )),
                cut(arg),
            ),
            Untagged::PermanentFlags,
        ),
        map(nom::combinator::rest, |_| Untagged::Other),
    ))(input)
}

fn numbered(input: &[u8]) -> IResult<&[u8], Untagged> {
    let (rest, n) = terminated(number::<u32>, space1)(input)?;
    let (rest, word) = take_while1(is_atom_char)(rest)?;
    if word.eq_ignore_ascii_case(b"FETCH") {
        let (rest, args) = cut(preceded(space1, arg))(rest)?;
        Ok((rest, Untagged::Fetch { seq: n, args }))
    } else if word.eq_ignore_ascii_case(b"EXISTS") {
        Ok((rest, Untagged::Exists(n)))
    } else if word.eq_ignore_ascii_case(b"EXPUNGE") {
        Ok((rest, Untagged::Expunge(n)))
    } else {
        Ok((rest, Untagged::Other))
    }
}

fn number<T: FromStr>(input: &[u8]) -> IResult<&[u8], T> {
    map_res(digit1, |digits: &[u8]| {
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<T>().ok())
            .ok_or(())
    })(input)
}

fn arg(input: &[u8]) -> IResult<&[u8], ImapArg> {
    alt((list, quoted, literal, atom))(input)
}

fn list(input: &[u8]) -> IResult<&[u8], ImapArg> {
    map(
        delimited(
            char('('),
            many0(preceded(space0, arg)),
            preceded(space0, char(')')),
        ),
        ImapArg::List,
    )(input)
}

const fn is_atom_char(b: u8) -> bool {
    !matches!(b, b' ' | b'(' | b')' | b'"' | b'{' | b'\r' | b'\n') && b >= 0x20 && b != 0x7f
}

fn atom(input: &[u8]) -> IResult<&[u8], ImapArg> {
    map(take_while1(is_atom_char), |raw: &[u8]| {
        if raw.eq_ignore_ascii_case(b"NIL") {
            ImapArg::Nil
        } else {
            ImapArg::Atom(String::from_utf8_lossy(raw).into_owned())
        }
    })(input)
}

fn quoted(input: &[u8]) -> IResult<&[u8], ImapArg> {
    let (mut rest, _) = char('"')(input)?;
    let mut out = Vec::new();
    loop {
        match rest.split_first() {
            Some((&b'"', tail)) => return Ok((tail, ImapArg::String(out))),
            Some((&b'\\', tail)) => {
                let Some((&escaped, tail)) = tail.split_first() else {
                    break;
                };
                out.push(escaped);
                rest = tail;
            }
            Some((&b'\r' | &b'\n', _)) | None => break,
            Some((&byte, tail)) => {
                out.push(byte);
                rest = tail;
            }
        }
    }
    Err(nom::Err::Error(nom::error::Error::from_error_kind(
        rest,
        ErrorKind::Char,
    )))
}

fn literal(input: &[u8]) -> IResult<&[u8], ImapArg> {
    let (rest, size) = delimited(
        char('{'),
        number::<usize>,
        terminated(opt(char('+')), char('}')),
    )(input)?;
    let (rest, _) = alt((tag("\r\n"), tag("\n")))(rest)?;
    let (rest, data) = take(size)(rest)?;
    Ok((rest, ImapArg::String(data.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> ImapArg {
        ImapArg::atom(s)
    }

    #[test]
    fn parses_flat_args() {
        let args = parse_args(b"UID 5 \"quoted\" NIL\r\n").unwrap();
        assert_eq!(
            args,
            vec![atom("UID"), atom("5"), ImapArg::string("quoted"), ImapArg::Nil]
        );
    }

    #[test]
    fn parses_nested_lists_and_flags() {
        let args = parse_args(br"(FLAGS (\Seen $Junk) UID 12)").unwrap();
        assert_eq!(
            args,
            vec![ImapArg::List(vec![
                atom("FLAGS"),
                ImapArg::List(vec![atom("\\Seen"), atom("$Junk")]),
                atom("UID"),
                atom("12"),
            ])]
        );
    }

    #[test]
    fn parses_literal_spanning_lines() {
        let args = parse_args(b"(RFC822.HEADER {8}\r\nA: b\r\n\r\n)").unwrap();
        assert_eq!(
            args,
            vec![ImapArg::List(vec![
                atom("RFC822.HEADER"),
                ImapArg::string("A: b\r\n\r\n"),
            ])]
        );
    }

    #[test]
    fn parses_quoted_escapes() {
        let args = parse_args(br#""a\"b\\c""#).unwrap();
        assert_eq!(args, vec![ImapArg::string(r#"a"b\c"#)]);
    }

    #[test]
    fn splits_header_fields_section() {
        let args = parse_args(b"BODY[HEADER.FIELDS (FROM TO)] \"x\"").unwrap();
        assert_eq!(
            args,
            vec![
                atom("BODY[HEADER.FIELDS"),
                ImapArg::List(vec![atom("FROM"), atom("TO")]),
                atom("]"),
                ImapArg::string("x"),
            ]
        );
    }

    #[test]
    fn rejects_unterminated_list() {
        assert!(parse_args(b"(a b").is_err());
        assert!(parse_args(b"\"open").is_err());
    }

    #[test]
    fn recognizes_fetch() {
        let response = parse_untagged(b"* 3 FETCH (UID 9)\r\n").unwrap();
        assert_eq!(
            response,
            Some(Untagged::Fetch {
                seq: 3,
                args: ImapArg::List(vec![atom("UID"), atom("9")]),
            })
        );
    }

    #[test]
    fn recognizes_flags_and_permanentflags() {
        let flags = parse_untagged(br"* FLAGS (\Answered foo)").unwrap();
        assert_eq!(
            flags,
            Some(Untagged::Flags(ImapArg::List(vec![atom("\\Answered"), atom("foo")])))
        );

        let permanent =
            parse_untagged(br"* OK [PERMANENTFLAGS (\Seen \*)] Limited").unwrap();
        assert_eq!(
            permanent,
            Some(Untagged::PermanentFlags(ImapArg::List(vec![
                atom("\\Seen"),
                atom("\\*"),
            ])))
        );
    }

    #[test]
    fn recognizes_exists_and_expunge() {
        assert_eq!(parse_untagged(b"* 4 EXISTS").unwrap(), Some(Untagged::Exists(4)));
        assert_eq!(parse_untagged(b"* 2 EXPUNGE").unwrap(), Some(Untagged::Expunge(2)));
    }

    #[test]
    fn other_untagged_and_tagged_lines() {
        assert_eq!(parse_untagged(b"* OK [UIDVALIDITY 1] ok").unwrap(), Some(Untagged::Other));
        assert_eq!(parse_untagged(b"* 1 RECENT").unwrap(), Some(Untagged::Other));
        assert_eq!(parse_untagged(b"a1 OK done").unwrap(), None);
    }

    #[test]
    fn broken_fetch_is_an_error() {
        assert!(parse_untagged(b"* 1 FETCH (UID 1").is_err());
    }
}
