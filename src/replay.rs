//! Replaying recorded sessions against one shared mailbox
//!
//! A transcript holds the responses one session received, in order,
//! with `{n}` literals inline exactly as they came off the wire. Lines
//! starting with `> ` record commands the session itself sent, so the
//! handlers know which flag changes to expect:
//!
//! ```text
//! > STORE 3     the session changed flags of sequence 3
//! > FETCH 3     the session fetched sequence 3
//! > DONE 3      tagged reply for a command touching sequence 3
//! ```
//!
//! Tagged replies, comments and anything else that isn't untagged are
//! skipped. Each transcript is replayed in its own task; the shared
//! [`Mailbox`] is locked once per response.

use crate::error::{Error, Result};
use crate::handler::StateHandler;
use crate::mailbox::Mailbox;
use crate::parser::parse_untagged;
use crate::report::{Reporter, Reports};
use crate::session::SessionId;
use crate::view::MailboxView;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

const LOCAL_COMMAND_PREFIX: &[u8] = b"> ";

/// Outcome of replaying a set of transcripts.
#[derive(Debug)]
pub struct Replay {
    /// Every report from every session, grouped by session.
    pub reports: Reports,
    /// Set when fatal mode stopped the replay.
    pub fatal: Option<Error>,
}

struct SessionOutcome {
    reports: Reports,
    fatal: Option<Error>,
}

/// Read one server response, following `{n}` literals across lines.
///
/// Returns `None` at end of input.
///
/// # Errors
///
/// Returns [`Error::Io`] on read failure, including input that ends
/// in the middle of a literal.
pub async fn read_response<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut response = Vec::new();
    loop {
        let start = response.len();
        if reader.read_until(b'\n', &mut response).await? == 0 {
            return Ok((!response.is_empty()).then_some(response));
        }
        let Some(size) = literal_size(&response[start..]) else {
            return Ok(Some(response));
        };
        let mut literal = vec![0; size];
        reader.read_exact(&mut literal).await?;
        response.extend_from_slice(&literal);
    }
}

/// Size of the literal announced at the end of `line`, if any.
fn literal_size(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Replay each transcript as its own session. Session ids are assigned
/// from 1 in the order the transcripts are given.
///
/// # Errors
///
/// Returns an error if a transcript can't be read or a replay task
/// panicked. Fatal escalations are returned in [`Replay::fatal`] along
/// with the reports gathered so far.
pub async fn replay_sessions(mailbox: Mailbox, transcripts: &[PathBuf]) -> Result<Replay> {
    info!("Replaying {} session(s)", transcripts.len());
    let mailbox = Arc::new(Mutex::new(mailbox));
    let stop = Arc::new(AtomicBool::new(false));

    let tasks = transcripts.iter().zip(1..).map(|(path, id)| {
        let mailbox = Arc::clone(&mailbox);
        let stop = Arc::clone(&stop);
        let path = path.clone();
        tokio::spawn(async move { replay_session(SessionId(id), &path, &mailbox, &stop).await })
    });

    let mut replay = Replay {
        reports: Reports::new(),
        fatal: None,
    };
    for outcome in join_all(tasks).await {
        let outcome = outcome.map_err(|e| Error::Task(e.to_string()))??;
        replay.reports.extend(outcome.reports);
        if replay.fatal.is_none() {
            replay.fatal = outcome.fatal;
        }
    }
    Ok(replay)
}

async fn replay_session(
    session: SessionId,
    path: &Path,
    mailbox: &Mutex<Mailbox>,
    stop: &AtomicBool,
) -> Result<SessionOutcome> {
    debug!(%session, "Replaying {}", path.display());
    let mut reader = BufReader::new(File::open(path).await?);
    let mut view = MailboxView::new(session);
    let mut reports = Reports::new();

    while !stop.load(Ordering::Relaxed) {
        let Some(response) = read_response(&mut reader).await? else {
            break;
        };
        if let Some(command) = response.strip_prefix(LOCAL_COMMAND_PREFIX) {
            local_command(&mut view, &mut reports, command)?;
            continue;
        }
        let parsed = match parse_untagged(&response) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(err) => {
                reports.protocol_error(session, &err.to_string());
                continue;
            }
        };

        let mut guard = mailbox.lock().await;
        let result =
            StateHandler::new(&mut guard, &mut view, &mut reports).handle_response(&parsed);
        drop(guard);

        match result {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                stop.store(true, Ordering::Relaxed);
                return Ok(SessionOutcome {
                    reports,
                    fatal: Some(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(SessionOutcome {
        reports,
        fatal: None,
    })
}

fn local_command(view: &mut MailboxView, reports: &mut Reports, command: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(command);
    let mut words = text.split_whitespace();
    let verb = words.next();
    let seq = words.next().and_then(|s| s.parse::<u32>().ok());
    let (Some(verb), Some(seq)) = (verb, seq) else {
        return Err(Error::Parse(format!("Unreadable local command: {}", text.trim())));
    };
    let known = match verb.to_ascii_uppercase().as_str() {
        "STORE" => view.begin_local_change(seq),
        "FETCH" => view.begin_fetch(seq),
        "DONE" => view.command_finished(seq),
        _ => return Err(Error::Parse(format!("Unknown local command: {verb}"))),
    };
    if !known {
        reports.protocol_error(view.session(), &format!("{verb} for unknown sequence {seq}"));
    }
    Ok(())
}
