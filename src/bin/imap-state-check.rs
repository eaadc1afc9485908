#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for checking recorded IMAP sessions for consistency errors

use clap::Parser;
use imap_state_check::{Error, Flag, Mailbox, Replay, SessionId, StateConfig, Uid, replay_sessions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when at least one consistency violation was found.
const VIOLATION_EXIT_CODE: u8 = 1;

#[derive(Parser)]
#[command(name = "imap-state-check")]
#[command(about = "Replay IMAP session transcripts against one shared mailbox model")]
struct Args {
    /// Session transcripts, one per session. Sessions are numbered
    /// from 1 in the order given.
    #[arg(required = true)]
    transcripts: Vec<PathBuf>,

    /// Output reports as JSON
    #[arg(long)]
    json: bool,

    /// Stop at the first response with a consistency violation
    #[arg(long)]
    fatal: bool,

    /// Only SESSION may change flag NAME (`\Seen`, `$Work`, ...)
    #[arg(long = "flag-owner", value_name = "NAME=SESSION", value_parser = parse_flag_owner)]
    flag_owners: Vec<(Flag, SessionId)>,

    /// Only SESSION may change the flags of UID
    #[arg(long = "message-owner", value_name = "UID=SESSION", value_parser = parse_message_owner)]
    message_owners: Vec<(Uid, SessionId)>,
}

fn split_owner(s: &str) -> Result<(&str, SessionId), String> {
    let (name, session) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected NAME=SESSION, got '{s}'"))?;
    let session = session
        .parse::<u32>()
        .map_err(|e| format!("Invalid session '{session}': {e}"))?;
    Ok((name, SessionId(session)))
}

fn parse_flag_owner(s: &str) -> Result<(Flag, SessionId), String> {
    let (name, session) = split_owner(s)?;
    let flag = Flag::parse(name).ok_or_else(|| format!("Invalid flag '{name}'"))?;
    Ok((flag, session))
}

fn parse_message_owner(s: &str) -> Result<(Uid, SessionId), String> {
    let (uid, session) = split_owner(s)?;
    let uid = uid
        .parse::<Uid>()
        .map_err(|e| format!("Invalid UID '{uid}': {e}"))?;
    Ok((uid, session))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = StateConfig::from_env()?;
    config.fatal_on_consistency_error |= args.fatal;
    config.assign_flag_owners |= !args.flag_owners.is_empty();

    let mut mailbox = Mailbox::new(config);
    for (flag, session) in &args.flag_owners {
        mailbox.assign_flag_owner(flag, *session);
    }
    for (uid, session) in &args.message_owners {
        mailbox.assign_message_owner(*uid, *session);
    }

    let replay = replay_sessions(mailbox, &args.transcripts).await?;
    print_reports(&args, &replay)?;

    if let Some(fatal) = &replay.fatal {
        eprintln!("{fatal}");
        return Ok(ExitCode::from(exit_status(Error::FATAL_EXIT_CODE)));
    }
    if replay.reports.violations() > 0 {
        return Ok(ExitCode::from(VIOLATION_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_reports(args: &Args, replay: &Replay) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(replay.reports.all())?);
        return Ok(());
    }
    for report in replay.reports.all() {
        println!("{report}");
    }
    println!(
        "\n{} protocol error(s), {} consistency error(s)",
        replay.reports.protocol_errors(),
        replay.reports.violations()
    );
    Ok(())
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}
