//! Reporting channels for problems found in server replies
//!
//! Handlers never stop on a problem they can step over; they hand it
//! to a [`Reporter`] and keep going, so one server line can produce
//! several independent reports.

use crate::session::SessionId;
use serde::Serialize;
use std::fmt;
use tracing::error;

/// How serious a reported problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// The reply could not be interpreted as valid IMAP.
    Protocol,
    /// The reply is well-formed but contradicts established state.
    Consistency,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protocol => "protocol error",
            Self::Consistency => "consistency error",
        })
    }
}

/// Sink for problems detected while handling server replies.
pub trait Reporter {
    fn protocol_error(&mut self, session: SessionId, message: &str);
    fn consistency_violation(&mut self, session: SessionId, message: &str);
}

/// A single recorded problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub session: SessionId,
    pub kind: ReportKind,
    pub message: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}: {}: {}", self.session, self.kind, self.message)
    }
}

/// Reporter that keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct Reports {
    reports: Vec<Report>,
}

impl Reports {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn all(&self) -> &[Report] {
        &self.reports
    }

    pub fn of_kind(&self, kind: ReportKind) -> impl Iterator<Item = &Report> {
        self.reports.iter().filter(move |r| r.kind == kind)
    }

    #[must_use]
    pub fn protocol_errors(&self) -> usize {
        self.of_kind(ReportKind::Protocol).count()
    }

    #[must_use]
    pub fn violations(&self) -> usize {
        self.of_kind(ReportKind::Consistency).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }

    pub fn extend(&mut self, other: Self) {
        self.reports.extend(other.reports);
    }

    fn push(&mut self, session: SessionId, kind: ReportKind, message: &str) {
        self.reports.push(Report {
            session,
            kind,
            message: message.to_string(),
        });
    }
}

impl Reporter for Reports {
    fn protocol_error(&mut self, session: SessionId, message: &str) {
        self.push(session, ReportKind::Protocol, message);
    }

    fn consistency_violation(&mut self, session: SessionId, message: &str) {
        self.push(session, ReportKind::Consistency, message);
    }
}

/// Reporter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn protocol_error(&mut self, session: SessionId, message: &str) {
        error!(%session, "Protocol error: {}", message);
    }

    fn consistency_violation(&mut self, session: SessionId, message: &str) {
        error!(%session, "Consistency error: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_split_by_kind() {
        let mut reports = Reports::new();
        reports.protocol_error(SessionId(1), "bad list");
        reports.consistency_violation(SessionId(2), "flag changed");
        reports.consistency_violation(SessionId(2), "size changed");

        assert_eq!(reports.protocol_errors(), 1);
        assert_eq!(reports.violations(), 2);
        assert_eq!(reports.all()[0].message, "bad list");
    }

    #[test]
    fn display_includes_session_and_kind() {
        let report = Report {
            session: SessionId(3),
            kind: ReportKind::Consistency,
            message: "oops".to_string(),
        };
        assert_eq!(report.to_string(), "session #3: consistency error: oops");
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let report = Report {
            session: SessionId(7),
            kind: ReportKind::Protocol,
            message: "x".to_string(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"session":7,"kind":"protocol","message":"x"}"#);
    }
}
