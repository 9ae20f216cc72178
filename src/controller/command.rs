//! Queued store writes and the notices they produce.

use chrono::{DateTime, Utc};

use crate::models::Poi;

/// Sequence number of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Create(Poi),
    Update(Poi),
    /// Elevated edit of an approved POI.
    Amend(Poi),
    Delete { id: String },
    Approve(Poi),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    pub queued_at: DateTime<Utc>,
}

impl Command {
    pub fn poi_id(&self) -> &str {
        match &self.kind {
            CommandKind::Create(poi)
            | CommandKind::Update(poi)
            | CommandKind::Amend(poi)
            | CommandKind::Approve(poi) => &poi.id,
            CommandKind::Delete { id } => id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            CommandKind::Create(_) => "create",
            CommandKind::Update(_) => "update",
            CommandKind::Amend(_) => "amend",
            CommandKind::Delete { .. } => "delete",
            CommandKind::Approve(_) => "approve",
        }
    }
}

/// Handle returned by a local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queued {
    pub command: CommandId,
    pub poi_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    Queued(Queued),
    /// Nothing to do; reported as success.
    AlreadyApproved,
}

/// What the user is told about a store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    /// The store was unreachable; the change exists only locally.
    LocalOnly(String),
    /// The store refused the change.
    Failure(String),
}

impl Notice {
    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }
}

/// Outcome of pushing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub command: CommandId,
    pub poi_id: String,
    pub notice: Notice,
}
