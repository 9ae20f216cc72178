//! Per-POI state machine and the rules gating each transition.

use crate::errors::DenyReason;
use crate::models::{Actor, Poi};

/// A POI's state as seen by a particular actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiState {
    DraftOwned,
    DraftOther,
    Approved,
}

impl PoiState {
    pub fn of(poi: &Poi, actor: &Actor) -> Self {
        if poi.approved {
            PoiState::Approved
        } else if poi.is_owned_by(actor.session.as_ref()) {
            PoiState::DraftOwned
        } else {
            PoiState::DraftOther
        }
    }
}

/// Mutations on an existing POI. Creating is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Edit,
    Approve,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Edit => "edit",
            Action::Approve => "approve",
            Action::Delete => "delete",
        }
    }
}

/// What a permitted action amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    /// Approve on an approved POI: succeeds without changing anything.
    AlreadyApproved,
}

/// Decide whether `actor` may perform `action` on `poi`.
pub fn authorize(actor: &Actor, poi: &Poi, action: Action) -> Result<Transition, DenyReason> {
    let state = PoiState::of(poi, actor);
    match (action, state) {
        (Action::Edit, PoiState::Approved) if actor.elevated => Ok(Transition::Apply),
        (Action::Edit, PoiState::Approved) => Err(DenyReason::AlreadyApproved),

        (Action::Approve, _) if !actor.elevated => Err(DenyReason::NotElevated),
        (Action::Approve, PoiState::Approved) => Ok(Transition::AlreadyApproved),
        (Action::Approve, _) => Ok(Transition::Apply),

        (Action::Delete, PoiState::Approved) => Err(DenyReason::ApprovedImmutable),

        (Action::Edit | Action::Delete, PoiState::DraftOwned) => Ok(Transition::Apply),
        (Action::Edit | Action::Delete, PoiState::DraftOther) if actor.elevated => {
            Ok(Transition::Apply)
        }
        (Action::Edit | Action::Delete, PoiState::DraftOther) => Err(DenyReason::NotOwner),
    }
}
