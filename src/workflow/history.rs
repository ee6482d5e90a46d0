//! Assignment history canonicalization.
//!
//! The raw event log stores each `reason` on the row that *received* it,
//! while semantically the text belongs to the actor of the previous row
//! (the sender's message). Canonicalization fixes that up once, drops the
//! rows that are never displayed, and collapses the known redundant
//! patterns, so every downstream consumer works from one immutable,
//! chronological sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{AssignmentEvent, EventAction, Role};

/// One canonical assignment entry, chronological position preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub action: EventAction,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub assigned_to_role: Option<Role>,
    pub assigned_by_id: Option<Uuid>,
    pub assigned_by_role: Option<Role>,
    /// Sender's message, already shifted onto the sending entry.
    pub reason: Option<String>,
    /// Bound to the entry that produced it; collapse never moves it sideways.
    pub attachment_path: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// True when an assign-then-close pair was merged into this entry.
    pub is_consolidated: bool,
}

impl CanonicalEvent {
    fn from_event(event: &AssignmentEvent) -> Self {
        Self {
            action: event.action,
            assigned_to_id: event.assigned_to_id,
            assigned_to_name: event.assigned_to_name.clone(),
            assigned_to_role: event.assigned_to_role,
            assigned_by_id: event.assigned_by_id,
            assigned_by_role: event.assigned_by_role,
            reason: event.reason.clone(),
            attachment_path: event.attachment_path.clone(),
            created_at: event.created_at,
            closed_at: event.closed_at,
            is_consolidated: false,
        }
    }

    fn same_actor(&self, other: &CanonicalEvent) -> bool {
        self.assigned_to_id.is_some() && self.assigned_to_id == other.assigned_to_id
    }
}

/// Canonical, chronological (oldest first) view of a ticket's history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalHistory {
    /// The first event's message. It belongs to the ticket creator and is
    /// surfaced on the synthetic Creator step of the projection.
    pub creator_reason: Option<String>,
    pub events: Vec<CanonicalEvent>,
}

impl CanonicalHistory {
    pub fn last(&self) -> Option<&CanonicalEvent> {
        self.events.last()
    }

    /// Did `user_id` ever receive this ticket?
    pub fn was_assignee(&self, user_id: Uuid) -> bool {
        self.events
            .iter()
            .any(|e| e.assigned_to_id == Some(user_id))
    }

    /// Did `role` ever touch this ticket, as sender or receiver?
    pub fn involves_role(&self, role: Role) -> bool {
        self.events.iter().any(|e| {
            e.assigned_to_role == Some(role) || e.assigned_by_role == Some(role)
        })
    }

    /// Most recent assignee different from `current`, for reversal routing.
    pub fn previous_assignee(
        &self,
        current: Option<Uuid>,
    ) -> Option<&CanonicalEvent> {
        self.events
            .iter()
            .rev()
            .find(|e| e.assigned_to_id.is_some() && e.assigned_to_id != current)
    }
}

/// Produce the canonical sequence from the raw append-only log.
///
/// Passes, in order: stable chronological sort (missing dates sort first and
/// keep their original relative order), drop `Rated` rows, shift reasons one
/// entry earlier, collapse assign-then-close pairs and duplicate closes.
/// Outside the two collapse rules no event is ever discarded.
pub fn canonicalize(events: &[AssignmentEvent]) -> CanonicalHistory {
    let mut canonical: Vec<CanonicalEvent> =
        events.iter().map(CanonicalEvent::from_event).collect();
    canonical.sort_by_key(|e| e.created_at);

    canonical.retain(|e| e.action != EventAction::Rated);

    let creator_reason = shift_reasons(&mut canonical);
    let collapsed = collapse(canonical);

    CanonicalHistory {
        creator_reason,
        events: collapsed,
    }
}

/// Move each entry's reason to the previous entry. Returns the first entry's
/// reason, which attaches to the synthetic Creator step. Attachments stay put.
fn shift_reasons(events: &mut [CanonicalEvent]) -> Option<String> {
    if events.is_empty() {
        return None;
    }
    let mut carried = None;
    for event in events.iter_mut().rev() {
        std::mem::swap(&mut event.reason, &mut carried);
    }
    // After the reverse walk `carried` holds the last entry's shifted-out
    // slot; the first entry's original reason is what swapped out last.
    carried
}

/// Collapse redundant assign/close patterns. Idempotent: re-running on its
/// own output changes nothing.
fn collapse(events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    let mut out: Vec<CanonicalEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let Some(prev) = out.last_mut() {
            // Assign immediately closed by the same actor: one consolidated
            // entry carrying the assignment start and the closing details.
            if prev.action == EventAction::Assigned
                && event.action == EventAction::Closed
                && prev.same_actor(&event)
            {
                let merged = CanonicalEvent {
                    action: EventAction::Closed,
                    assigned_to_id: event.assigned_to_id,
                    assigned_to_name: event
                        .assigned_to_name
                        .clone()
                        .or_else(|| prev.assigned_to_name.clone()),
                    assigned_to_role: event.assigned_to_role.or(prev.assigned_to_role),
                    assigned_by_id: prev.assigned_by_id,
                    assigned_by_role: prev.assigned_by_role,
                    // After the reason shift the closing message sits on the
                    // assign entry; a message shifted in from a later row
                    // never displaces it.
                    reason: prev.reason.clone().or_else(|| event.reason.clone()),
                    attachment_path: event
                        .attachment_path
                        .clone()
                        .or_else(|| prev.attachment_path.clone()),
                    created_at: prev.created_at,
                    closed_at: event.closed_at.or(event.created_at),
                    is_consolidated: true,
                };
                *prev = merged;
                continue;
            }
            // A close that duplicates the immediately preceding close by the
            // same actor carries no new information.
            if prev.action == EventAction::Closed
                && event.action == EventAction::Closed
                && prev.same_actor(&event)
                && !event.is_consolidated
            {
                if prev.reason.is_none() {
                    prev.reason = event.reason;
                }
                continue;
            }
        }
        out.push(event);
    }
    out
}
