//! Stepper projection: the display-ready view of a ticket's trail.
//!
//! Pass 1 (history.rs) produced immutable canonical events. This module is
//! pass 2: purely display-side decoration (ordering, current-step marker,
//! color, duration text, attachment attribution) with the canonical events
//! left untouched.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::history::{CanonicalEvent, CanonicalHistory};
use super::model::{EventAction, Role, Ticket, TicketStatus};

const DATE_NOT_AVAILABLE: &str = "Date not available";

/// Traffic-light color of one step in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepColor {
    Green,
    Gray,
    Red,
}

/// One display step. `display_number` counts down: the newest step shows the
/// highest number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub display_number: usize,
    pub role_label: String,
    pub actor_name: Option<String>,
    pub assigned_to_id: Option<Uuid>,
    pub action: Option<EventAction>,
    pub reason: Option<String>,
    pub attachment_path: Option<String>,
    /// Name/label of the chronologically previous step's actor, shown as the
    /// attachment sender. Never derived from id matching.
    pub attachment_sent_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub is_consolidated: bool,
    pub is_synthetic: bool,
    pub is_current: bool,
    pub color: StepColor,
    pub duration: String,
}

/// Reverse-chronological trail plus the index of the current step within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stepper {
    pub steps: Vec<Step>,
    pub current_index: usize,
}

// Chronological working form, before reversal and decoration.
struct ChronoStep {
    role_label: String,
    actor_name: Option<String>,
    assigned_to_id: Option<Uuid>,
    assigned_to_role: Option<Role>,
    action: Option<EventAction>,
    reason: Option<String>,
    attachment_path: Option<String>,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    is_consolidated: bool,
    is_synthetic: bool,
}

impl ChronoStep {
    fn from_event(event: &CanonicalEvent) -> Self {
        Self {
            role_label: event
                .assigned_to_role
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unassigned".to_string()),
            actor_name: event.assigned_to_name.clone(),
            assigned_to_id: event.assigned_to_id,
            assigned_to_role: event.assigned_to_role,
            action: Some(event.action),
            reason: event.reason.clone(),
            attachment_path: event.attachment_path.clone(),
            created_at: event.created_at,
            closed_at: event.closed_at,
            is_consolidated: event.is_consolidated,
            is_synthetic: false,
        }
    }

    fn label(&self) -> String {
        self.actor_name
            .clone()
            .unwrap_or_else(|| self.role_label.clone())
    }
}

/// Project the canonical history into the reverse-chronological stepper.
pub fn project(ticket: &Ticket, history: &CanonicalHistory) -> Stepper {
    project_at(ticket, history, Utc::now())
}

/// Same as [`project`] with an explicit "now", so durations are testable.
pub fn project_at(ticket: &Ticket, history: &CanonicalHistory, now: DateTime<Utc>) -> Stepper {
    let mut chrono: Vec<ChronoStep> = Vec::with_capacity(history.events.len() + 2);

    // Synthetic creator step always leads the trail.
    chrono.push(ChronoStep {
        role_label: "Creator".to_string(),
        actor_name: None,
        assigned_to_id: None,
        assigned_to_role: None,
        action: Some(EventAction::Created),
        reason: history
            .creator_reason
            .clone()
            .or_else(|| Some(ticket.description.clone())),
        attachment_path: ticket.attachment_path.clone(),
        created_at: Some(ticket.created_at),
        closed_at: None,
        is_consolidated: false,
        is_synthetic: true,
    });

    chrono.extend(history.events.iter().map(ChronoStep::from_event));

    // Reviewer desk placeholder while an unrouted reviewable ticket waits.
    let reviewer_pending = ticket.status == TicketStatus::Open
        && ticket.category.needs_review()
        && !history.involves_role(Role::Reviewer);
    if reviewer_pending {
        chrono.push(ChronoStep {
            role_label: "Currently with Reviewer".to_string(),
            actor_name: None,
            assigned_to_id: None,
            assigned_to_role: Some(Role::Reviewer),
            action: None,
            reason: None,
            attachment_path: None,
            created_at: None,
            closed_at: None,
            is_consolidated: false,
            is_synthetic: true,
        });
    }

    let current = current_chrono_index(ticket, history, &chrono, reviewer_pending);

    let total = chrono.len();
    let mut steps: Vec<Step> = Vec::with_capacity(total);
    for (i, step) in chrono.iter().enumerate() {
        let sent_by = if step.attachment_path.is_some() && i > 0 {
            Some(chrono[i - 1].label())
        } else {
            None
        };
        steps.push(Step {
            display_number: 0, // filled in after reversal
            role_label: step.role_label.clone(),
            actor_name: step.actor_name.clone(),
            assigned_to_id: step.assigned_to_id,
            action: step.action,
            reason: step.reason.clone(),
            attachment_path: step.attachment_path.clone(),
            attachment_sent_by: sent_by,
            created_at: step.created_at,
            closed_at: step.closed_at,
            is_consolidated: step.is_consolidated,
            is_synthetic: step.is_synthetic,
            is_current: i == current,
            color: step_color(ticket, &chrono, i, current),
            duration: duration_label(ticket, &chrono, i, now),
        });
    }

    steps.reverse();
    for (i, step) in steps.iter_mut().enumerate() {
        step.display_number = total - i;
    }

    Stepper {
        steps,
        current_index: total - 1 - current,
    }
}

/// Pick the chronological index of the "you are here" step.
fn current_chrono_index(
    ticket: &Ticket,
    history: &CanonicalHistory,
    chrono: &[ChronoStep],
    reviewer_pending: bool,
) -> usize {
    let last = chrono.len() - 1;

    if reviewer_pending {
        return last;
    }
    if ticket.status == TicketStatus::Open
        && (ticket.assigned_to_id.is_none() || history.events.is_empty())
    {
        return last;
    }
    if let Some(event) = history.last() {
        if matches!(
            event.action,
            EventAction::Assigned
                | EventAction::Reassigned
                | EventAction::Reversed
                | EventAction::Forwarded
        ) {
            return last;
        }
    }
    if let Some(current_id) = ticket.assigned_to_id {
        if let Some(pos) = chrono
            .iter()
            .rposition(|s| !s.is_synthetic && s.assigned_to_id == Some(current_id))
        {
            return pos;
        }
    }
    0
}

/// Color precedence, first match wins. The Assigned-to-Reviewer and
/// current-step branches both yield gray; the overlap is deliberate.
fn step_color(ticket: &Ticket, chrono: &[ChronoStep], i: usize, current: usize) -> StepColor {
    let step = &chrono[i];
    let next = chrono.get(i + 1);

    if ticket.is_settled() || step.is_consolidated {
        return StepColor::Green;
    }
    if i == current {
        return StepColor::Gray;
    }
    if step.action == Some(EventAction::Forwarded) {
        return StepColor::Green;
    }
    if step.action == Some(EventAction::Escalated) {
        return match next.and_then(|n| n.action) {
            Some(EventAction::Assigned) => StepColor::Green,
            Some(EventAction::Escalated) => StepColor::Red,
            _ => StepColor::Gray,
        };
    }
    if i > 0 && chrono[i - 1].action == Some(EventAction::Escalated) {
        return StepColor::Red;
    }
    if step.action == Some(EventAction::Assigned) {
        if let Some(next) = next {
            if !next.is_synthetic && next.assigned_to_id != step.assigned_to_id {
                // Handed on to someone else.
                return StepColor::Green;
            }
        }
        return StepColor::Gray;
    }
    if step.assigned_to_role == Some(Role::Reviewer) {
        return StepColor::Gray;
    }
    if i < current {
        // Chronologically earlier than the current step: completed.
        return StepColor::Green;
    }
    StepColor::Gray
}

/// Elapsed-time label for one step. A closing step reads
/// "Closed with 3d since assigned", anything else just "3d".
fn duration_label(
    ticket: &Ticket,
    chrono: &[ChronoStep],
    i: usize,
    now: DateTime<Utc>,
) -> String {
    let Some(start) = chrono[i].created_at else {
        return DATE_NOT_AVAILABLE.to_string();
    };
    let end = chrono[i]
        .closed_at
        .or_else(|| chrono.get(i + 1).and_then(|n| n.created_at))
        .or(ticket.date_of_resolution)
        .unwrap_or(now);

    let bucket = bucket_duration(end - start);
    if chrono[i].action == Some(EventAction::Closed) {
        format!("Closed with {} since assigned", bucket)
    } else {
        bucket
    }
}

fn bucket_duration(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{}d", days);
    }
    if days < 30 {
        return format!("{}w", days / 7);
    }
    format!("{}mo", days / 30)
}
