//! Permission/action resolver.
//!
//! Pure function of ticket state, actor and canonical history. Each role
//! maps to a candidate-action table and every action carries one gate
//! predicate; `allowed_actions` is the intersection. `ensure_permitted` is
//! the single gate in front of the executor. Closed tickets admit nothing,
//! for every role.

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::history::CanonicalHistory;
use super::model::{Actor, ComplaintRating, Role, Ticket, TicketCategory, TicketStatus};
use std::collections::BTreeSet;

/// Everything a user can ask the executor to do.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Attend,
    Assign,
    Reassign,
    Reverse,
    ReverseWithRecommendation,
    ForwardToUnit,
    ForwardToDirectorGeneral,
    Rate,
    ConvertCategory,
    Close,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 10] = [
        Self::Attend,
        Self::Assign,
        Self::Reassign,
        Self::Reverse,
        Self::ReverseWithRecommendation,
        Self::ForwardToUnit,
        Self::ForwardToDirectorGeneral,
        Self::Rate,
        Self::ConvertCategory,
        Self::Close,
    ];
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attend => write!(f, "attend"),
            Self::Assign => write!(f, "assign"),
            Self::Reassign => write!(f, "reassign"),
            Self::Reverse => write!(f, "reverse"),
            Self::ReverseWithRecommendation => write!(f, "reverse with recommendation"),
            Self::ForwardToUnit => write!(f, "forward to unit"),
            Self::ForwardToDirectorGeneral => write!(f, "forward to director-general"),
            Self::Rate => write!(f, "rate"),
            Self::ConvertCategory => write!(f, "convert category"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Out-of-band facts the resolver needs but does not compute itself: the
/// close-policy oracle's verdict for this ticket, and whether the caller has
/// a forward-unit selection pending.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub oracle_can_close: bool,
    pub pending_forward_unit: Option<String>,
}

/// Candidate actions per role, before per-ticket gates are applied.
fn candidate_actions(role: Role) -> &'static [WorkflowAction] {
    use WorkflowAction::*;
    match role {
        Role::Agent | Role::Attendee | Role::Supervisor => &[Attend, Reverse, Close],
        Role::FocalPerson | Role::ClaimFocalPerson | Role::ComplianceFocalPerson => &[
            Attend,
            Assign,
            Reassign,
            Reverse,
            ReverseWithRecommendation,
            Close,
        ],
        Role::HeadOfUnit => &[
            Attend,
            Assign,
            Reassign,
            Reverse,
            ForwardToDirectorGeneral,
            Close,
        ],
        Role::Manager => &[Attend, Assign, Reassign, Reverse, Close],
        Role::Director => &[Attend, Assign, Reverse, ForwardToDirectorGeneral, Close],
        Role::DirectorGeneral => &[Assign, Close],
        Role::Reviewer => &[Rate, ConvertCategory, ForwardToUnit, Close],
    }
}

/// Legal actions for `actor` on `ticket` right now.
pub fn allowed_actions(
    ticket: &Ticket,
    actor: &Actor,
    history: &CanonicalHistory,
    ctx: &ResolveContext,
) -> BTreeSet<WorkflowAction> {
    candidate_actions(actor.role)
        .iter()
        .copied()
        .filter(|action| is_permitted(*action, ticket, actor, history, ctx))
        .collect()
}

/// The single gate: reject before any state is touched.
pub fn ensure_permitted(
    action: WorkflowAction,
    ticket: &Ticket,
    actor: &Actor,
    history: &CanonicalHistory,
    ctx: &ResolveContext,
) -> Result<(), WorkflowError> {
    if candidate_actions(actor.role).contains(&action)
        && is_permitted(action, ticket, actor, history, ctx)
    {
        Ok(())
    } else {
        Err(WorkflowError::ActionNotPermitted(format!(
            "{} may not {} ticket {} in status {}",
            actor.role, action, ticket.ticket_id, ticket.status
        )))
    }
}

fn is_permitted(
    action: WorkflowAction,
    ticket: &Ticket,
    actor: &Actor,
    history: &CanonicalHistory,
    ctx: &ResolveContext,
) -> bool {
    // Closed is terminal, no exceptions.
    if ticket.status.is_closed() {
        return false;
    }
    let holds_ticket = ticket.is_assigned_to(actor.id);

    match action {
        WorkflowAction::Attend => holds_ticket && attend_gate(actor.role, ticket),
        // The current holder hands the ticket on; a role-routed ticket with
        // no holder yet is picked up by anyone in the designated role.
        WorkflowAction::Assign => {
            holds_ticket
                || (ticket.assigned_to_id.is_none()
                    && ticket.assigned_to_role == Some(actor.role))
        }
        WorkflowAction::Reassign => !holds_ticket && history.was_assignee(actor.id),
        WorkflowAction::Reverse => {
            holds_ticket
                && !(actor.role.is_focal() && ticket.category == TicketCategory::Complaint)
        }
        // A focal person returning a Complaint must attach a recommendation;
        // the plain reversal is relabeled.
        WorkflowAction::ReverseWithRecommendation => {
            holds_ticket
                && actor.role.is_focal()
                && ticket.category == TicketCategory::Complaint
        }
        WorkflowAction::ForwardToDirectorGeneral => forward_dg_gate(ticket, actor, history),
        WorkflowAction::Rate => {
            ticket.status == TicketStatus::Open
                && ticket.category == TicketCategory::Complaint
                && !ticket.complaint_type.is_rated()
        }
        WorkflowAction::ConvertCategory | WorkflowAction::ForwardToUnit => {
            ticket.status == TicketStatus::Open
        }
        WorkflowAction::Close => close_gate(ticket, actor, ctx),
    }
}

/// Category/rating gates for attending, by role.
fn attend_gate(role: Role, ticket: &Ticket) -> bool {
    match role {
        // Head of unit handles only minor complaints directly.
        Role::HeadOfUnit => {
            ticket.category == TicketCategory::Complaint
                && ticket.complaint_type == ComplaintRating::Minor
        }
        // Frontline staff take non-complaints, or complaints still unrated.
        Role::Agent | Role::Attendee => {
            ticket.category != TicketCategory::Complaint
                || !ticket.complaint_type.is_rated()
        }
        _ => true,
    }
}

/// Forward to director-general: major complaints only, from the reversal or
/// recommendation stage. The unit path goes through the head of unit; the
/// directorate path requires that a manager already handled the ticket.
fn forward_dg_gate(ticket: &Ticket, actor: &Actor, history: &CanonicalHistory) -> bool {
    if ticket.category != TicketCategory::Complaint
        || ticket.complaint_type != ComplaintRating::Major
    {
        return false;
    }
    if !matches!(
        ticket.status,
        TicketStatus::Reversed | TicketStatus::AttendedAndRecommended
    ) {
        return false;
    }
    match actor.role {
        Role::HeadOfUnit => true,
        Role::Director => history.involves_role(Role::Manager),
        _ => false,
    }
}

/// Close is the oracle's verdict for the current assignee, or one of the
/// explicit shortcuts.
fn close_gate(ticket: &Ticket, actor: &Actor, ctx: &ResolveContext) -> bool {
    if ctx.oracle_can_close && ticket.is_assigned_to(actor.id) {
        return true;
    }
    if actor.role == Role::Reviewer && ticket.is_assigned_to(actor.id) {
        return true;
    }
    if ticket.responsible_unit_name.as_deref() == Some("Public Relation Unit") {
        return true;
    }
    ctx.pending_forward_unit.is_some()
}
