//! Transition executor: applies one legal action to a ticket snapshot and
//! yields the next ticket value plus the assignment event to append. Pure
//! computation; persistence and notification stay with the caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::WorkflowError;
use super::history::CanonicalHistory;
use super::model::{
    Actor, Assignee, AssignmentEvent, ComplaintRating, EventAction, NewTicket, Role, Ticket,
    TicketCategory, TicketStatus,
};
use super::policy::{ensure_permitted, ResolveContext, WorkflowAction};

/// A chosen action together with its required payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionRequest {
    Assign {
        assignee: Assignee,
    },
    Reassign {
        assignee: Assignee,
    },
    Attend {
        resolution_details: String,
        #[serde(default)]
        recommendation: Option<String>,
    },
    Reverse {
        reason: String,
    },
    ReverseWithRecommendation {
        recommendation: String,
    },
    ForwardToUnit {
        unit: String,
        #[serde(default)]
        rating: Option<ComplaintRating>,
        #[serde(default)]
        comment: Option<String>,
    },
    ForwardToDirectorGeneral {
        /// The forwarding actor's own account, written fresh for this
        /// forward; never pre-filled from an earlier director-general note.
        description: String,
        #[serde(default)]
        updated_ticket_description: Option<String>,
    },
    ConvertCategory {
        category: TicketCategory,
        #[serde(default)]
        unit: Option<String>,
    },
    Rate {
        rating: ComplaintRating,
    },
    Close {
        resolution_details: String,
        #[serde(default)]
        resolution_type: Option<String>,
    },
}

impl TransitionRequest {
    pub fn action(&self) -> WorkflowAction {
        match self {
            Self::Assign { .. } => WorkflowAction::Assign,
            Self::Reassign { .. } => WorkflowAction::Reassign,
            Self::Attend { .. } => WorkflowAction::Attend,
            Self::Reverse { .. } => WorkflowAction::Reverse,
            Self::ReverseWithRecommendation { .. } => {
                WorkflowAction::ReverseWithRecommendation
            }
            Self::ForwardToUnit { .. } => WorkflowAction::ForwardToUnit,
            Self::ForwardToDirectorGeneral { .. } => {
                WorkflowAction::ForwardToDirectorGeneral
            }
            Self::ConvertCategory { .. } => WorkflowAction::ConvertCategory,
            Self::Rate { .. } => WorkflowAction::Rate,
            Self::Close { .. } => WorkflowAction::Close,
        }
    }
}

/// Result of a successfully executed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub ticket: Ticket,
    pub event: AssignmentEvent,
}

/// Deterministic status mapping, `(status, action) -> next status`.
/// `Closed` has no outgoing transitions for any action.
pub fn next_status(current: TicketStatus, action: WorkflowAction) -> Option<TicketStatus> {
    if current.is_closed() {
        return None;
    }
    Some(match action {
        WorkflowAction::Assign | WorkflowAction::Reassign => TicketStatus::Assigned,
        WorkflowAction::Attend => TicketStatus::AttendedAndRecommended,
        WorkflowAction::Reverse | WorkflowAction::ReverseWithRecommendation => {
            TicketStatus::Reversed
        }
        WorkflowAction::ForwardToUnit
        | WorkflowAction::ForwardToDirectorGeneral
        | WorkflowAction::ConvertCategory => TicketStatus::Forwarded,
        WorkflowAction::Rate => current,
        WorkflowAction::Close => TicketStatus::Closed,
    })
}

/// Build a fresh ticket plus its `Created` event. The description travels as
/// the event reason, which is what later surfaces on the Creator step.
pub fn create_ticket(
    new: NewTicket,
    creator: &Actor,
    ticket_number: String,
) -> Result<(Ticket, AssignmentEvent), WorkflowError> {
    if new.description.trim().is_empty() {
        return Err(WorkflowError::InvalidTransitionInput(
            "a ticket needs a description".into(),
        ));
    }
    let now = Utc::now();
    let ticket = Ticket {
        id: Uuid::new_v4(),
        ticket_id: ticket_number,
        category: new.category,
        complaint_type: ComplaintRating::Unrated,
        section: new.section,
        sub_section: new.sub_section,
        responsible_unit_name: new.responsible_unit_name,
        assigned_to_id: None,
        assigned_to_name: None,
        assigned_to_role: None,
        status: TicketStatus::Open,
        description: new.description.clone(),
        resolution_details: None,
        resolution_type: None,
        attachment_path: new.attachment_path.clone(),
        created_at: now,
        assigned_at: None,
        date_of_resolution: None,
    };
    let event = AssignmentEvent {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        action: EventAction::Created,
        assigned_to_id: Some(creator.id),
        assigned_to_name: creator.name.clone(),
        assigned_to_role: Some(creator.role),
        assigned_by_id: Some(creator.id),
        assigned_by_role: Some(creator.role),
        reason: Some(new.description),
        attachment_path: new.attachment_path,
        created_at: Some(now),
        closed_at: None,
    };
    Ok((ticket, event))
}

/// Apply `request` to a snapshot of the ticket. Permission is checked first,
/// then payload validity; only then is the new state built. On error the
/// ticket value is untouched and no event exists.
pub fn execute(
    ticket: &Ticket,
    actor: &Actor,
    history: &CanonicalHistory,
    request: TransitionRequest,
    attachment_path: Option<String>,
    ctx: &ResolveContext,
) -> Result<TransitionOutcome, WorkflowError> {
    let action = request.action();
    ensure_permitted(action, ticket, actor, history, ctx)?;

    let status = next_status(ticket.status, action).ok_or_else(|| {
        WorkflowError::ActionNotPermitted(format!(
            "ticket {} is closed",
            ticket.ticket_id
        ))
    })?;

    let now = Utc::now();
    let mut next = ticket.clone();
    next.status = status;

    let mut event = AssignmentEvent {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        action: EventAction::Assigned,
        assigned_to_id: Some(actor.id),
        assigned_to_name: actor.name.clone(),
        assigned_to_role: Some(actor.role),
        assigned_by_id: Some(actor.id),
        assigned_by_role: Some(actor.role),
        reason: None,
        attachment_path,
        created_at: Some(now),
        closed_at: None,
    };

    match request {
        TransitionRequest::Assign { assignee } | TransitionRequest::Reassign { assignee } => {
            event.action = if action == WorkflowAction::Assign {
                EventAction::Assigned
            } else {
                EventAction::Reassigned
            };
            event.assigned_to_id = Some(assignee.id);
            event.assigned_to_name = Some(assignee.name.clone());
            event.assigned_to_role = Some(assignee.role);
            next.assigned_to_id = Some(assignee.id);
            next.assigned_to_name = Some(assignee.name);
            next.assigned_to_role = Some(assignee.role);
            next.assigned_at = Some(now);
        }
        TransitionRequest::Attend {
            resolution_details,
            recommendation,
        } => {
            require(&resolution_details, "attend requires resolution details")?;
            // Without a recommendation the assignee is simply working the
            // ticket; with one, it travels up the chain.
            if recommendation.is_none() {
                next.status = TicketStatus::InProgress;
            }
            event.action = EventAction::Escalated;
            event.reason = recommendation.or(Some(resolution_details.clone()));
            next.resolution_details = Some(resolution_details);
        }
        TransitionRequest::Reverse { reason } => {
            require(&reason, "reverse requires a reason")?;
            event.action = EventAction::Reversed;
            event.reason = Some(reason);
            route_to_previous_assignee(&mut next, &mut event, history);
        }
        TransitionRequest::ReverseWithRecommendation { recommendation } => {
            require(&recommendation, "reverse requires a recommendation")?;
            event.action = EventAction::Reversed;
            event.reason = Some(recommendation);
            route_to_previous_assignee(&mut next, &mut event, history);
        }
        TransitionRequest::ForwardToUnit {
            unit,
            rating,
            comment,
        } => {
            require(&unit, "forward requires a destination unit")?;
            if ticket.category == TicketCategory::Complaint {
                apply_rating_for_forward(&mut next, rating)?;
                let comment = comment.unwrap_or_default();
                require(&comment, "forwarding a complaint requires a comment")?;
                event.reason = Some(comment);
            } else {
                event.reason = comment;
            }
            event.action = EventAction::Forwarded;
            event.assigned_to_id = None;
            event.assigned_to_name = None;
            event.assigned_to_role = Some(Role::FocalPerson);
            next.responsible_unit_name = Some(unit);
            next.assigned_to_id = None;
            next.assigned_to_name = None;
            next.assigned_to_role = Some(Role::FocalPerson);
        }
        TransitionRequest::ForwardToDirectorGeneral {
            description,
            updated_ticket_description,
        } => {
            require(&description, "forwarding to the director-general requires the actor's own description")?;
            if let Some(updated) = updated_ticket_description {
                require(&updated, "updated ticket description may not be blank")?;
                next.description = updated;
            }
            event.action = EventAction::Forwarded;
            event.reason = Some(description);
            event.assigned_to_id = None;
            event.assigned_to_name = None;
            event.assigned_to_role = Some(Role::DirectorGeneral);
            next.assigned_to_id = None;
            next.assigned_to_name = None;
            next.assigned_to_role = Some(Role::DirectorGeneral);
        }
        TransitionRequest::ConvertCategory { category, unit } => {
            if category == ticket.category {
                return Err(WorkflowError::InvalidTransitionInput(format!(
                    "ticket is already a {}",
                    category
                )));
            }
            event.action = EventAction::Forwarded;
            event.reason = Some(format!("Converted to {}", category));
            event.assigned_to_id = None;
            event.assigned_to_name = None;
            event.assigned_to_role = Some(Role::FocalPerson);
            next.category = category;
            if let Some(unit) = unit {
                next.responsible_unit_name = Some(unit);
            }
            next.assigned_to_id = None;
            next.assigned_to_name = None;
            next.assigned_to_role = Some(Role::FocalPerson);
        }
        TransitionRequest::Rate { rating } => {
            if !rating.is_rated() {
                return Err(WorkflowError::InvalidTransitionInput(
                    "rating must be Minor or Major".into(),
                ));
            }
            if ticket.complaint_type.is_rated() {
                return Err(WorkflowError::InvalidTransitionInput(format!(
                    "ticket is already rated {}",
                    ticket.complaint_type
                )));
            }
            event.action = EventAction::Rated;
            next.complaint_type = rating;
        }
        TransitionRequest::Close {
            resolution_details,
            resolution_type,
        } => {
            require(&resolution_details, "close requires resolution details")?;
            event.action = EventAction::Closed;
            event.reason = Some(resolution_details.clone());
            next.resolution_details = Some(resolution_details);
            next.resolution_type = resolution_type;
            next.date_of_resolution = Some(now);
        }
    }

    Ok(TransitionOutcome {
        ticket: next,
        event,
    })
}

fn require(value: &str, message: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        Err(WorkflowError::InvalidTransitionInput(message.into()))
    } else {
        Ok(())
    }
}

/// Complaint forwards need a rating: either the one already on the ticket,
/// or one supplied with the forward. A conflicting re-rate is refused.
fn apply_rating_for_forward(
    ticket: &mut Ticket,
    supplied: Option<ComplaintRating>,
) -> Result<(), WorkflowError> {
    match (ticket.complaint_type.is_rated(), supplied) {
        (true, Some(r)) if r != ticket.complaint_type => {
            Err(WorkflowError::InvalidTransitionInput(format!(
                "ticket is already rated {}",
                ticket.complaint_type
            )))
        }
        (true, _) => Ok(()),
        (false, Some(r)) if r.is_rated() => {
            ticket.complaint_type = r;
            Ok(())
        }
        _ => Err(WorkflowError::InvalidTransitionInput(
            "forwarding a complaint requires a Minor or Major rating".into(),
        )),
    }
}

/// Reversal routes the ticket back to the most recent prior assignee; with
/// no such entry the ticket is left unassigned for manual pickup.
fn route_to_previous_assignee(
    next: &mut Ticket,
    event: &mut AssignmentEvent,
    history: &CanonicalHistory,
) {
    match history.previous_assignee(next.assigned_to_id) {
        Some(prev) => {
            event.assigned_to_id = prev.assigned_to_id;
            event.assigned_to_name = prev.assigned_to_name.clone();
            event.assigned_to_role = prev.assigned_to_role;
            next.assigned_to_id = prev.assigned_to_id;
            next.assigned_to_name = prev.assigned_to_name.clone();
            next.assigned_to_role = prev.assigned_to_role;
        }
        None => {
            event.assigned_to_id = None;
            event.assigned_to_name = None;
            event.assigned_to_role = None;
            next.assigned_to_id = None;
            next.assigned_to_name = None;
            next.assigned_to_role = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::history::canonicalize;
    use chrono::TimeZone;
    use chrono::{DateTime, Utc};

    fn ts(minute: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap())
    }

    fn ticket(status: TicketStatus, category: TicketCategory) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_id: "TKT-000010".into(),
            category,
            complaint_type: ComplaintRating::Unrated,
            section: None,
            sub_section: None,
            responsible_unit_name: None,
            assigned_to_id: None,
            assigned_to_name: None,
            assigned_to_role: None,
            status,
            description: "desc".into(),
            resolution_details: None,
            resolution_type: None,
            attachment_path: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            assigned_at: None,
            date_of_resolution: None,
        }
    }

    fn actor(role: Role) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            name: Some("Test User".into()),
            unit_section: None,
        }
    }

    fn raw_event(action: EventAction, to: Uuid, minute: u32) -> AssignmentEvent {
        AssignmentEvent {
            id: Uuid::new_v4(),
            ticket_id: Uuid::nil(),
            action,
            assigned_to_id: Some(to),
            assigned_to_name: None,
            assigned_to_role: None,
            assigned_by_id: None,
            assigned_by_role: None,
            reason: None,
            attachment_path: None,
            created_at: ts(minute),
            closed_at: None,
        }
    }

    #[test]
    fn closed_has_no_outgoing_transitions() {
        for action in WorkflowAction::ALL {
            assert_eq!(next_status(TicketStatus::Closed, action), None);
        }
    }

    #[test]
    fn status_table_is_deterministic() {
        for status in TicketStatus::ALL {
            for action in WorkflowAction::ALL {
                let next = next_status(status, action);
                if status.is_closed() {
                    assert_eq!(next, None);
                } else {
                    assert!(next.is_some());
                }
            }
        }
        assert_eq!(
            next_status(TicketStatus::Assigned, WorkflowAction::Rate),
            Some(TicketStatus::Assigned)
        );
    }

    #[test]
    fn simple_close_scenario() {
        let mut t = ticket(TicketStatus::Assigned, TicketCategory::Inquiry);
        let a = actor(Role::Attendee);
        t.assigned_to_id = Some(a.id);
        let ctx = ResolveContext {
            oracle_can_close: true,
            ..Default::default()
        };
        let outcome = execute(
            &t,
            &a,
            &canonicalize(&[]),
            TransitionRequest::Close {
                resolution_details: "fixed at the counter".into(),
                resolution_type: None,
            },
            None,
            &ctx,
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::Closed);
        assert!(outcome.ticket.date_of_resolution.is_some());
        assert_eq!(outcome.event.action, EventAction::Closed);
        assert_eq!(outcome.event.assigned_to_id, Some(a.id));
    }

    #[test]
    fn close_without_details_is_rejected() {
        let mut t = ticket(TicketStatus::Assigned, TicketCategory::Inquiry);
        let a = actor(Role::Attendee);
        t.assigned_to_id = Some(a.id);
        let ctx = ResolveContext {
            oracle_can_close: true,
            ..Default::default()
        };
        let err = execute(
            &t,
            &a,
            &canonicalize(&[]),
            TransitionRequest::Close {
                resolution_details: "  ".into(),
                resolution_type: None,
            },
            None,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransitionInput(_)));
    }

    #[test]
    fn reverse_requires_reason_and_routes_back() {
        let mut t = ticket(TicketStatus::Assigned, TicketCategory::Inquiry);
        let a = actor(Role::Manager);
        t.assigned_to_id = Some(a.id);
        let earlier = Uuid::new_v4();
        let history = canonicalize(&[
            raw_event(EventAction::Assigned, earlier, 1),
            raw_event(EventAction::Forwarded, a.id, 2),
        ]);

        let err = execute(
            &t,
            &a,
            &history,
            TransitionRequest::Reverse { reason: "".into() },
            None,
            &ResolveContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransitionInput(_)));

        let outcome = execute(
            &t,
            &a,
            &history,
            TransitionRequest::Reverse {
                reason: "needs more evidence".into(),
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::Reversed);
        assert_eq!(outcome.ticket.assigned_to_id, Some(earlier));
        assert_eq!(outcome.event.action, EventAction::Reversed);
    }

    #[test]
    fn reviewer_forward_comment_gate() {
        let t = ticket(TicketStatus::Open, TicketCategory::Complaint);
        let reviewer = actor(Role::Reviewer);

        // Unrated and uncommented: refused.
        let err = execute(
            &t,
            &reviewer,
            &canonicalize(&[]),
            TransitionRequest::ForwardToUnit {
                unit: "Claims Unit".into(),
                rating: None,
                comment: None,
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransitionInput(_)));

        // Rated but no comment: still refused.
        let err = execute(
            &t,
            &reviewer,
            &canonicalize(&[]),
            TransitionRequest::ForwardToUnit {
                unit: "Claims Unit".into(),
                rating: Some(ComplaintRating::Minor),
                comment: None,
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransitionInput(_)));

        // Rating plus comment passes and stamps the rating.
        let outcome = execute(
            &t,
            &reviewer,
            &canonicalize(&[]),
            TransitionRequest::ForwardToUnit {
                unit: "Claims Unit".into(),
                rating: Some(ComplaintRating::Minor),
                comment: Some("routine service complaint".into()),
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::Forwarded);
        assert_eq!(outcome.ticket.complaint_type, ComplaintRating::Minor);
        assert_eq!(
            outcome.ticket.responsible_unit_name.as_deref(),
            Some("Claims Unit")
        );
    }

    #[test]
    fn rating_is_monotonic() {
        let mut t = ticket(TicketStatus::Open, TicketCategory::Complaint);
        t.complaint_type = ComplaintRating::Minor;
        let reviewer = actor(Role::Reviewer);
        let err = execute(
            &t,
            &reviewer,
            &canonicalize(&[]),
            TransitionRequest::Rate {
                rating: ComplaintRating::Major,
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap_err();
        // The resolver already refuses Rate on a rated ticket.
        assert!(matches!(err, WorkflowError::ActionNotPermitted(_)));
    }

    #[test]
    fn forward_to_dg_demands_fresh_description() {
        let mut t = ticket(TicketStatus::Reversed, TicketCategory::Complaint);
        t.complaint_type = ComplaintRating::Major;
        let hou = actor(Role::HeadOfUnit);
        let err = execute(
            &t,
            &hou,
            &canonicalize(&[]),
            TransitionRequest::ForwardToDirectorGeneral {
                description: "".into(),
                updated_ticket_description: None,
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransitionInput(_)));

        let outcome = execute(
            &t,
            &hou,
            &canonicalize(&[]),
            TransitionRequest::ForwardToDirectorGeneral {
                description: "unit could not resolve; escalating".into(),
                updated_ticket_description: Some("clarified complaint wording".into()),
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::Forwarded);
        assert_eq!(
            outcome.ticket.assigned_to_role,
            Some(Role::DirectorGeneral)
        );
        assert_eq!(outcome.ticket.description, "clarified complaint wording");
    }

    #[test]
    fn attend_with_recommendation_escalates() {
        let mut t = ticket(TicketStatus::Assigned, TicketCategory::Complaint);
        t.complaint_type = ComplaintRating::Minor;
        let hou = actor(Role::HeadOfUnit);
        t.assigned_to_id = Some(hou.id);
        let outcome = execute(
            &t,
            &hou,
            &canonicalize(&[]),
            TransitionRequest::Attend {
                resolution_details: "inspected the branch".into(),
                recommendation: Some("recommend refund".into()),
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::AttendedAndRecommended);
        assert_eq!(outcome.event.action, EventAction::Escalated);
        assert_eq!(outcome.event.reason.as_deref(), Some("recommend refund"));
    }

    #[test]
    fn attend_without_recommendation_is_in_progress() {
        let mut t = ticket(TicketStatus::Assigned, TicketCategory::Inquiry);
        let a = actor(Role::Attendee);
        t.assigned_to_id = Some(a.id);
        let outcome = execute(
            &t,
            &a,
            &canonicalize(&[]),
            TransitionRequest::Attend {
                resolution_details: "looking into it".into(),
                recommendation: None,
            },
            None,
            &ResolveContext::default(),
        )
        .unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    }

    #[test]
    fn create_ticket_opens_with_created_event() {
        let creator = actor(Role::Agent);
        let (t, event) = create_ticket(
            NewTicket {
                category: TicketCategory::Complaint,
                description: "rude service at branch".into(),
                section: None,
                sub_section: None,
                responsible_unit_name: None,
                attachment_path: None,
            },
            &creator,
            "TKT-000001".into(),
        )
        .unwrap();
        assert_eq!(t.status, TicketStatus::Open);
        assert_eq!(event.action, EventAction::Created);
        assert_eq!(event.reason.as_deref(), Some("rude service at branch"));
    }
}
