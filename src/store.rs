//! Ticket store and close-policy collaborators.
//!
//! The engine never talks to storage directly; the service layer goes
//! through these traits. The in-memory implementation keeps a per-ticket
//! version counter so a transition computed against a stale snapshot is
//! refused instead of silently merged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::workflow::transition::TransitionOutcome;
use crate::workflow::{Actor, AssignmentEvent, NewTicket, Ticket, TicketStatus, WorkflowError};

/// Ticket snapshot plus the version the caller must echo back on transition.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TicketRecord {
    pub ticket: Ticket,
    pub version: u64,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, new: NewTicket, creator: &Actor) -> Result<TicketRecord, WorkflowError>;
    async fn get(&self, id: Uuid) -> Result<TicketRecord, WorkflowError>;
    async fn list(&self) -> Result<Vec<Ticket>, WorkflowError>;
    async fn history(&self, id: Uuid) -> Result<Vec<AssignmentEvent>, WorkflowError>;

    /// Commit a computed transition. `expected_version` must match the
    /// stored version or the commit is refused with `StaleTicketState`.
    async fn apply_transition(
        &self,
        id: Uuid,
        expected_version: u64,
        outcome: TransitionOutcome,
    ) -> Result<TicketRecord, WorkflowError>;
}

/// Opaque close-permission oracle consulted before the resolver runs.
#[async_trait]
pub trait ClosePolicy: Send + Sync {
    async fn can_close_at_current_step(&self, ticket: &Ticket) -> bool;
}

/// Allows closing from the listed statuses. The default covers every stage
/// where someone is actually holding the ticket.
pub struct StatusClosePolicy {
    allowed: Vec<TicketStatus>,
}

impl StatusClosePolicy {
    pub fn new(allowed: Vec<TicketStatus>) -> Self {
        Self { allowed }
    }
}

impl Default for StatusClosePolicy {
    fn default() -> Self {
        Self::new(vec![
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::AttendedAndRecommended,
            TicketStatus::Reversed,
            TicketStatus::Returned,
        ])
    }
}

#[async_trait]
impl ClosePolicy for StatusClosePolicy {
    async fn can_close_at_current_step(&self, ticket: &Ticket) -> bool {
        self.allowed.contains(&ticket.status)
    }
}

/// Oracle that always says no; the resolver's explicit shortcuts still apply.
pub struct DenyAllClosePolicy;

#[async_trait]
impl ClosePolicy for DenyAllClosePolicy {
    async fn can_close_at_current_step(&self, _ticket: &Ticket) -> bool {
        false
    }
}

struct StoredTicket {
    ticket: Ticket,
    events: Vec<AssignmentEvent>,
    version: u64,
}

/// RwLock'd map keyed by ticket id, with a monotonically increasing human
/// ticket number.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<Uuid, StoredTicket>>,
    seq: AtomicU64,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn next_ticket_number(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("TKT-{:06}", n)
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create(&self, new: NewTicket, creator: &Actor) -> Result<TicketRecord, WorkflowError> {
        let number = self.next_ticket_number();
        let (ticket, event) = crate::workflow::create_ticket(new, creator, number)?;
        let mut tickets = self.tickets.write().await;
        tickets.insert(
            ticket.id,
            StoredTicket {
                ticket: ticket.clone(),
                events: vec![event],
                version: 1,
            },
        );
        Ok(TicketRecord { ticket, version: 1 })
    }

    async fn get(&self, id: Uuid) -> Result<TicketRecord, WorkflowError> {
        let tickets = self.tickets.read().await;
        let stored = tickets.get(&id).ok_or(WorkflowError::TicketNotFound(id))?;
        Ok(TicketRecord {
            ticket: stored.ticket.clone(),
            version: stored.version,
        })
    }

    async fn list(&self) -> Result<Vec<Ticket>, WorkflowError> {
        let tickets = self.tickets.read().await;
        let mut all: Vec<Ticket> = tickets.values().map(|s| s.ticket.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn history(&self, id: Uuid) -> Result<Vec<AssignmentEvent>, WorkflowError> {
        let tickets = self.tickets.read().await;
        let stored = tickets.get(&id).ok_or(WorkflowError::TicketNotFound(id))?;
        Ok(stored.events.clone())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected_version: u64,
        outcome: TransitionOutcome,
    ) -> Result<TicketRecord, WorkflowError> {
        let mut tickets = self.tickets.write().await;
        let stored = tickets
            .get_mut(&id)
            .ok_or(WorkflowError::TicketNotFound(id))?;
        if stored.version != expected_version {
            return Err(WorkflowError::StaleTicketState {
                expected: expected_version,
                found: stored.version,
            });
        }
        stored.ticket = outcome.ticket;
        stored.events.push(outcome.event);
        stored.version += 1;
        Ok(TicketRecord {
            ticket: stored.ticket.clone(),
            version: stored.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{
        execute, ResolveContext, Role, TicketCategory, TransitionRequest,
    };

    fn creator() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::Agent,
            name: Some("Desk Agent".into()),
            unit_section: None,
        }
    }

    fn new_ticket() -> NewTicket {
        NewTicket {
            category: TicketCategory::Inquiry,
            description: "where is my refund".into(),
            section: None,
            sub_section: None,
            responsible_unit_name: None,
            attachment_path: None,
        }
    }

    #[tokio::test]
    async fn ticket_numbers_are_sequential() {
        let store = InMemoryTicketStore::new();
        let a = store.create(new_ticket(), &creator()).await.unwrap();
        let b = store.create(new_ticket(), &creator()).await.unwrap();
        assert_eq!(a.ticket.ticket_id, "TKT-000001");
        assert_eq!(b.ticket.ticket_id, "TKT-000002");
    }

    #[tokio::test]
    async fn stale_version_is_refused() {
        let store = InMemoryTicketStore::new();
        let rec = store.create(new_ticket(), &creator()).await.unwrap();
        let id = rec.ticket.id;

        let mut snapshot = rec.ticket.clone();
        let assignee = Actor {
            id: Uuid::new_v4(),
            role: Role::Attendee,
            name: Some("Worker".into()),
            unit_section: None,
        };
        snapshot.assigned_to_id = Some(assignee.id);
        snapshot.status = crate::workflow::TicketStatus::Assigned;
        let history = crate::workflow::canonicalize(&store.history(id).await.unwrap());
        let ctx = ResolveContext {
            oracle_can_close: true,
            ..Default::default()
        };
        let outcome = execute(
            &snapshot,
            &assignee,
            &history,
            TransitionRequest::Close {
                resolution_details: "answered".into(),
                resolution_type: None,
            },
            None,
            &ctx,
        )
        .unwrap();

        // Correct version commits; replaying the same version conflicts.
        store
            .apply_transition(id, rec.version, outcome.clone())
            .await
            .unwrap();
        let err = store
            .apply_transition(id, rec.version, outcome)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StaleTicketState { .. }));
    }

    #[tokio::test]
    async fn close_policies_differ_on_held_statuses() {
        let rec = InMemoryTicketStore::new()
            .create(new_ticket(), &creator())
            .await
            .unwrap();
        let mut ticket = rec.ticket;
        let allow = StatusClosePolicy::default();
        let deny = DenyAllClosePolicy;
        for status in crate::workflow::TicketStatus::ALL {
            ticket.status = status;
            assert!(!deny.can_close_at_current_step(&ticket).await);
        }
        ticket.status = TicketStatus::Assigned;
        assert!(allow.can_close_at_current_step(&ticket).await);
        ticket.status = TicketStatus::Open;
        assert!(!allow.can_close_at_current_step(&ticket).await);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let store = InMemoryTicketStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::TicketNotFound(_)));
    }
}
