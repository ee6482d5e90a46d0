//! The ticket workflow engine: a pure decision layer over ticket state,
//! actor identity and assignment history. No I/O happens in here; stores,
//! sessions and notifications are collaborators of the service layer.

pub mod error;
pub mod history;
pub mod model;
pub mod policy;
pub mod stepper;
pub mod transition;

pub use error::WorkflowError;
pub use history::{canonicalize, CanonicalEvent, CanonicalHistory};
pub use model::{
    Actor, Assignee, AssignmentEvent, ComplaintRating, EventAction, NewTicket, Role, Ticket,
    TicketCategory, TicketStatus,
};
pub use policy::{allowed_actions, ensure_permitted, ResolveContext, WorkflowAction};
pub use stepper::{project, project_at, Step, StepColor, Stepper};
pub use transition::{
    create_ticket, execute, next_status, TransitionOutcome, TransitionRequest,
};
