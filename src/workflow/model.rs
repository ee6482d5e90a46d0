//! Core data model for the ticket workflow engine.
//!
//! Statuses, categories, ratings and roles are closed enums, so every
//! transition is checked at compile time and serialized consistently on
//! the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// TICKET STATUS
// ============================================================================

/// Lifecycle status of a ticket. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    Returned,
    Reversed,
    AttendedAndRecommended,
    Forwarded,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 8] = [
        Self::Open,
        Self::Assigned,
        Self::InProgress,
        Self::Returned,
        Self::Reversed,
        Self::AttendedAndRecommended,
        Self::Forwarded,
        Self::Closed,
    ];

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Assigned => write!(f, "Assigned"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Returned => write!(f, "Returned"),
            Self::Reversed => write!(f, "Reversed"),
            Self::AttendedAndRecommended => write!(f, "Attended and Recommended"),
            Self::Forwarded => write!(f, "Forwarded"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "assigned" => Ok(Self::Assigned),
            "in progress" | "in_progress" => Ok(Self::InProgress),
            "returned" => Ok(Self::Returned),
            "reversed" | "reversing" => Ok(Self::Reversed),
            "attended and recommended" | "attended_and_recommended" => {
                Ok(Self::AttendedAndRecommended)
            }
            "forwarded" => Ok(Self::Forwarded),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

// ============================================================================
// CATEGORY & RATING
// ============================================================================

/// Classification of the ticket as filed by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Inquiry,
    Complaint,
    Compliment,
    Suggestion,
}

impl TicketCategory {
    /// Categories that pass through the reviewer desk before routing.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Complaint | Self::Compliment | Self::Suggestion)
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inquiry => write!(f, "Inquiry"),
            Self::Complaint => write!(f, "Complaint"),
            Self::Compliment => write!(f, "Compliment"),
            Self::Suggestion => write!(f, "Suggestion"),
        }
    }
}

impl std::str::FromStr for TicketCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inquiry" => Ok(Self::Inquiry),
            "complaint" => Ok(Self::Complaint),
            "compliment" => Ok(Self::Compliment),
            "suggestion" => Ok(Self::Suggestion),
            _ => Err(format!("Unknown ticket category: {}", s)),
        }
    }
}

/// Severity rating of a complaint. Monotonic: once `Minor` or `Major` is
/// recorded the rating is never changed, and complaint routing requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintRating {
    Unrated,
    Minor,
    Major,
}

impl ComplaintRating {
    pub fn is_rated(&self) -> bool {
        !matches!(self, Self::Unrated)
    }
}

impl Default for ComplaintRating {
    fn default() -> Self {
        Self::Unrated
    }
}

impl std::fmt::Display for ComplaintRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrated => write!(f, "Unrated"),
            Self::Minor => write!(f, "Minor"),
            Self::Major => write!(f, "Major"),
        }
    }
}

impl std::str::FromStr for ComplaintRating {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unrated" | "" => Ok(Self::Unrated),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => Err(format!("Unknown complaint rating: {}", s)),
        }
    }
}

// ============================================================================
// ROLES
// ============================================================================

/// Workflow roles. The resolver keys its candidate-action table on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Agent,
    Attendee,
    FocalPerson,
    ClaimFocalPerson,
    ComplianceFocalPerson,
    HeadOfUnit,
    Supervisor,
    Manager,
    Director,
    DirectorGeneral,
    Reviewer,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Self::Agent,
        Self::Attendee,
        Self::FocalPerson,
        Self::ClaimFocalPerson,
        Self::ComplianceFocalPerson,
        Self::HeadOfUnit,
        Self::Supervisor,
        Self::Manager,
        Self::Director,
        Self::DirectorGeneral,
        Self::Reviewer,
    ];

    /// The focal-person family shares assignment and reversal rules.
    pub fn is_focal(&self) -> bool {
        matches!(
            self,
            Self::FocalPerson | Self::ClaimFocalPerson | Self::ComplianceFocalPerson
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Attendee => write!(f, "attendee"),
            Self::FocalPerson => write!(f, "focal-person"),
            Self::ClaimFocalPerson => write!(f, "claim-focal-person"),
            Self::ComplianceFocalPerson => write!(f, "compliance-focal-person"),
            Self::HeadOfUnit => write!(f, "head-of-unit"),
            Self::Supervisor => write!(f, "supervisor"),
            Self::Manager => write!(f, "manager"),
            Self::Director => write!(f, "director"),
            Self::DirectorGeneral => write!(f, "director-general"),
            Self::Reviewer => write!(f, "reviewer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "agent" => Ok(Self::Agent),
            "attendee" => Ok(Self::Attendee),
            "focal-person" => Ok(Self::FocalPerson),
            "claim-focal-person" => Ok(Self::ClaimFocalPerson),
            "compliance-focal-person" => Ok(Self::ComplianceFocalPerson),
            "head-of-unit" => Ok(Self::HeadOfUnit),
            "supervisor" => Ok(Self::Supervisor),
            "manager" => Ok(Self::Manager),
            "director" => Ok(Self::Director),
            "director-general" => Ok(Self::DirectorGeneral),
            "reviewer" => Ok(Self::Reviewer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// ============================================================================
// EVENT ACTIONS
// ============================================================================

/// Action recorded on one assignment-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Created,
    Assigned,
    Reassigned,
    Reversed,
    Forwarded,
    Escalated,
    Closed,
    Rated,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Assigned => write!(f, "Assigned"),
            Self::Reassigned => write!(f, "Reassigned"),
            Self::Reversed => write!(f, "Reversed"),
            Self::Forwarded => write!(f, "Forwarded"),
            Self::Escalated => write!(f, "Escalated"),
            Self::Closed => write!(f, "Closed"),
            Self::Rated => write!(f, "Rated"),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// The complaint/inquiry record. At most one current assignee at any time;
/// history lives in `AssignmentEvent` rows and is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// Human-facing code, e.g. `TKT-000042`.
    pub ticket_id: String,
    pub category: TicketCategory,
    pub complaint_type: ComplaintRating,
    pub section: Option<String>,
    pub sub_section: Option<String>,
    pub responsible_unit_name: Option<String>,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub assigned_to_role: Option<Role>,
    pub status: TicketStatus,
    pub description: String,
    pub resolution_details: Option<String>,
    pub resolution_type: Option<String>,
    pub attachment_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub date_of_resolution: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
        self.assigned_to_id == Some(user_id)
    }

    /// Closed, or already carrying a resolution stamp.
    pub fn is_settled(&self) -> bool {
        self.status.is_closed() || self.date_of_resolution.is_some()
    }
}

/// One row per workflow transition, immutable once written.
///
/// `created_at` is optional: malformed upstream dates are tolerated and the
/// projection renders them as "Date not available" instead of dropping the
/// row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub action: EventAction,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub assigned_to_role: Option<Role>,
    pub assigned_by_id: Option<Uuid>,
    pub assigned_by_role: Option<Role>,
    /// Free-text message attached by the sender of the transition.
    pub reason: Option<String>,
    /// Owned by the actor who sent it; never inferred from neighbors.
    pub attachment_path: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Identity of whoever is acting on a ticket, threaded explicitly into every
/// engine call. No ambient session lookups happen inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_section: Option<String>,
}

/// Target of an assign/reassign transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignee {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

/// Payload for opening a new ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub category: TicketCategory,
    pub description: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub sub_section: Option<String>,
    #[serde(default)]
    pub responsible_unit_name: Option<String>,
    #[serde(default)]
    pub attachment_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_display_round_trip() {
        for status in TicketStatus::ALL {
            let parsed = TicketStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn role_display_round_trip() {
        for role in Role::ALL {
            let parsed = Role::from_str(&role.to_string()).unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(
            TicketCategory::from_str("COMPLAINT").unwrap(),
            TicketCategory::Complaint
        );
        assert!(TicketCategory::from_str("grievance").is_err());
    }

    #[test]
    fn focal_family_is_grouped() {
        assert!(Role::ClaimFocalPerson.is_focal());
        assert!(Role::ComplianceFocalPerson.is_focal());
        assert!(!Role::HeadOfUnit.is_focal());
    }
}
