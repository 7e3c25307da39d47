//! Domain models for collaboration matching.
//!
//! This module contains the core domain types: collaborations and the role
//! slots they need filled, applications to those slots, the rules deciding
//! who may apply and who may decide, and the in-memory ledger that enforces
//! them.

mod application;
pub use application::{normalize_message, Application, ApplicationStatus, Decision};

/// The collaboration aggregate and its derived, read-only status.
pub mod collaboration;
pub use collaboration::{
    derive_progress, is_fully_staffed, Collaboration, CollaborationStatus, NewCollaboration,
};

mod config;
pub use config::{Config, PendingPolicy};

mod error;
pub use error::{Entity, Error, ErrorKind};

mod id;
pub use id::{ApplicationId, CollaborationId, InvalidUserIdError, RequirementId, UserId};

mod ledger;
pub use ledger::{CloseOutcome, Ledger};

/// Eligibility rules shared by every caller.
pub mod matching;
pub use matching::{can_apply, can_decide};

mod requirement;
pub use requirement::{Requirement, RequirementSpec, RequirementStatus};
