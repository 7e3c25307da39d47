//! Role-slot matching for creative collaborations
//!
//! Creators post collaborations made up of requirements (role slots with a
//! capacity), users apply to fill them, and creators accept or reject each
//! application. Accepting fills a slot; a requirement closes when its last
//! slot is filled.

pub mod domain;
pub use domain::{
    Application, ApplicationStatus, Collaboration, CollaborationStatus, Config, Decision, Error,
    ErrorKind, NewCollaboration, Requirement, RequirementSpec, UserId,
};

/// Persistence of collaborations and their applications.
pub mod storage;
pub use storage::{Directory, MemoryStore, Store};

pub mod service;
pub use service::{Actor, Marketplace};
