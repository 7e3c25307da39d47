use std::fmt;

use serde::Serialize;

use crate::{
    domain::{ApplicationId, ApplicationStatus, CollaborationId, CollaborationStatus, RequirementId},
    storage::StoreError,
};

/// The entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A collaboration project.
    Collaboration(CollaborationId),
    /// A role slot within a collaboration.
    Requirement(RequirementId),
    /// An application against a requirement.
    Application(ApplicationId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collaboration(id) => write!(f, "collaboration {id}"),
            Self::Requirement(id) => write!(f, "requirement {id}"),
            Self::Application(id) => write!(f, "application {id}"),
        }
    }
}

/// Errors raised by matching and application operations.
///
/// Every variant is recoverable. An operation that returns an error has left
/// the ledger exactly as it found it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input, such as a zero quantity or a blank title.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending input field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The requirement is no longer accepting applications.
    #[error("requirement {0} is closed")]
    RequirementClosed(RequirementId),

    /// Every slot on the requirement is already filled.
    #[error("requirement {requirement} has no open slots ({quantity_needed} of {quantity_needed} filled)")]
    CapacityExceeded {
        /// The full requirement.
        requirement: RequirementId,
        /// Its capacity.
        quantity_needed: u32,
    },

    /// The applicant already has a pending or accepted application.
    #[error("an application for requirement {requirement} is already {status}")]
    DuplicateApplication {
        /// The requirement applied to.
        requirement: RequirementId,
        /// The existing application.
        existing: ApplicationId,
        /// Status of the existing application.
        status: ApplicationStatus,
    },

    /// The application message was empty after trimming.
    #[error("application message must not be empty")]
    EmptyMessage,

    /// The acting user may not perform this action.
    #[error("not authorized to {action}")]
    Unauthorized {
        /// The action that was refused.
        action: &'static str,
    },

    /// The application has already been accepted or rejected.
    #[error("application {application} has already been {status}")]
    AlreadyDecided {
        /// The decided application.
        application: ApplicationId,
        /// Its terminal status.
        status: ApplicationStatus,
    },

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(Entity),

    /// The collaboration has been completed or cancelled.
    #[error("collaboration {collaboration} is {status}")]
    CollaborationInactive {
        /// The collaboration.
        collaboration: CollaborationId,
        /// Its current, non-active status.
        status: CollaborationStatus,
    },

    /// The change could not be persisted and was not applied.
    #[error("failed to persist change")]
    Storage(#[from] StoreError),
}

/// A field-free discriminant of [`Error`].
///
/// Callers match on this to choose user-facing text without depending on the
/// payload of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`Error::Validation`].
    Validation,
    /// See [`Error::RequirementClosed`].
    RequirementClosed,
    /// See [`Error::CapacityExceeded`].
    CapacityExceeded,
    /// See [`Error::DuplicateApplication`].
    DuplicateApplication,
    /// See [`Error::EmptyMessage`].
    EmptyMessage,
    /// See [`Error::Unauthorized`].
    Unauthorized,
    /// See [`Error::AlreadyDecided`].
    AlreadyDecided,
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::CollaborationInactive`].
    CollaborationInactive,
    /// See [`Error::Storage`].
    Storage,
}

impl Error {
    /// The kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RequirementClosed(_) => ErrorKind::RequirementClosed,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::DuplicateApplication { .. } => ErrorKind::DuplicateApplication,
            Self::EmptyMessage => ErrorKind::EmptyMessage,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::AlreadyDecided { .. } => ErrorKind::AlreadyDecided,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::CollaborationInactive { .. } => ErrorKind::CollaborationInactive,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl ErrorKind {
    /// A short message suitable for showing to an end user.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Validation => "Some of the details you entered are not valid.",
            Self::RequirementClosed => "This role is no longer accepting applications.",
            Self::CapacityExceeded => "All slots for this role have already been filled.",
            Self::DuplicateApplication => "You have already applied for this role.",
            Self::EmptyMessage => "Please include a message with your application.",
            Self::Unauthorized => "You are not allowed to do that.",
            Self::AlreadyDecided => "This application has already been decided.",
            Self::NotFound => "We couldn't find what you were looking for.",
            Self::CollaborationInactive => "This project is no longer active.",
            Self::Storage => "Something went wrong saving your change. Please try again.",
        }
    }
}
