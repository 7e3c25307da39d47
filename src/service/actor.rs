use crate::domain::{Error, UserId};

/// Who is making a request.
///
/// Supplied by the caller's auth layer on every call. The marketplace never
/// looks up or validates credentials itself; it trusts the identity it is
/// given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// No authenticated session.
    Anonymous,
    /// An authenticated user.
    User {
        /// Stable identifier from the auth provider.
        id: UserId,
        /// Display name, shown to creators alongside applications.
        name: String,
    },
}

impl Actor {
    /// An authenticated user.
    #[must_use]
    pub fn user(id: UserId, name: impl Into<String>) -> Self {
        Self::User {
            id,
            name: name.into(),
        }
    }

    /// The user id, if authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::User { id, .. } => Some(id),
        }
    }

    /// The display name, falling back to the user id when blank.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { id, name } if name.trim().is_empty() => Some(id.as_str()),
            Self::User { name, .. } => Some(name.trim()),
        }
    }

    /// The user id, or [`Error::Unauthorized`] for anonymous callers.
    pub(crate) fn require(&self, action: &'static str) -> Result<&UserId, Error> {
        self.user_id().ok_or(Error::Unauthorized { action })
    }
}

impl From<UserId> for Actor {
    fn from(id: UserId) -> Self {
        let name = id.to_string();
        Self::User { id, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[test]
    fn anonymous_actors_are_refused() {
        let err = Actor::Anonymous.require("apply").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_string(), "not authorized to apply");
    }

    #[test]
    fn blank_display_name_falls_back_to_id() {
        let actor = Actor::user(UserId::new("u-17").unwrap(), "  ");
        assert_eq!(actor.display_name(), Some("u-17"));

        let actor = Actor::user(UserId::new("u-17").unwrap(), " Sam ");
        assert_eq!(actor.display_name(), Some("Sam"));
    }
}
