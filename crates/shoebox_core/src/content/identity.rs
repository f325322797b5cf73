//! Entity identity.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a persisted entity.
///
/// Every entity has a device-local id allocated at creation. A server id is
/// attached once the server acknowledges the entity and never changes
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// Known only on this device.
    Local {
        /// Device-unique id.
        local_id: i64,
    },
    /// Known to the server as well.
    Synced {
        /// Device-unique id.
        local_id: i64,
        /// Globally unique server id.
        server_id: String,
    },
}

impl Identity {
    /// Creates a local-only identity.
    #[must_use]
    pub const fn local(local_id: i64) -> Self {
        Self::Local { local_id }
    }

    /// Returns the local id.
    #[must_use]
    pub fn local_id(&self) -> i64 {
        match self {
            Self::Local { local_id } | Self::Synced { local_id, .. } => *local_id,
        }
    }

    /// Returns the server id, if assigned.
    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Local { .. } => None,
            Self::Synced { server_id, .. } => Some(server_id),
        }
    }

    /// Attaches a server id, keeping the local id.
    ///
    /// Replacing an existing server id is allowed here but rejected when the
    /// entity is saved.
    pub fn assign_server_id(&mut self, server_id: impl Into<String>) {
        *self = Self::Synced {
            local_id: self.local_id(),
            server_id: server_id.into(),
        };
    }

    /// Checks that `current` is a legal successor of `saved`.
    ///
    /// Returns `true` when the server id was assigned since `saved`.
    ///
    /// # Errors
    ///
    /// `InvalidIdentityTransition` if the local id changed, or the server id
    /// was removed or replaced.
    pub fn transition(saved: &Identity, current: &Identity) -> CoreResult<bool> {
        let invalid = || CoreError::InvalidIdentityTransition {
            from: saved.to_string(),
            to: current.to_string(),
        };
        if saved.local_id() != current.local_id() {
            return Err(invalid());
        }
        match (saved.server_id(), current.server_id()) {
            (None, None) => Ok(false),
            (None, Some(_)) => Ok(true),
            (Some(old), Some(new)) if old == new => Ok(false),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { local_id } => write!(f, "local:{local_id}"),
            Self::Synced {
                local_id,
                server_id,
            } => write!(f, "local:{local_id}/server:{server_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(local_id: i64, server_id: &str) -> Identity {
        Identity::Synced {
            local_id,
            server_id: server_id.into(),
        }
    }

    #[test]
    fn first_assignment_is_reported() {
        let saved = Identity::local(3);
        let mut current = saved.clone();
        current.assign_server_id("srv-3");
        assert!(Identity::transition(&saved, &current).unwrap());
        assert_eq!(current.server_id(), Some("srv-3"));
        assert_eq!(current.local_id(), 3);
    }

    #[test]
    fn unchanged_identities_pass() {
        assert!(!Identity::transition(&Identity::local(1), &Identity::local(1)).unwrap());
        assert!(!Identity::transition(&synced(1, "a"), &synced(1, "a")).unwrap());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let cases = [
            (Identity::local(1), Identity::local(2)),
            (synced(1, "a"), Identity::local(1)),
            (synced(1, "a"), synced(1, "b")),
            (Identity::local(1), synced(2, "a")),
        ];
        for (saved, current) in cases {
            assert!(matches!(
                Identity::transition(&saved, &current),
                Err(CoreError::InvalidIdentityTransition { .. })
            ));
        }
    }

    #[test]
    fn display_forms() {
        assert_eq!(Identity::local(7).to_string(), "local:7");
        assert_eq!(synced(7, "x").to_string(), "local:7/server:x");
    }
}
