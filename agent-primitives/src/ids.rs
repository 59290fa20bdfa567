//! Instance handle type.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Opaque identity token for a live agent implementation.
///
/// Tool records point back at their owning agent through this handle instead of
/// holding a reference to the agent object, so the registry never owns agent
/// instances and no reference cycle can form.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceHandle(Uuid);

impl InstanceHandle {
    /// Generates a fresh handle.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a handle from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for InstanceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for InstanceHandle {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for InstanceHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self::from_uuid(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_displayed_handle() {
        let handle = InstanceHandle::random();
        let parsed = handle.to_string().parse::<InstanceHandle>().expect("parse");
        assert_eq!(handle, parsed);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-handle".parse::<InstanceHandle>().expect_err("should fail");
        assert!(matches!(err, Error::InvalidHandle { .. }));
    }

    #[test]
    fn random_handles_differ() {
        assert_ne!(InstanceHandle::random(), InstanceHandle::random());
    }
}
