//! Capability-based permission system
//!
//! Submitted code gets the grants its pipeline was built with and nothing
//! else. A set is assembled once with the builder methods and is read-only
//! from then on: there is no way to add a grant through a shared reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A sensitive operation that compiled code may be allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Call a `private` method declared in another class
    AccessPrivateMembers,
    /// Block the worker with `Thread.sleep`
    SuspendThread,
    /// Read host environment variables with `System.getenv`
    ReadEnvironment,
    /// End the program early with `System.exit`
    ExitProcess,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::AccessPrivateMembers => "access-private-members",
            Capability::SuspendThread => "suspend-thread",
            Capability::ReadEnvironment => "read-environment",
            Capability::ExitProcess => "exit-process",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The grants handed to every backend of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// An empty set: nothing sensitive is permitted
    pub fn new() -> Self {
        Self::default()
    }

    /// What a pipeline grants unless configured otherwise
    pub fn standard() -> Self {
        Self::new()
            .with(Capability::AccessPrivateMembers)
            .with(Capability::SuspendThread)
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.capabilities.insert(cap);
        self
    }

    /// Check if a capability is granted
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Fail with [`CapabilityDenied`] unless `cap` is granted
    pub fn require(&self, cap: Capability) -> Result<(), CapabilityDenied> {
        if self.has(cap) {
            Ok(())
        } else {
            Err(CapabilityDenied(cap))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} not permitted")]
pub struct CapabilityDenied(pub Capability);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_grants() {
        let caps = CapabilitySet::standard();
        assert!(caps.has(Capability::AccessPrivateMembers));
        assert!(caps.has(Capability::SuspendThread));
        assert!(!caps.has(Capability::ExitProcess));
        assert!(!caps.has(Capability::ReadEnvironment));
    }

    #[test]
    fn test_require() {
        let caps = CapabilitySet::new().with(Capability::ExitProcess);
        assert!(caps.require(Capability::ExitProcess).is_ok());
        let denied = caps.require(Capability::ReadEnvironment).unwrap_err();
        assert_eq!(denied.to_string(), "read-environment not permitted");
    }

    #[test]
    fn test_display_matches_serde_name() {
        let cap = Capability::AccessPrivateMembers;
        assert_eq!(serde_json::to_string(&cap).unwrap(), format!("\"{cap}\""));
        assert!(serde_json::from_str::<Capability>("\"load-everything\"").is_err());
    }

    #[test]
    fn test_serde_uses_kebab_names() {
        let caps: CapabilitySet =
            serde_json::from_str(r#"["exit-process", "suspend-thread"]"#).unwrap();
        assert_eq!(caps, CapabilitySet::new().with(Capability::SuspendThread).with(Capability::ExitProcess));
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["suspend-thread","exit-process"]"#);
    }
}
