//! Organization membership roles and compliance selection settings.

use serde::{Deserialize, Serialize};

/// A user's role within one organization.
///
/// Declaration order gives `MEMBER < ADMIN < OWNER`, so role checks are a
/// single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    /// Can read organization data and contribute drafts.
    Member,
    /// Can review, delete, and manage selections.
    Admin,
    /// Full control of the organization.
    Owner,
}

impl OrgRole {
    /// Return the wire name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
        }
    }
}

impl Default for OrgRole {
    fn default() -> Self {
        Self::Member
    }
}

/// How much residual risk the organization accepts for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTolerance {
    /// Little residual risk accepted.
    Low,
    /// Moderate residual risk accepted.
    Medium,
    /// Substantial residual risk accepted.
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_roles_are_ordered() {
        assert!(OrgRole::Member < OrgRole::Admin);
        assert!(OrgRole::Admin < OrgRole::Owner);
        assert_eq!(OrgRole::Owner.as_str(), "OWNER");
    }

    #[test]
    fn risk_tolerance_parses_wire_name() {
        let t: RiskTolerance = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(t, RiskTolerance::High);
    }
}
