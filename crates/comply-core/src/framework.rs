//! # Framework Vocabulary
//!
//! Classification enums for regulatory frameworks and the ordered
//! topic → component → clause hierarchy of compliance frameworks.

use serde::{Deserialize, Serialize};

/// Kind of compliance framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameworkType {
    /// Law or regulation (GDPR, HIPAA).
    Regulatory,
    /// Published standard (ISO 27001, SOC 2).
    Standard,
    /// Industry scheme (PCI DSS).
    Industry,
    /// Internal policy set.
    Internal,
    /// Anything else defined by the operator.
    Custom,
}

impl FrameworkType {
    /// Return the wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulatory => "REGULATORY",
            Self::Standard => "STANDARD",
            Self::Industry => "INDUSTRY",
            Self::Internal => "INTERNAL",
            Self::Custom => "CUSTOM",
        }
    }
}

/// How a requirement in one framework relates to a requirement in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingRelationship {
    /// Satisfying one satisfies the other.
    Equivalent,
    /// The source requirement covers part of the target.
    Subset,
    /// The source requirement covers all of the target and more.
    Superset,
    /// Topically related, no coverage claim.
    Related,
}

/// Inherent risk attached to a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Medium
    }
}

/// Order index for a new child appended after `existing` siblings.
///
/// Returns `max(existing) + 1`, or `1` when there are no siblings.
pub fn next_order_index(existing: impl IntoIterator<Item = i32>) -> i32 {
    existing
        .into_iter()
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_child_gets_index_one() {
        assert_eq!(next_order_index(Vec::<i32>::new()), 1);
    }

    #[test]
    fn appends_after_max_even_with_gaps() {
        assert_eq!(next_order_index(vec![1, 7, 3]), 8);
    }

    #[test]
    fn framework_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&FrameworkType::Regulatory).unwrap(),
            "\"REGULATORY\""
        );
        let parsed: FrameworkType = serde_json::from_str("\"INDUSTRY\"").unwrap();
        assert_eq!(parsed, FrameworkType::Industry);
        assert_eq!(parsed.as_str(), "INDUSTRY");
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::default(), RiskLevel::Medium);
    }

    proptest::proptest! {
        #[test]
        fn next_index_exceeds_every_sibling(indices in proptest::collection::vec(-1000i32..1000, 0..50)) {
            let next = next_order_index(indices.clone());
            for i in indices {
                proptest::prop_assert!(next > i);
            }
        }
    }
}
