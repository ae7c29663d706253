//! Tier Custom Resource Definition
//!
//! Tiers are ordered evaluation buckets for policies. A policy names its
//! tier; the controller resolves that name to the tier's numeric priority.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Tier
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.io",
    version = "v1alpha1",
    kind = "Tier",
    plural = "tiers",
    printcolumn = r#"{"name":"Priority","type":"integer","jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TierSpec {
    /// Evaluation priority of this tier (lower evaluates first)
    pub priority: i32,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_spec_roundtrip() {
        let spec = TierSpec {
            priority: 50,
            description: Some("security operations".to_string()),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: TierSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
