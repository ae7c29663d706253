//! Group Custom Resource Definition
//!
//! A Group names a reusable set of endpoints that policies reference by
//! name instead of repeating selectors. A Group is defined either by
//! selectors, by concrete IP blocks, or by a Service reference. Membership
//! is computed asynchronously; the status reports when that has happened.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::policy::{IpBlockSpec, NamespacedName};
use super::ConditionStatus;

/// Specification for a Group
///
/// Exactly one of the definition forms (selectors, ipBlocks,
/// serviceReference, childGroups) is expected; upstream admission
/// validation rejects combinations.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.io",
    version = "v1alpha1",
    kind = "Group",
    plural = "groups",
    status = "GroupStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    /// Select pods by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Select namespaces by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Select external entities by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_entity_selector: Option<LabelSelector>,

    /// Concrete IP ranges this group resolves to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_blocks: Vec<IpBlockSpec>,

    /// Define the group as the backends of a Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_reference: Option<NamespacedName>,

    /// Compose this group from other groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_groups: Vec<String>,
}

/// Status for a Group
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    /// Conditions representing the group state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<GroupCondition>,
}

/// Condition types reported for a Group
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum GroupConditionType {
    /// Membership computation has run for this group
    GroupMembersComputed,
}

/// A condition in a Group status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: GroupConditionType,

    /// Whether the condition holds
    #[serde(default)]
    pub status: ConditionStatus,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}
