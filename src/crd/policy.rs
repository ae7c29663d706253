//! NetworkPolicy Custom Resource Definition
//!
//! A Weft NetworkPolicy expresses ordered allow/drop rules between peers.
//! Each peer is one of a small set of mutually-exclusive forms: an IP block,
//! a reference to a shared Group, an FQDN, a service account, a node
//! selector, or a pod/namespace/external-entity selector combination. The
//! mutual exclusivity is enforced by construction: [`PolicyPeer`] is a sum
//! type, so a peer with two forms populated is unrepresentable.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConditionStatus;

/// Specification for a NetworkPolicy
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.io",
    version = "v1alpha1",
    kind = "NetworkPolicy",
    plural = "networkpolicies",
    shortname = "wnp",
    status = "PolicyStatus",
    namespaced,
    printcolumn = r#"{"name":"Tier","type":"string","jsonPath":".spec.tier"}"#,
    printcolumn = r#"{"name":"Priority","type":"number","jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Tier this policy evaluates in; empty means the Application tier
    #[serde(default)]
    pub tier: String,

    /// Relative order within the tier (lower evaluates first)
    #[serde(default)]
    pub priority: f64,

    /// Workloads this policy applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_to: Vec<AppliedTo>,

    /// Ordered ingress rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<Rule>,

    /// Ordered egress rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<Rule>,
}

/// Scope selector for the workloads a policy applies to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTo {
    /// Select pods in the policy's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Reference a shared Group by name instead of selecting directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Apply to the backends of a Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<NamespacedName>,
}

/// A single policy rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Action taken on matching traffic
    #[serde(default)]
    pub action: RuleAction,

    /// Optional rule name for status reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port/protocol descriptors matched by this rule
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,

    /// ICMP/IGMP protocol descriptors matched by this rule
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<NetworkPolicyProtocol>,

    /// Traffic sources (ingress rules)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<PolicyPeer>,

    /// Traffic destinations (egress rules)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<PolicyPeer>,

    /// Destination Services (egress rules); empty namespace defaults to the
    /// policy's namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_services: Vec<NamespacedName>,
}

/// Action applied to traffic matching a rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RuleAction {
    /// Allow the traffic
    #[default]
    Allow,
    /// Silently drop the traffic
    Drop,
    /// Reject the traffic with a signal to the sender
    Reject,
    /// Skip remaining rules in this tier and defer to the next
    Pass,
}

/// One entry in a rule describing a set of sources or destinations
///
/// Exactly one form per peer, by construction.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum PolicyPeer {
    /// An IP range in CIDR notation
    IpBlock(IpBlockSpec),
    /// A reference to a shared Group by name
    Group(String),
    /// A fully-qualified domain name, resolved to addresses asynchronously
    Fqdn(String),
    /// All pods running as a service account
    ServiceAccount(NamespacedName),
    /// Nodes matching a label selector (cluster-scoped)
    NodeSelector(LabelSelector),
    /// A pod/namespace/external-entity selector combination
    Selectors(SelectorPeer),
}

/// CIDR form of a peer
///
/// The CRD form carries no except list; exclusions are expressed as
/// separate higher-priority rules.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpBlockSpec {
    /// The IP range in CIDR notation, e.g. "10.0.0.0/8"
    pub cidr: String,
}

/// Selector combination form of a peer
///
/// Scoped to the policy's namespace unless a namespace selector is present.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorPeer {
    /// Select pods by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Select namespaces by label; widens scope beyond the policy namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Select external entities by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_entity_selector: Option<LabelSelector>,
}

/// A namespace/name pair referencing another object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NamespacedName {
    /// Namespace of the referenced object; may be empty where a default applies
    #[serde(default)]
    pub namespace: String,
    /// Name of the referenced object
    pub name: String,
}

/// A port/protocol descriptor within a rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyPort {
    /// Transport protocol; defaults to TCP when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<crate::controlplane::Protocol>,

    /// Port by number or by name; a named port requires endpoint resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<IntOrString>,

    /// Inclusive end of a port range starting at `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_port: Option<i32>,
}

/// An ICMP or IGMP descriptor within a rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyProtocol {
    /// ICMP matching criteria
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp: Option<IcmpProtocol>,

    /// IGMP matching criteria
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub igmp: Option<IgmpProtocol>,
}

/// ICMP matching criteria
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IcmpProtocol {
    /// ICMP type to match; all types when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_type: Option<i32>,
    /// ICMP code to match; all codes when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_code: Option<i32>,
}

/// IGMP matching criteria
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IgmpProtocol {
    /// IGMP type to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub igmp_type: Option<i32>,
    /// Multicast group address to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_address: Option<String>,
}

/// Status for a NetworkPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    /// Realization phase across enforcement nodes
    #[serde(default)]
    pub phase: PolicyPhase,

    /// Generation observed by the controller
    #[serde(default)]
    pub observed_generation: i64,

    /// Number of nodes that have realized the policy
    #[serde(default)]
    pub current_nodes_realized: i32,

    /// Number of nodes that should realize the policy
    #[serde(default)]
    pub desired_nodes_realized: i32,

    /// Conditions representing the policy state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PolicyCondition>,
}

/// Realization phase of a NetworkPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PolicyPhase {
    /// The policy has not been processed yet
    #[default]
    Pending,
    /// The policy is being realized on enforcement nodes
    Realizing,
    /// All enforcement nodes have realized the policy
    Realized,
}

/// A condition in a NetworkPolicy status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCondition {
    /// Condition type, e.g. "Realizable"
    #[serde(rename = "type")]
    pub type_: String,

    /// Whether the condition holds
    #[serde(default)]
    pub status: ConditionStatus,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
