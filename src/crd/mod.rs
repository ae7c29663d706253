//! Custom Resource Definitions for Weft
//!
//! This module contains the policy-facing CRD types: tiered network
//! policies, the tiers they reference, and the reusable groups their peers
//! may point at.

mod group;
mod policy;
mod tier;

pub use group::{Group, GroupCondition, GroupConditionType, GroupSpec, GroupStatus};
pub use policy::{
    AppliedTo, IcmpProtocol, IgmpProtocol, IpBlockSpec, NamespacedName, NetworkPolicy,
    NetworkPolicyPort, NetworkPolicyProtocol, NetworkPolicySpec, PolicyCondition, PolicyPeer,
    PolicyPhase, PolicyStatus, Rule, RuleAction, SelectorPeer,
};
pub use tier::{Tier, TierSpec};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition (mirrors Kubernetes condition conventions)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition state cannot be determined
    #[default]
    Unknown,
}
