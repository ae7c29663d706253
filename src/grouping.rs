//! Interfaces to external collaborators
//!
//! The translation core never computes group membership, schedules retries,
//! or publishes to enforcement agents; it only notifies the subsystems that
//! do. These traits are the boundary. They can be mocked in tests to
//! observe exactly which notifications a translation produced.

use crate::crd::Tier;
use crate::Result;

#[cfg(test)]
use mockall::automock;

/// The kind of group object a membership operation refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupType {
    /// A peer-facing AddressGroup
    AddressGroup,
    /// A workload-facing AppliedToGroup
    AppliedToGroup,
    /// A source-of-truth internal Group
    InternalGroup,
}

/// Interface to the membership-computation subsystem
///
/// Enqueueing is fire-and-forget: computation happens asynchronously on a
/// per-key work queue owned by the callee.
#[cfg_attr(test, automock)]
pub trait GroupMembership: Send + Sync {
    /// Remove a group's node from the membership-computation graph
    fn delete_group(&self, group_type: GroupType, key: &str);

    /// Schedule asynchronous membership computation for a group
    fn enqueue_membership(&self, group_type: GroupType, key: &str);
}

/// Interface for re-triggering synchronization of objects that may
/// reference a group whose definition changed
#[cfg_attr(test, automock)]
pub trait PolicyTriggers: Send + Sync {
    /// Re-sync namespaced NetworkPolicies referencing the group
    fn trigger_network_policy_updates(&self, key: &str);

    /// Re-sync ClusterNetworkPolicies referencing the group
    fn trigger_cluster_policy_updates(&self, key: &str);

    /// Re-sync parent groups composed from this group
    fn trigger_parent_group_sync(&self, key: &str);
}

/// Interface to the tier store
#[cfg_attr(test, automock)]
pub trait TierLookup: Send + Sync {
    /// Fetch a Tier by name
    fn get_tier(&self, name: &str) -> Result<Tier>;
}
