//! The policy translation core
//!
//! This module turns CRD-form policy rules into the canonical objects the
//! enforcement layer consumes:
//!
//! - port/protocol descriptors become [`Service`] entries plus a named-port
//!   flag ([`to_services`])
//! - tier names become numeric priorities ([`PolicyController::get_tier_priority`])
//! - peer lists become one [`CanonicalPeer`] per rule, with selector
//!   combinations collapsed into shared, content-addressed group keys
//!   ([`PolicyController::to_peer`])
//! - internal group changes fan out to every dependent object
//!   ([`PolicyController::sync_internal_group`])
//!
//! Failures are peer-local: a malformed CIDR or unresolvable group drops
//! that peer (with a log) and translation continues. Upstream admission
//! validation is expected to have rejected truly invalid input, so errors
//! here are operational edge cases, not user-facing validation failures.

use ipnetwork::IpNetwork;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, error, warn};

use crate::controlplane::{
    group_key_for, namespaced_name, AddressGroup, AppliedToGroup, CanonicalPeer, Direction, Group,
    IpBlock, Protocol, Service, ServiceReference,
};
use crate::crd::{
    AppliedTo, GroupCondition, GroupConditionType, GroupSpec, IpBlockSpec, NamespacedName,
    NetworkPolicyPort, NetworkPolicyProtocol, PolicyCondition, PolicyStatus, Rule,
};
use crate::grouping::{GroupMembership, GroupType, PolicyTriggers, TierLookup};
use crate::selector::{normalized_key, service_account_pod_selector, GroupSelector};
use crate::store::GroupStore;
use crate::{Error, Result, DEFAULT_TIER_PRIORITY, STATIC_TIER_NAMES};

/// The canonical output of translating one policy rule
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedRule {
    /// Service entries, input order preserved, ports before protocols
    pub services: Vec<Service>,
    /// True if any port descriptor used a named port
    pub named_port_exists: bool,
    /// The rule's canonical peer record
    pub peer: CanonicalPeer,
}

/// The translation controller
///
/// Owns the derived group stores and the internal group store, and talks to
/// membership computation, tier lookup, and policy re-triggering through
/// their interfaces. All operations are synchronous local store work; the
/// per-key work queue driving reconciliation lives outside this type.
pub struct PolicyController<T, M, P> {
    tiers: T,
    membership: M,
    triggers: P,
    address_groups: GroupStore<AddressGroup>,
    applied_to_groups: GroupStore<AppliedToGroup>,
    internal_groups: GroupStore<Group>,
}

// =============================================================================
// Service Translator
// =============================================================================

/// Convert a rule's port and protocol descriptors to canonical service
/// entries.
///
/// One entry per descriptor, input order preserved, ports before
/// protocols, no deduplication. The returned flag is true when any port is
/// given by name rather than number; named ports can only be resolved
/// against endpoint metadata, which changes how empty egress peer lists are
/// translated.
pub fn to_services(
    ports: &[NetworkPolicyPort],
    protocols: &[NetworkPolicyProtocol],
) -> (Vec<Service>, bool) {
    let mut services = Vec::new();
    let mut named_port_exists = false;
    for port in ports {
        if matches!(port.port, Some(IntOrString::String(_))) {
            named_port_exists = true;
        }
        services.push(Service {
            protocol: Some(port.protocol.unwrap_or_default()),
            port: port.port.clone(),
            end_port: port.end_port,
            ..Service::default()
        });
    }
    for protocol in protocols {
        if let Some(icmp) = &protocol.icmp {
            services.push(Service {
                protocol: Some(Protocol::Icmp),
                icmp_type: icmp.icmp_type,
                icmp_code: icmp.icmp_code,
                ..Service::default()
            });
        }
        if let Some(igmp) = &protocol.igmp {
            services.push(Service {
                protocol: Some(Protocol::Igmp),
                igmp_type: igmp.igmp_type,
                group_address: igmp.group_address.clone(),
                ..Service::default()
            });
        }
    }
    (services, named_port_exists)
}

/// Parse a CRD IP block into its canonical form.
///
/// The CRD form carries no except list at this layer, so it defaults to
/// empty.
pub fn to_ip_block(block: &IpBlockSpec) -> Result<IpBlock> {
    let cidr: IpNetwork = block
        .cidr
        .parse()
        .map_err(|e| Error::invalid_cidr(format!("{}: {e}", block.cidr)))?;
    Ok(IpBlock {
        cidr,
        except: Vec::new(),
    })
}

// =============================================================================
// Status comparison
// =============================================================================

/// Compare two policy statuses for update suppression.
///
/// Conditions are compared pairwise disregarding the last-transition
/// timestamp, so a re-generated status with the same content does not cause
/// an update.
pub fn policy_status_equal(old: &PolicyStatus, new: &PolicyStatus) -> bool {
    old.phase == new.phase
        && old.observed_generation == new.observed_generation
        && old.current_nodes_realized == new.current_nodes_realized
        && old.desired_nodes_realized == new.desired_nodes_realized
        && old.conditions.len() == new.conditions.len()
        && old
            .conditions
            .iter()
            .zip(&new.conditions)
            .all(|(a, b)| policy_condition_equal(a, b))
}

fn policy_condition_equal(a: &PolicyCondition, b: &PolicyCondition) -> bool {
    a.type_ == b.type_ && a.status == b.status && a.reason == b.reason && a.message == b.message
}

/// Check whether a GroupMembersComputed condition with the same status
/// already exists in a condition list.
///
/// Existence, not positional equality: any matching entry anywhere in the
/// old list suppresses the update. Disregards the last-transition
/// timestamp.
pub fn group_members_computed_condition_equal(
    conditions: &[GroupCondition],
    condition: &GroupCondition,
) -> bool {
    conditions.iter().any(|c| {
        c.type_ == GroupConditionType::GroupMembersComputed && c.status == condition.status
    })
}

impl<T, M, P> PolicyController<T, M, P>
where
    T: TierLookup,
    M: GroupMembership,
    P: PolicyTriggers,
{
    /// Create a controller wired to its external collaborators
    pub fn new(tiers: T, membership: M, triggers: P) -> Self {
        Self {
            tiers,
            membership,
            triggers,
            address_groups: GroupStore::new(),
            applied_to_groups: GroupStore::new(),
            internal_groups: GroupStore::new(),
        }
    }

    /// The AddressGroup store, consumed by the publication layer
    pub fn address_groups(&self) -> &GroupStore<AddressGroup> {
        &self.address_groups
    }

    /// The AppliedToGroup store, consumed by the publication layer
    pub fn applied_to_groups(&self) -> &GroupStore<AppliedToGroup> {
        &self.applied_to_groups
    }

    /// The internal Group store
    pub fn internal_groups(&self) -> &GroupStore<Group> {
        &self.internal_groups
    }

    // =========================================================================
    // Tier Priority Resolver
    // =========================================================================

    /// Resolve a tier name to its numeric evaluation priority.
    ///
    /// An empty name means the lowest-priority Application tier. Legacy
    /// static-tier names are lower-cased to match the Tier resources they
    /// were converted to. A lookup miss falls back to the default priority;
    /// upstream validation already rejected invalid tier references, so a
    /// miss here is an operational inconsistency, not a policy error.
    pub fn get_tier_priority(&self, tier: &str) -> i32 {
        if tier.is_empty() {
            return DEFAULT_TIER_PRIORITY;
        }
        let name = if STATIC_TIER_NAMES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(tier))
        {
            tier.to_ascii_lowercase()
        } else {
            tier.to_string()
        };
        match self.tiers.get_tier(&name) {
            Ok(t) => t.spec.priority,
            Err(e) => {
                error!(tier = %tier, error = %e, "Failed to retrieve tier, using default priority");
                DEFAULT_TIER_PRIORITY
            }
        }
    }

    // =========================================================================
    // Group Identity Normalizer
    // =========================================================================

    /// Get or create the AddressGroup for a selector combination.
    ///
    /// The key is content-addressed: identical inputs produce identical
    /// keys regardless of call order. The first call for a key persists the
    /// group and schedules membership computation; later calls are no-ops.
    /// Returns an empty key when the selectors cannot be normalized;
    /// callers omit empty keys from their results.
    pub fn create_address_group(
        &self,
        namespace: &str,
        pod_selector: Option<LabelSelector>,
        namespace_selector: Option<LabelSelector>,
        external_entity_selector: Option<LabelSelector>,
        node_selector: Option<LabelSelector>,
    ) -> String {
        let selector = match GroupSelector::new(
            namespace,
            pod_selector,
            namespace_selector,
            external_entity_selector,
            node_selector,
        ) {
            Ok(selector) => selector,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Dropping group reference for malformed selector");
                return String::new();
            }
        };
        let key = normalized_key(&selector.normalized_name);
        let created = self.address_groups.get_or_create(&key, || AddressGroup {
            uid: key.clone(),
            name: key.clone(),
            selector: Some(selector),
        });
        if created {
            debug!(key = %key, "Created new AddressGroup for selector combination");
            self.membership
                .enqueue_membership(GroupType::AddressGroup, &key);
        }
        key
    }

    /// Get or create the AppliedToGroup for a selector combination.
    ///
    /// Same contract as [`Self::create_address_group`], for the
    /// workload-facing side of a policy.
    pub fn create_applied_to_group(
        &self,
        namespace: &str,
        pod_selector: Option<LabelSelector>,
        namespace_selector: Option<LabelSelector>,
        external_entity_selector: Option<LabelSelector>,
    ) -> String {
        let selector = match GroupSelector::new(
            namespace,
            pod_selector,
            namespace_selector,
            external_entity_selector,
            None,
        ) {
            Ok(selector) => selector,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Dropping applied-to scope for malformed selector");
                return String::new();
            }
        };
        let key = normalized_key(&selector.normalized_name);
        let created = self
            .applied_to_groups
            .get_or_create(&key, || AppliedToGroup {
                uid: key.clone(),
                name: key.clone(),
                selector: Some(selector),
                service: None,
            });
        if created {
            debug!(key = %key, "Created new AppliedToGroup for selector combination");
            self.membership
                .enqueue_membership(GroupType::AppliedToGroup, &key);
        }
        key
    }

    /// Get or create the AddressGroup derived from an internal Group.
    ///
    /// The derived group shares the internal group's key and UID; its
    /// membership is computed from the internal group, so no selector is
    /// attached and no membership computation is scheduled here. The
    /// internal group's sync refreshes the derived group. Returns an empty
    /// key when the group cannot be keyed.
    pub fn create_address_group_for_internal_group(&self, group: &Group) -> String {
        let key = match group_key_for(group) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Cannot derive AddressGroup for internal group");
                return String::new();
            }
        };
        let created = self.address_groups.get_or_create(&key, || AddressGroup {
            uid: group.uid.clone(),
            name: key.clone(),
            selector: None,
        });
        if created {
            debug!(key = %key, "Created new AddressGroup corresponding to internal group");
        }
        key
    }

    /// Get or create the AppliedToGroup derived from an internal Group.
    pub fn create_applied_to_group_for_internal_group(&self, group: &Group) -> String {
        let key = match group_key_for(group) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Cannot derive AppliedToGroup for internal group");
                return String::new();
            }
        };
        let created = self
            .applied_to_groups
            .get_or_create(&key, || AppliedToGroup {
                uid: group.uid.clone(),
                name: key.clone(),
                selector: None,
                service: None,
            });
        if created {
            debug!(key = %key, "Created new AppliedToGroup corresponding to internal group");
            self.membership
                .enqueue_membership(GroupType::AppliedToGroup, &key);
        }
        key
    }

    /// Get or create the AppliedToGroup whose membership follows a
    /// Service's backends.
    pub fn create_applied_to_group_for_service(&self, service: &NamespacedName) -> String {
        let key = normalized_key(&namespaced_name(&service.namespace, &service.name));
        let created = self
            .applied_to_groups
            .get_or_create(&key, || AppliedToGroup {
                uid: key.clone(),
                name: key.clone(),
                selector: None,
                service: Some(ServiceReference::from(service)),
            });
        if created {
            debug!(
                key = %key,
                service = %namespaced_name(&service.namespace, &service.name),
                "Created new AppliedToGroup corresponding to Service"
            );
            self.membership
                .enqueue_membership(GroupType::AppliedToGroup, &key);
        }
        key
    }

    // =========================================================================
    // Peer Resolver
    // =========================================================================

    /// Resolve a group-name peer against the internal group store.
    ///
    /// A namespaced policy references `namespace/name`; a cluster-scoped
    /// policy (empty namespace) references a cluster group by bare name.
    /// Groups defined over IP blocks materialize those blocks instead of an
    /// AddressGroup key. A missing group yields an empty key and no blocks.
    pub fn process_group_reference(&self, name: &str, namespace: &str) -> (String, Vec<IpBlock>) {
        let key = if namespace.is_empty() {
            name.to_string()
        } else {
            namespaced_name(namespace, name)
        };
        let Some(group) = self.internal_groups.get(&key) else {
            warn!(group = %key, "Internal group not found, omitting group reference");
            return (String::new(), Vec::new());
        };
        if !group.ip_blocks.is_empty() {
            return (String::new(), group.ip_blocks.clone());
        }
        (
            self.create_address_group_for_internal_group(&group),
            Vec::new(),
        )
    }

    /// Convert an ordered peer list to one canonical peer record.
    ///
    /// An empty list means "match everything". For ingress, or when the
    /// rule uses no named port, that is the fixed `0.0.0.0/0` sentinel,
    /// avoiding membership tracking for an unbounded group. For egress with
    /// a named port the result instead references the all-pods group,
    /// because named ports only resolve against real endpoint metadata.
    ///
    /// Each non-empty peer is dispatched by its variant independently;
    /// failures drop that peer and processing continues.
    pub fn to_peer(
        &self,
        peers: &[crate::crd::PolicyPeer],
        namespace: &str,
        direction: Direction,
        named_port_exists: bool,
    ) -> CanonicalPeer {
        use crate::crd::PolicyPeer;

        if peers.is_empty() {
            if direction == Direction::In || !named_port_exists {
                return CanonicalPeer::match_all();
            }
            // All pods in all namespaces: an empty namespace selector.
            let all_pods_key =
                self.create_address_group("", None, Some(LabelSelector::default()), None, None);
            let mut peer = CanonicalPeer::default();
            if !all_pods_key.is_empty() {
                peer.address_groups.push(all_pods_key);
            }
            return peer;
        }

        let mut peer = CanonicalPeer::default();
        for entry in peers {
            match entry {
                PolicyPeer::IpBlock(block) => match to_ip_block(block) {
                    Ok(block) => peer.ip_blocks.push(block),
                    Err(e) => {
                        error!(namespace = %namespace, cidr = %block.cidr, error = %e,
                            "Failure processing policy IP block, dropping peer");
                        continue;
                    }
                },
                PolicyPeer::Group(name) => {
                    let (key, blocks) = self.process_group_reference(name, namespace);
                    if !key.is_empty() {
                        peer.address_groups.push(key);
                    }
                    peer.ip_blocks.extend(blocks);
                }
                PolicyPeer::Fqdn(fqdn) => peer.fqdns.push(fqdn.clone()),
                PolicyPeer::ServiceAccount(account) => {
                    let key = self.create_address_group(
                        &account.namespace,
                        Some(service_account_pod_selector(&account.name)),
                        None,
                        None,
                        None,
                    );
                    if !key.is_empty() {
                        peer.address_groups.push(key);
                    }
                }
                PolicyPeer::NodeSelector(selector) => {
                    let key =
                        self.create_address_group("", None, None, None, Some(selector.clone()));
                    if !key.is_empty() {
                        peer.address_groups.push(key);
                    }
                }
                PolicyPeer::Selectors(selectors) => {
                    let key = self.create_address_group(
                        namespace,
                        selectors.pod_selector.clone(),
                        selectors.namespace_selector.clone(),
                        selectors.external_entity_selector.clone(),
                        None,
                    );
                    if !key.is_empty() {
                        peer.address_groups.push(key);
                    }
                }
            }
        }
        peer
    }

    /// Convert a peer list for one explicit namespace.
    ///
    /// Used when a single peer specification expands per namespace, e.g. an
    /// applied-to scope spanning several namespaces. Only pod-selector and
    /// external-entity-selector peers participate; the other variants are
    /// stripped, since they already resolved at the policy level.
    pub fn to_namespaced_peer(
        &self,
        peers: &[crate::crd::PolicyPeer],
        namespace: &str,
    ) -> CanonicalPeer {
        let mut peer = CanonicalPeer::default();
        for entry in peers {
            if let crate::crd::PolicyPeer::Selectors(selectors) = entry {
                let key = self.create_address_group(
                    namespace,
                    selectors.pod_selector.clone(),
                    None,
                    selectors.external_entity_selector.clone(),
                    None,
                );
                if !key.is_empty() {
                    peer.address_groups.push(key);
                }
            }
        }
        peer
    }

    /// Convert a rule's Service references to a canonical peer.
    ///
    /// References without a namespace default to the policy's namespace.
    pub fn service_refs_to_peer(
        &self,
        refs: &[NamespacedName],
        default_namespace: &str,
    ) -> CanonicalPeer {
        let to_services = refs
            .iter()
            .map(|r| ServiceReference {
                namespace: if r.namespace.is_empty() {
                    default_namespace.to_string()
                } else {
                    r.namespace.clone()
                },
                name: r.name.clone(),
            })
            .collect();
        CanonicalPeer {
            to_services,
            ..CanonicalPeer::default()
        }
    }

    /// Resolve one applied-to scope entry to its AppliedToGroup key.
    ///
    /// Dispatches on the populated form: a group reference resolves via the
    /// internal group store, a service reference creates a service-backed
    /// group, and a selector creates a selector group in the policy's
    /// namespace. Returns an empty key when resolution fails.
    pub fn resolve_applied_to(&self, applied_to: &AppliedTo, namespace: &str) -> String {
        if let Some(group_name) = &applied_to.group {
            let key = if namespace.is_empty() {
                group_name.clone()
            } else {
                namespaced_name(namespace, group_name)
            };
            let Some(group) = self.internal_groups.get(&key) else {
                warn!(group = %key, "Internal group not found, omitting applied-to scope");
                return String::new();
            };
            return self.create_applied_to_group_for_internal_group(&group);
        }
        if let Some(service) = &applied_to.service {
            let service = NamespacedName {
                namespace: if service.namespace.is_empty() {
                    namespace.to_string()
                } else {
                    service.namespace.clone()
                },
                name: service.name.clone(),
            };
            return self.create_applied_to_group_for_service(&service);
        }
        self.create_applied_to_group(namespace, applied_to.pod_selector.clone(), None, None)
    }

    /// Translate one policy rule end to end.
    ///
    /// Ports translate first so the named-port flag can steer empty-peer
    /// handling. Egress rules with Service references resolve those instead
    /// of a peer list.
    pub fn resolve_rule(&self, rule: &Rule, namespace: &str, direction: Direction) -> ResolvedRule {
        let (services, named_port_exists) = to_services(&rule.ports, &rule.protocols);
        let peer = if direction == Direction::Out && !rule.to_services.is_empty() {
            self.service_refs_to_peer(&rule.to_services, namespace)
        } else {
            let peers = match direction {
                Direction::In => &rule.from,
                Direction::Out => &rule.to,
            };
            self.to_peer(peers, namespace, direction, named_port_exists)
        };
        ResolvedRule {
            services,
            named_port_exists,
            peer,
        }
    }

    // =========================================================================
    // Internal Group Sync
    // =========================================================================

    /// Import a Group CRD into the internal group store.
    ///
    /// Returns the store key. The caller (the informer layer) is expected
    /// to enqueue [`Self::sync_internal_group`] for the returned key.
    pub fn add_internal_group(
        &self,
        namespace: &str,
        name: &str,
        spec: &GroupSpec,
    ) -> Result<String> {
        let group = Group::from_spec(namespace, name, spec)?;
        let key = group_key_for(&group)?;
        self.internal_groups.insert(&key, group);
        Ok(key)
    }

    /// Remove a Group from the internal group store.
    ///
    /// The caller is expected to enqueue [`Self::sync_internal_group`] for
    /// the key afterwards; the sync's missing-group path performs the
    /// cleanup.
    pub fn remove_internal_group(&self, key: &str) -> Option<Group> {
        self.internal_groups.delete(key)
    }

    /// Synchronize the state derived from one internal group.
    ///
    /// A missing group tears down its membership-computation node. A
    /// present group delegates to namespaced or cluster-scoped sync
    /// depending on its source. Whichever path runs, and whether or not it
    /// succeeds, both policy kinds and any parent group compositions are
    /// re-triggered exactly once before returning.
    pub fn sync_internal_group(&self, key: &str) -> Result<()> {
        let result = self.sync_internal_group_inner(key);
        // Dependents re-sync on every exit path, including the
        // missing-group path and delegate failures.
        self.triggers.trigger_network_policy_updates(key);
        self.triggers.trigger_cluster_policy_updates(key);
        self.triggers.trigger_parent_group_sync(key);
        result
    }

    fn sync_internal_group_inner(&self, key: &str) -> Result<()> {
        let Some(group) = self.internal_groups.get(key) else {
            debug!(group = %key, "Internal group not found, removing from grouping interface");
            self.membership.delete_group(GroupType::InternalGroup, key);
            return Ok(());
        };
        match &group.source_reference {
            Some(source) if !source.namespace.is_empty() => self.sync_namespaced_group(&group),
            _ => self.sync_cluster_group(&group),
        }
    }

    /// Sync a namespaced group: recompute membership at the source and
    /// refresh the derived groups.
    fn sync_namespaced_group(&self, group: &Group) -> Result<()> {
        let key = group_key_for(group)?;
        debug!(group = %key, "Syncing internal namespaced group");
        self.membership
            .enqueue_membership(GroupType::InternalGroup, &key);
        self.refresh_derived_groups(&key);
        Ok(())
    }

    /// Sync a cluster-scoped group, including composed child groups.
    fn sync_cluster_group(&self, group: &Group) -> Result<()> {
        let key = group_key_for(group)?;
        debug!(group = %key, "Syncing internal cluster group");
        self.membership
            .enqueue_membership(GroupType::InternalGroup, &key);
        // A composed group's membership depends on its children; make sure
        // their computation is current too.
        for child in &group.child_groups {
            if self.internal_groups.contains(child) {
                self.membership
                    .enqueue_membership(GroupType::InternalGroup, child);
            }
        }
        self.refresh_derived_groups(&key);
        Ok(())
    }

    fn refresh_derived_groups(&self, key: &str) {
        if self.address_groups.contains(key) {
            self.membership
                .enqueue_membership(GroupType::AddressGroup, key);
        }
        if self.applied_to_groups.contains(key) {
            self.membership
                .enqueue_membership(GroupType::AppliedToGroup, key);
        }
    }
}
