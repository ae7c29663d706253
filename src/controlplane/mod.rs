//! Canonical internal objects consumed by the enforcement layer
//!
//! These types are the output of the translation core: peers with their
//! selector forms collapsed to group keys, CIDRs parsed into canonical
//! networks, and port descriptors expanded into service entries. They are
//! built once per policy rule and immutable afterwards.

use ipnetwork::IpNetwork;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{GroupSpec, NamespacedName};
use crate::selector::GroupSelector;
use crate::{Error, Result, MATCH_ALL_CIDR};

/// Direction of traffic evaluated by a rule
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Direction {
    /// Ingress: traffic arriving at the applied-to workloads
    In,
    /// Egress: traffic leaving the applied-to workloads
    Out,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "In"),
            Self::Out => write!(f, "Out"),
        }
    }
}

/// Transport protocol of a service entry
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Transmission Control Protocol
    #[default]
    Tcp,
    /// User Datagram Protocol
    Udp,
    /// Stream Control Transmission Protocol
    Sctp,
    /// Internet Control Message Protocol
    Icmp,
    /// Internet Group Management Protocol
    Igmp,
}

/// An IP range with optional carve-outs
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpBlock {
    /// The matched network
    pub cidr: IpNetwork,
    /// Sub-ranges excluded from the match
    pub except: Vec<IpNetwork>,
}

/// A reference to a Service consumed by the enforcement layer
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceReference {
    /// Namespace of the Service
    pub namespace: String,
    /// Name of the Service
    pub name: String,
}

/// The canonical form of a rule's peer list
///
/// Ordered sequences preserve the input peer order. Duplicate group keys are
/// possible when the input repeats a selector combination; the group store
/// already collapses those to one object, so no peer-level dedup is done.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPeer {
    /// Keys of the address groups this peer references
    pub address_groups: Vec<String>,
    /// Concrete IP ranges
    pub ip_blocks: Vec<IpBlock>,
    /// Domain names resolved to addresses asynchronously
    pub fqdns: Vec<String>,
    /// Destination Services (egress only)
    pub to_services: Vec<ServiceReference>,
}

impl CanonicalPeer {
    /// The fixed match-all sentinel: one `0.0.0.0/0` block, nothing else.
    ///
    /// Used for empty peer lists so that no unbounded group membership has
    /// to be tracked.
    pub fn match_all() -> Self {
        // MATCH_ALL_CIDR is a compile-time constant; the parse cannot fail.
        let cidr: IpNetwork = MATCH_ALL_CIDR.parse().unwrap();
        Self {
            ip_blocks: vec![IpBlock {
                cidr,
                except: Vec::new(),
            }],
            ..Self::default()
        }
    }
}

/// A service entry derived from one port or protocol descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Transport protocol
    pub protocol: Option<Protocol>,
    /// Port by number or name
    pub port: Option<IntOrString>,
    /// Inclusive end of a port range
    pub end_port: Option<i32>,
    /// ICMP type (ICMP entries only)
    pub icmp_type: Option<i32>,
    /// ICMP code (ICMP entries only)
    pub icmp_code: Option<i32>,
    /// IGMP type (IGMP entries only)
    pub igmp_type: Option<i32>,
    /// Multicast group address (IGMP entries only)
    pub group_address: Option<String>,
}

// =============================================================================
// Group objects
// =============================================================================

/// A deduplicated set of endpoints referenced by policy rule peers
///
/// The name doubles as the content-addressed store key: two selector
/// combinations normalizing to the same key share one AddressGroup.
#[derive(Clone, Debug, PartialEq)]
pub struct AddressGroup {
    /// Stable unique identifier
    pub uid: String,
    /// Normalized key, also the object name
    pub name: String,
    /// Selector driving membership computation; absent for groups derived
    /// from an internal Group, whose membership is computed at the source
    pub selector: Option<GroupSelector>,
}

/// A deduplicated set of workloads a policy applies to
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedToGroup {
    /// Stable unique identifier
    pub uid: String,
    /// Normalized key, also the object name
    pub name: String,
    /// Selector driving membership computation
    pub selector: Option<GroupSelector>,
    /// Set for service-backed groups: membership follows the Service's backends
    pub service: Option<ServiceReference>,
}

/// Identifies the CRD a Group was created from
///
/// An empty namespace marks a cluster-scoped source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupSourceReference {
    /// Namespace of the source object; empty for cluster-scoped sources
    pub namespace: String,
    /// Name of the source object
    pub name: String,
}

impl GroupSourceReference {
    /// Human-readable form for logging
    pub fn to_typed_string(&self) -> String {
        if self.namespace.is_empty() {
            format!("ClusterGroup/{}", self.name)
        } else {
            format!("Group/{}/{}", self.namespace, self.name)
        }
    }
}

/// Source-of-truth group object backing AddressGroups and AppliedToGroups
///
/// One internal Group may back one AddressGroup and/or one AppliedToGroup
/// with the same key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Group {
    /// Stable unique identifier
    pub uid: String,
    /// Selector driving membership, for selector-defined groups
    pub selector: Option<GroupSelector>,
    /// Service whose backends define membership, for service-backed groups
    pub service_reference: Option<ServiceReference>,
    /// The CRD this group was created from
    pub source_reference: Option<GroupSourceReference>,
    /// Concrete ranges for groups defined over IP blocks
    pub ip_blocks: Vec<IpBlock>,
    /// Keys of child groups for composed groups
    pub child_groups: Vec<String>,
}

impl Group {
    /// Build an internal Group from a Group CRD spec.
    ///
    /// An empty `namespace` produces a cluster-scoped group. CIDRs in the
    /// spec are parsed here; a malformed CIDR fails the whole group, since a
    /// partially-materialized IP group would silently widen or narrow the
    /// matched set.
    pub fn from_spec(namespace: &str, name: &str, spec: &GroupSpec) -> Result<Self> {
        let source = GroupSourceReference {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let mut ip_blocks = Vec::with_capacity(spec.ip_blocks.len());
        for block in &spec.ip_blocks {
            let cidr: IpNetwork = block
                .cidr
                .parse()
                .map_err(|e| Error::invalid_cidr(format!("{}: {e}", block.cidr)))?;
            ip_blocks.push(IpBlock {
                cidr,
                except: Vec::new(),
            });
        }
        let selector = if spec.pod_selector.is_some()
            || spec.namespace_selector.is_some()
            || spec.external_entity_selector.is_some()
        {
            Some(GroupSelector::new(
                namespace,
                spec.pod_selector.clone(),
                spec.namespace_selector.clone(),
                spec.external_entity_selector.clone(),
                None,
            )?)
        } else {
            None
        };
        let service_reference = spec.service_reference.as_ref().map(|r| ServiceReference {
            namespace: if r.namespace.is_empty() {
                namespace.to_string()
            } else {
                r.namespace.clone()
            },
            name: r.name.clone(),
        });
        Ok(Self {
            uid: crate::selector::normalized_key(&source.to_typed_string()),
            selector,
            service_reference,
            source_reference: Some(source),
            ip_blocks,
            child_groups: spec.child_groups.clone(),
        })
    }
}

/// Derive the store key for an internal Group from its source reference.
///
/// Namespaced sources key as `namespace/name`, cluster-scoped sources as
/// `name`. A group without a source reference cannot be keyed.
pub fn group_key_for(group: &Group) -> Result<String> {
    let source = group
        .source_reference
        .as_ref()
        .ok_or_else(|| Error::group("group has no source reference"))?;
    if source.namespace.is_empty() {
        Ok(source.name.clone())
    } else {
        Ok(format!("{}/{}", source.namespace, source.name))
    }
}

/// Convert a namespace/name pair to the `namespace/name` key form
pub fn namespaced_name(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl From<&NamespacedName> for ServiceReference {
    fn from(value: &NamespacedName) -> Self {
        Self {
            namespace: value.namespace.clone(),
            name: value.name.clone(),
        }
    }
}
