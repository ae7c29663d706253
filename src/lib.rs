//! Weft - CRD-driven network policy translation core
//!
//! Weft translates declarative network policy resources (selectors, IP
//! ranges, FQDNs, service references, tiers) into the canonical internal
//! objects consumed by a distributed policy-enforcement control plane.
//!
//! # Architecture
//!
//! Policy rules reference peers in several mutually-exclusive forms. The
//! translation core resolves each form into a small set of canonical
//! representations and deduplicates equivalent selector combinations into a
//! single shared, content-addressed group identity. Group membership itself
//! (which endpoints satisfy a selector) is computed by a separate subsystem
//! that this core only triggers, never performs.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (NetworkPolicy, Tier, Group)
//! - [`controlplane`] - Canonical internal objects handed to enforcement
//! - [`selector`] - Group selector normalization and content-addressed keys
//! - [`store`] - Concurrent group object stores with atomic get-or-create
//! - [`grouping`] - Interfaces to membership computation and re-triggering
//! - [`controller`] - The translation core and internal group sync
//! - [`error`] - Error types for the translation core

#![deny(missing_docs)]

pub mod controller;
pub mod controlplane;
pub mod crd;
pub mod error;
pub mod grouping;
pub mod selector;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Priority assigned to policies in the lowest-priority Application tier.
///
/// Used whenever a policy omits its tier or references a tier that cannot
/// be resolved.
pub const DEFAULT_TIER_PRIORITY: i32 = 250;

/// Names of the static tiers that predate tier CRDs.
///
/// Policies created against a static tier keep working after upgrade: the
/// name is lower-cased to match the corresponding Tier resource.
pub const STATIC_TIER_NAMES: [&str; 5] = [
    "Emergency",
    "SecurityOps",
    "NetworkOps",
    "Platform",
    "Application",
];

/// CIDR used for the match-all sentinel peer
pub const MATCH_ALL_CIDR: &str = "0.0.0.0/0";
