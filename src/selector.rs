//! Group selector normalization
//!
//! A group's identity is content-addressed: the selector combination is
//! rendered into a canonical string (the normalized name), and the store key
//! is a stable UUID derived from that string. Two policies using the same
//! selectors therefore share one group object, no matter which was
//! translated first.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use uuid::Uuid;

use crate::{Error, Result};

/// A validated selector combination with its canonical rendering
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupSelector {
    /// Namespace the selectors are scoped to; empty when a namespace
    /// selector is present or the group is cluster-scoped
    pub namespace: String,
    /// Select pods by label
    pub pod_selector: Option<LabelSelector>,
    /// Select namespaces by label; clears the fixed namespace scope
    pub namespace_selector: Option<LabelSelector>,
    /// Select external entities by label
    pub external_entity_selector: Option<LabelSelector>,
    /// Select nodes by label (cluster-scoped groups only)
    pub node_selector: Option<LabelSelector>,
    /// Canonical rendering of the combination, identical for equal inputs
    pub normalized_name: String,
}

impl GroupSelector {
    /// Build a selector combination and compute its normalized name.
    ///
    /// Fails when any label selector carries a requirement that cannot be
    /// rendered (unknown operator, or a value list that contradicts the
    /// operator). Callers translate that failure into an empty group key.
    pub fn new(
        namespace: &str,
        pod_selector: Option<LabelSelector>,
        namespace_selector: Option<LabelSelector>,
        external_entity_selector: Option<LabelSelector>,
        node_selector: Option<LabelSelector>,
    ) -> Result<Self> {
        // A namespace selector widens scope beyond one namespace, so the
        // fixed namespace is dropped from the identity.
        let namespace = if namespace_selector.is_some() {
            String::new()
        } else {
            namespace.to_string()
        };
        let normalized_name = generate_normalized_name(
            &namespace,
            pod_selector.as_ref(),
            namespace_selector.as_ref(),
            external_entity_selector.as_ref(),
            node_selector.as_ref(),
        )?;
        Ok(Self {
            namespace,
            pod_selector,
            namespace_selector,
            external_entity_selector,
            node_selector,
            normalized_name,
        })
    }
}

/// Render a selector combination into its canonical string form.
///
/// Segment order is fixed, match labels iterate in key order, and
/// requirement values are sorted, so equal combinations render identically
/// regardless of construction order.
fn generate_normalized_name(
    namespace: &str,
    pod_selector: Option<&LabelSelector>,
    namespace_selector: Option<&LabelSelector>,
    external_entity_selector: Option<&LabelSelector>,
    node_selector: Option<&LabelSelector>,
) -> Result<String> {
    let mut segments = Vec::new();
    match namespace_selector {
        Some(selector) => segments.push(format!(
            "namespaceSelector={}",
            format_label_selector(selector)?
        )),
        None if !namespace.is_empty() => segments.push(format!("namespace={namespace}")),
        None => {}
    }
    if let Some(selector) = pod_selector {
        segments.push(format!("podSelector={}", format_label_selector(selector)?));
    }
    if let Some(selector) = external_entity_selector {
        segments.push(format!(
            "externalEntitySelector={}",
            format_label_selector(selector)?
        ));
    }
    if let Some(selector) = node_selector {
        segments.push(format!("nodeSelector={}", format_label_selector(selector)?));
    }
    Ok(segments.join(" And "))
}

/// Render a LabelSelector in the canonical `k=v,k2 in (a,b)` form
fn format_label_selector(selector: &LabelSelector) -> Result<String> {
    let mut parts = Vec::new();
    if let Some(labels) = &selector.match_labels {
        // BTreeMap iteration is already key-ordered.
        for (key, value) in labels {
            parts.push(format!("{key}={value}"));
        }
    }
    if let Some(requirements) = &selector.match_expressions {
        for requirement in requirements {
            parts.push(format_requirement(requirement)?);
        }
    }
    Ok(parts.join(","))
}

fn format_requirement(requirement: &LabelSelectorRequirement) -> Result<String> {
    let values = || -> Result<String> {
        let mut values: Vec<String> = requirement.values.clone().unwrap_or_default();
        if values.is_empty() {
            return Err(Error::selector(format!(
                "operator {} on key {} requires values",
                requirement.operator, requirement.key
            )));
        }
        values.sort();
        Ok(values.join(","))
    };
    match requirement.operator.as_str() {
        "In" => Ok(format!("{} in ({})", requirement.key, values()?)),
        "NotIn" => Ok(format!("{} notin ({})", requirement.key, values()?)),
        "Exists" => Ok(requirement.key.clone()),
        "DoesNotExist" => Ok(format!("!{}", requirement.key)),
        other => Err(Error::selector(format!(
            "{other} is not a valid label selector operator"
        ))),
    }
}

/// Derive the stable content-addressed key for a normalized name.
///
/// UUIDv5 keeps the key deterministic across processes and restarts, which
/// is what makes group deduplication work between controller instances.
pub fn normalized_key(normalized_name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized_name.as_bytes()).to_string()
}

/// Synthesize the pod selector matching all pods of a service account.
///
/// Membership computation labels pods with their service account under this
/// well-known key.
pub fn service_account_pod_selector(name: &str) -> LabelSelector {
    let mut labels = std::collections::BTreeMap::new();
    labels.insert(
        "internal.weft.io/service-account".to_string(),
        name.to_string(),
    );
    LabelSelector {
        match_labels: Some(labels),
        match_expressions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> LabelSelector {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LabelSelector {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Story: identical selector combinations normalize identically
    ///
    /// This is the invariant behind group deduplication: the normalized
    /// name depends only on content, never on construction order.
    #[test]
    fn story_normalization_is_order_independent() {
        let a = GroupSelector::new(
            "prod",
            Some(labels(&[("app", "web"), ("env", "prod")])),
            None,
            None,
            None,
        )
        .unwrap();
        let b = GroupSelector::new(
            "prod",
            Some(labels(&[("env", "prod"), ("app", "web")])),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(a.normalized_name, b.normalized_name);
        assert_eq!(
            normalized_key(&a.normalized_name),
            normalized_key(&b.normalized_name)
        );
    }

    /// Story: different combinations produce different identities
    #[test]
    fn story_distinct_selectors_distinct_keys() {
        let a = GroupSelector::new("prod", Some(labels(&[("app", "web")])), None, None, None)
            .unwrap();
        let b = GroupSelector::new("prod", Some(labels(&[("app", "db")])), None, None, None)
            .unwrap();
        assert_ne!(a.normalized_name, b.normalized_name);

        // Same labels, different namespace
        let c = GroupSelector::new("staging", Some(labels(&[("app", "web")])), None, None, None)
            .unwrap();
        assert_ne!(a.normalized_name, c.normalized_name);
    }

    /// Story: a namespace selector clears the fixed namespace scope
    #[test]
    fn story_namespace_selector_drops_namespace() {
        let selector = GroupSelector::new(
            "prod",
            Some(labels(&[("app", "web")])),
            Some(labels(&[("team", "core")])),
            None,
            None,
        )
        .unwrap();
        assert_eq!(selector.namespace, "");
        assert!(selector.normalized_name.contains("namespaceSelector="));
        assert!(!selector.normalized_name.contains("namespace=prod"));
    }

    /// Story: the empty namespace selector means "all namespaces"
    ///
    /// The match-all-pods group is built from an empty namespace selector;
    /// its normalized name must still be non-ambiguous and stable.
    #[test]
    fn story_match_all_normalization() {
        let selector =
            GroupSelector::new("", None, Some(LabelSelector::default()), None, None).unwrap();
        assert_eq!(selector.normalized_name, "namespaceSelector=");
    }

    /// Story: requirement rendering follows the k8s operator forms
    #[test]
    fn story_requirement_operators() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["web".to_string(), "api".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "legacy".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
                LabelSelectorRequirement {
                    key: "owned".to_string(),
                    operator: "Exists".to_string(),
                    values: None,
                },
            ]),
        };
        let rendered = format_label_selector(&selector).unwrap();
        assert_eq!(rendered, "tier in (api,web),!legacy,owned");
    }

    /// Story: malformed requirements fail normalization
    ///
    /// Callers convert this failure into an empty group key, which drops
    /// the peer's group reference without failing the rule.
    #[test]
    fn story_malformed_selector_is_rejected() {
        let bad_operator = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".to_string(),
                operator: "Near".to_string(),
                values: None,
            }]),
        };
        assert!(GroupSelector::new("prod", Some(bad_operator), None, None, None).is_err());

        let in_without_values = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".to_string(),
                operator: "In".to_string(),
                values: None,
            }]),
        };
        assert!(GroupSelector::new("prod", Some(in_without_values), None, None, None).is_err());
    }

    /// Story: service account peers synthesize a pod selector
    #[test]
    fn story_service_account_selector_convention() {
        let selector = service_account_pod_selector("payments");
        let labels = selector.match_labels.unwrap();
        assert_eq!(
            labels.get("internal.weft.io/service-account"),
            Some(&"payments".to_string())
        );
    }

    /// Story: keys are stable across processes
    ///
    /// The UUIDv5 derivation has no process-local input, so a restarted
    /// controller re-derives the same keys and reuses existing groups.
    #[test]
    fn story_key_is_a_stable_uuid() {
        let key = normalized_key("namespace=prod And podSelector=app=web");
        assert_eq!(key, normalized_key("namespace=prod And podSelector=app=web"));
        assert!(Uuid::parse_str(&key).is_ok());
    }
}
