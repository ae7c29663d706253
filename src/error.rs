//! Error types for the Weft translation core

use thiserror::Error;

/// Main error type for Weft operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A CIDR string could not be parsed into a network
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// A label selector could not be normalized
    #[error("selector error: {0}")]
    Selector(String),

    /// A group object is malformed or cannot produce a key
    #[error("group error: {0}")]
    Group(String),

    /// A referenced object was not found in its store
    #[error("lookup error: {0}")]
    Lookup(String),
}

impl Error {
    /// Create an invalid-CIDR error with the given message
    pub fn invalid_cidr(msg: impl Into<String>) -> Self {
        Self::InvalidCidr(msg.into())
    }

    /// Create a selector error with the given message
    pub fn selector(msg: impl Into<String>) -> Self {
        Self::Selector(msg.into())
    }

    /// Create a group error with the given message
    pub fn group(msg: impl Into<String>) -> Self {
        Self::Group(msg.into())
    }

    /// Create a lookup error with the given message
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: CIDR parse failures identify the offending peer
    ///
    /// When a policy rule carries a malformed CIDR, the error names the
    /// input so the dropped peer can be found in the policy spec.
    #[test]
    fn story_invalid_cidr_names_the_input() {
        let err = Error::invalid_cidr("10.0.0.0/33 is not a valid network");
        assert!(err.to_string().contains("invalid CIDR"));
        assert!(err.to_string().contains("10.0.0.0/33"));

        match Error::invalid_cidr("any message") {
            Error::InvalidCidr(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected InvalidCidr variant"),
        }
    }

    /// Story: selector errors surface which requirement was malformed
    #[test]
    fn story_selector_errors_describe_the_requirement() {
        let err = Error::selector("operator 'Near' is not a valid selector operator");
        assert!(err.to_string().contains("selector error"));
        assert!(err.to_string().contains("Near"));
    }

    /// Story: group errors cover key derivation failures
    ///
    /// A group without a source reference cannot produce a store key; the
    /// caller treats that as "omit from result" rather than failing the rule.
    #[test]
    fn story_group_errors_for_key_derivation() {
        let err = Error::group("group has no source reference");
        assert!(err.to_string().contains("group error"));

        match Error::group("no key") {
            Error::Group(msg) => assert_eq!(msg, "no key"),
            _ => panic!("Expected Group variant"),
        }
    }

    /// Story: lookup misses are recoverable
    ///
    /// A tier lookup miss falls back to the default priority. The error is
    /// logged but never propagated to the policy being translated.
    #[test]
    fn story_lookup_errors_are_informational() {
        let err = Error::lookup("tier \"gold\" not found");
        assert!(err.to_string().contains("lookup error"));
        assert!(err.to_string().contains("gold"));
    }

    /// Story: error helper functions accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let dynamic_msg = format!("tier {} not found", "platform");
        let err = Error::lookup(dynamic_msg);
        assert!(err.to_string().contains("platform"));

        let err = Error::group("static message");
        assert!(err.to_string().contains("static message"));
    }
}
