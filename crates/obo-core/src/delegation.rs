//! Delegation chain model.
//!
//! A chain reads "subject acting for audience with scope, itself acting on
//! behalf of actor...". Its canonical wire form is the nested map used by the
//! JWT `act` claim (RFC 8693 §4.1):
//!
//! ```text
//! { "sub": "alice", "aud": "supply-chain-agent", "scope": "supply-chain:optimize",
//!   "act": { "sub": "spiffe://.../backend", "aud": "supply-chain-agent", "scope": "supply-chain:optimize" } }
//! ```
//!
//! Chains are built bottom-up, so a node can never reference one of its
//! ancestors. Depth is tracked explicitly and capped at
//! [`MAX_DELEGATION_DEPTH`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::DelegationError;

/// Maximum number of nodes in a chain, the outermost subject included
pub const MAX_DELEGATION_DEPTH: usize = 10;

/// Immutable, depth-bounded delegation chain.
///
/// Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationChain {
    subject: String,
    audience: String,
    scope: String,
    actor: Option<Box<DelegationChain>>,
    depth: usize,
}

impl DelegationChain {
    /// Build a new chain node on top of an optional actor chain.
    ///
    /// Fails with [`DelegationError::DepthExceeded`] instead of truncating
    /// when the result would be deeper than [`MAX_DELEGATION_DEPTH`].
    pub fn build(
        subject: impl Into<String>,
        audience: impl Into<String>,
        scope: impl Into<String>,
        actor: Option<DelegationChain>,
    ) -> Result<Self, DelegationError> {
        let subject = subject.into();
        let audience = audience.into();
        let scope = scope.into();

        if subject.trim().is_empty() {
            return Err(DelegationError::EmptyField("subject"));
        }
        if audience.trim().is_empty() {
            return Err(DelegationError::EmptyField("audience"));
        }
        if scope.trim().is_empty() {
            return Err(DelegationError::EmptyField("scope"));
        }

        let depth = 1 + actor.as_ref().map_or(0, |a| a.depth);
        if depth > MAX_DELEGATION_DEPTH {
            return Err(DelegationError::DepthExceeded {
                depth,
                max: MAX_DELEGATION_DEPTH,
            });
        }

        Ok(Self {
            subject,
            audience,
            scope,
            actor: actor.map(Box::new),
            depth,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn actor(&self) -> Option<&DelegationChain> {
        self.actor.as_deref()
    }

    /// Number of nodes in this chain (1 for a chain without actor)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Walk the chain from this node down to the innermost actor
    pub fn iter(&self) -> impl Iterator<Item = &DelegationChain> {
        std::iter::successors(Some(self), |node| node.actor())
    }

    /// Serialize to the canonical nested-map form
    pub fn to_claim(&self) -> Value {
        let mut map = Map::new();
        map.insert("sub".to_string(), Value::String(self.subject.clone()));
        map.insert("aud".to_string(), Value::String(self.audience.clone()));
        map.insert("scope".to_string(), Value::String(self.scope.clone()));
        if let Some(actor) = &self.actor {
            map.insert("act".to_string(), actor.to_claim());
        }
        Value::Object(map)
    }

    /// Parse the canonical nested-map form.
    ///
    /// The nesting is walked iteratively and rejected as soon as it passes
    /// the depth limit, so hostile input cannot force deep recursion.
    pub fn from_claim(value: &Value) -> Result<Self, DelegationError> {
        let mut nodes: Vec<(String, String, String)> = Vec::new();
        let mut current = Some(value);

        while let Some(node) = current {
            if nodes.len() == MAX_DELEGATION_DEPTH {
                return Err(DelegationError::DepthExceeded {
                    depth: MAX_DELEGATION_DEPTH + 1,
                    max: MAX_DELEGATION_DEPTH,
                });
            }

            let obj = node
                .as_object()
                .ok_or_else(|| DelegationError::Malformed("expected an object".to_string()))?;

            let subject = claim_str(obj, "sub")?;
            let audience = claim_str(obj, "aud")?;
            let scope = claim_str(obj, "scope")?;
            nodes.push((subject, audience, scope));

            current = match obj.get("act") {
                None | Some(Value::Null) => None,
                Some(act) => Some(act),
            };
        }

        let mut chain = None;
        for (subject, audience, scope) in nodes.into_iter().rev() {
            chain = Some(Self::build(subject, audience, scope, chain)?);
        }
        chain.ok_or_else(|| DelegationError::Malformed("empty claim".to_string()))
    }
}

fn claim_str(obj: &Map<String, Value>, key: &str) -> Result<String, DelegationError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DelegationError::Malformed(format!("`{}` must be a string", key))),
        None => Err(DelegationError::Malformed(format!("missing `{}`", key))),
    }
}

impl fmt::Display for DelegationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}]", self.subject, self.audience, self.scope)?;
        if let Some(actor) = &self.actor {
            write!(f, " via ({})", actor)?;
        }
        Ok(())
    }
}

impl Serialize for DelegationChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_claim().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DelegationChain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DelegationChain::from_claim(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(depth: usize) -> Result<DelegationChain, DelegationError> {
        let mut chain = None;
        for i in 0..depth {
            chain = Some(DelegationChain::build(
                format!("agent-{}", i),
                "downstream",
                "read",
                chain,
            )?);
        }
        chain.ok_or(DelegationError::Malformed("zero depth".into()))
    }

    #[test]
    fn test_build_root() {
        let chain = DelegationChain::build("alice", "supply-chain-agent", "supply-chain:optimize", None)
            .unwrap();
        assert_eq!(chain.subject(), "alice");
        assert_eq!(chain.depth(), 1);
        assert!(chain.actor().is_none());
    }

    #[test]
    fn test_build_rejects_empty_fields() {
        assert_eq!(
            DelegationChain::build("", "aud", "scope", None),
            Err(DelegationError::EmptyField("subject"))
        );
        assert_eq!(
            DelegationChain::build("sub", "  ", "scope", None),
            Err(DelegationError::EmptyField("audience"))
        );
        assert_eq!(
            DelegationChain::build("sub", "aud", "", None),
            Err(DelegationError::EmptyField("scope"))
        );
    }

    #[test]
    fn test_depth_limit_is_enforced_not_truncated() {
        let at_limit = nested(MAX_DELEGATION_DEPTH).unwrap();
        assert_eq!(at_limit.depth(), MAX_DELEGATION_DEPTH);
        assert_eq!(at_limit.iter().count(), MAX_DELEGATION_DEPTH);

        let err = DelegationChain::build("one-more", "aud", "scope", Some(at_limit)).unwrap_err();
        assert_eq!(
            err,
            DelegationError::DepthExceeded {
                depth: MAX_DELEGATION_DEPTH + 1,
                max: MAX_DELEGATION_DEPTH
            }
        );
    }

    #[test]
    fn test_claim_shape() {
        let actor = DelegationChain::build("backend", "agent", "s", None).unwrap();
        let chain = DelegationChain::build("alice", "agent", "s", Some(actor)).unwrap();

        assert_eq!(
            chain.to_claim(),
            json!({
                "sub": "alice", "aud": "agent", "scope": "s",
                "act": { "sub": "backend", "aud": "agent", "scope": "s" }
            })
        );
    }

    #[test]
    fn test_parse_rejects_deep_claims() {
        let mut claim = json!({ "sub": "leaf", "aud": "a", "scope": "s" });
        for i in 0..MAX_DELEGATION_DEPTH {
            claim = json!({ "sub": format!("n{}", i), "aud": "a", "scope": "s", "act": claim });
        }

        assert!(matches!(
            DelegationChain::from_claim(&claim),
            Err(DelegationError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            DelegationChain::from_claim(&json!("alice")),
            Err(DelegationError::Malformed(_))
        ));
        assert!(matches!(
            DelegationChain::from_claim(&json!({ "sub": "alice", "aud": "a" })),
            Err(DelegationError::Malformed(_))
        ));
        assert!(matches!(
            DelegationChain::from_claim(&json!({ "sub": 7, "aud": "a", "scope": "s" })),
            Err(DelegationError::Malformed(_))
        ));
        assert_eq!(
            DelegationChain::from_claim(&json!({ "sub": "", "aud": "a", "scope": "s" })),
            Err(DelegationError::EmptyField("subject"))
        );
    }

    #[test]
    fn test_null_act_is_absent() {
        let chain =
            DelegationChain::from_claim(&json!({ "sub": "a", "aud": "b", "scope": "c", "act": null }))
                .unwrap();
        assert!(chain.actor().is_none());
    }

    #[test]
    fn test_serde_uses_claim_form() {
        let chain = nested(3).unwrap();
        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.contains("\"act\""));

        let back: DelegationChain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }

    #[test]
    fn test_display() {
        let actor = DelegationChain::build("backend", "agent", "s", None).unwrap();
        let chain = DelegationChain::build("alice", "agent", "s", Some(actor)).unwrap();
        assert_eq!(chain.to_string(), "alice -> agent [s] via (backend -> agent [s])");
    }
}
