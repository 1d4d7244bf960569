use std::collections::BTreeSet;

use isthmus_primitives::{EndpointId, PolicyDocument};
use isthmus_topology_registry::AccessEndpoint;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AccessPolicyStatement, Condition, Effect, INVOKE_ACTION, PolicyError, Principal,
    RESOURCE_SCOPE,
};

/// The provider's resource policy.
///
/// Holds the authorized identity set once; both statements are derived from
/// it, so an allow-only or mismatched pair cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    authorized: BTreeSet<EndpointId>,
    actions: Vec<String>,
    resource_scope: String,
}

impl ResourcePolicy {
    pub fn authorized(&self) -> &BTreeSet<EndpointId> {
        &self.authorized
    }

    pub fn is_authorized(&self, id: &EndpointId) -> bool {
        self.authorized.contains(id)
    }

    /// Deny-if-not-in-set followed by allow-if-in-set, always in this order.
    pub fn statements(&self) -> [AccessPolicyStatement; 2] {
        let statement = |effect, condition| AccessPolicyStatement {
            effect,
            principal: Principal::Any,
            actions: self.actions.clone(),
            resource_scope: self.resource_scope.clone(),
            condition,
            matched_endpoint_ids: self.authorized.clone(),
        };
        [
            statement(Effect::Deny, Condition::SourceEndpointNotIn),
            statement(Effect::Allow, Condition::SourceEndpointIn),
        ]
    }

    pub fn document(&self) -> PolicyDocument {
        let statements: Vec<_> = self.statements().iter().map(|s| s.to_json()).collect();
        let document = json!({
            "Version": "2012-10-17",
            "Statement": statements,
        });
        PolicyDocument::new(document.to_string())
    }
}

/// Build the policy for `own` plus every external endpoint.
///
/// Pure and order independent: the identities land in a sorted set.
pub fn synthesize<'a>(
    own: &AccessEndpoint,
    external: impl IntoIterator<Item = &'a EndpointId>,
) -> Result<ResourcePolicy, PolicyError> {
    let own_id = own
        .binding
        .id()
        .ok_or_else(|| PolicyError::EndpointNotBound(own.key.clone()))?;

    let mut authorized: BTreeSet<EndpointId> = external.into_iter().cloned().collect();
    authorized.insert(own_id.clone());

    Ok(ResourcePolicy {
        authorized,
        actions: vec![INVOKE_ACTION.to_owned()],
        resource_scope: RESOURCE_SCOPE.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use isthmus_primitives::DnsMode;
    use isthmus_topology_registry::{EndpointBinding, EndpointKey};
    use proptest::prelude::*;

    use super::*;

    fn own(binding: EndpointBinding) -> AccessEndpoint {
        AccessEndpoint {
            key: EndpointKey::new("provider", "execute-api"),
            dns_mode: DnsMode::PrivateEnabled,
            binding,
        }
    }

    fn ids(raw: &[&str]) -> Vec<EndpointId> {
        raw.iter().map(|id| EndpointId::from(*id)).collect()
    }

    #[test]
    fn test_two_statements_in_fixed_order() {
        let own = own(EndpointBinding::Bound("vpce-p".into()));
        let external = ids(&["vpce-c"]);
        let policy = synthesize(&own, &external).unwrap();

        let [deny, allow] = policy.statements();
        assert_eq!(deny.effect, Effect::Deny);
        assert_eq!(deny.condition, Condition::SourceEndpointNotIn);
        assert_eq!(allow.effect, Effect::Allow);
        assert_eq!(allow.condition, Condition::SourceEndpointIn);

        let expected: BTreeSet<_> = ids(&["vpce-p", "vpce-c"]).into_iter().collect();
        assert_eq!(deny.matched_endpoint_ids, expected);
        assert_eq!(allow.matched_endpoint_ids, expected);
        assert_eq!(deny.actions, vec![INVOKE_ACTION.to_owned()]);
        assert_eq!(allow.resource_scope, RESOURCE_SCOPE);
    }

    #[test]
    fn test_own_only() {
        let own = own(EndpointBinding::Bound("vpce-p".into()));
        let none: [&EndpointId; 0] = [];
        let policy = synthesize(&own, none).unwrap();
        assert_eq!(policy.authorized().len(), 1);
        assert!(policy.is_authorized(&"vpce-p".into()));
    }

    #[test]
    fn test_pending_own_endpoint_fails() {
        let own = own(EndpointBinding::Pending);
        let external = ids(&["vpce-c"]);
        assert_matches!(
            synthesize(&own, &external),
            Err(PolicyError::EndpointNotBound(key)) if key.segment.as_str() == "provider"
        );
    }

    #[test]
    fn test_document_shape() {
        let own = own(EndpointBinding::Bound("vpce-p".into()));
        let external = ids(&["vpce-c"]);
        let document = synthesize(&own, &external).unwrap().document();

        let value: serde_json::Value = serde_json::from_str(document.as_str()).unwrap();
        let statements = value["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Effect"], "Deny");
        assert_eq!(
            statements[0]["Condition"]["StringNotEquals"]["aws:sourceVpce"],
            serde_json::json!(["vpce-c", "vpce-p"])
        );
        assert_eq!(statements[1]["Effect"], "Allow");
        assert_eq!(
            statements[1]["Condition"]["StringEquals"]["aws:sourceVpce"],
            serde_json::json!(["vpce-c", "vpce-p"])
        );
    }

    proptest! {
        #[test]
        fn test_synthesis_is_order_independent(
            raw in proptest::collection::vec("vpce-[a-f0-9]{4}", 0..12),
            seed in any::<u64>(),
        ) {
            let own = own(EndpointBinding::Bound("vpce-own".into()));
            let forward: Vec<EndpointId> = raw.iter().map(|s| EndpointId::from(s.as_str())).collect();

            let mut shuffled = forward.clone();
            // Deterministic rotation + reversal as a permutation
            if !shuffled.is_empty() {
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
            }
            shuffled.reverse();

            let a = synthesize(&own, &forward).unwrap();
            let b = synthesize(&own, &shuffled).unwrap();
            prop_assert_eq!(a.statements(), b.statements());
            prop_assert_eq!(a.document(), b.document());
        }
    }
}
