use std::collections::BTreeSet;

use isthmus_primitives::EndpointId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::Display;

/// Action gated by the policy.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// Every method and stage of the API.
pub const RESOURCE_SCOPE: &str = "execute-api:/*";

/// Request context key carrying the endpoint the request arrived through.
pub const SOURCE_ENDPOINT_KEY: &str = "aws:sourceVpce";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Effect {
    Deny,
    Allow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    #[default]
    Any,
}

/// Source-endpoint match applied by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    SourceEndpointNotIn,
    SourceEndpointIn,
}

impl Condition {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::SourceEndpointNotIn => "StringNotEquals",
            Self::SourceEndpointIn => "StringEquals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicyStatement {
    pub effect: Effect,
    pub principal: Principal,
    pub actions: Vec<String>,
    pub resource_scope: String,
    pub condition: Condition,
    pub matched_endpoint_ids: BTreeSet<EndpointId>,
}

impl AccessPolicyStatement {
    /// Render as a policy-document statement.
    pub fn to_json(&self) -> Value {
        let principal = match self.principal {
            Principal::Any => json!({ "AWS": "*" }),
        };
        let ids: Vec<&str> = self.matched_endpoint_ids.iter().map(|id| id.as_str()).collect();
        let mut matcher = Map::new();
        matcher.insert(SOURCE_ENDPOINT_KEY.to_owned(), json!(ids));
        let mut condition = Map::new();
        condition.insert(self.condition.operator().to_owned(), Value::Object(matcher));

        json!({
            "Effect": self.effect.to_string(),
            "Principal": principal,
            "Action": self.actions,
            "Resource": [self.resource_scope],
            "Condition": condition,
        })
    }
}
