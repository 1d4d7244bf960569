//! Resource policy for the exposed API.
//!
//! The policy is always exactly two statements built from one shared set of
//! endpoint identities: deny anything whose source endpoint is outside the
//! set, then allow anything inside it. [`synthesize`] is pure; [`ApiAccess`]
//! holds the live [`ExposedApi`] and replaces its policy wholesale whenever
//! the authorized set changes.

mod access;
mod error;
mod statement;
mod synthesize;

pub use access::{ApiAccess, ExposedApi};
pub use error::PolicyError;
pub use statement::{
    AccessPolicyStatement, Condition, Effect, INVOKE_ACTION, Principal, RESOURCE_SCOPE,
    SOURCE_ENDPOINT_KEY,
};
pub use synthesize::{ResourcePolicy, synthesize};
