use std::fmt;
use std::marker::PhantomData;

use isthmus_primitives::{
    ApiUrl, EndpointId, ExecuteArn, IntentId, LinkId, PolicyDocument, ResourceId, RoleArn,
};

use crate::{OutputKey, ReferenceSlot};

/// A value type a step can publish.
pub trait OutputType: Sized {
    const KEY: OutputKey;

    fn from_output(value: &str) -> Self;

    fn as_output(&self) -> &str;
}

macro_rules! output_type {
    ($($ty:ident => $key:ident),+ $(,)?) => {
        $(
            impl OutputType for $ty {
                const KEY: OutputKey = OutputKey::$key;

                fn from_output(value: &str) -> Self {
                    $ty::from(value)
                }

                fn as_output(&self) -> &str {
                    self.as_str()
                }
            }
        )+
    };
}

output_type! {
    ResourceId => ResourceId,
    EndpointId => EndpointId,
    LinkId => LinkId,
    RoleArn => RoleArn,
    ApiUrl => ApiUrl,
    ExecuteArn => ExecuteArn,
    PolicyDocument => PolicyDocument,
}

/// Typed handle on an output another step will publish.
///
/// Holding a `Reference` never reads anything; the value is only available
/// from [`ResolvedOutputs`](crate::ResolvedOutputs) after the producer
/// completed.
pub struct Reference<T> {
    producer: IntentId,
    _output: PhantomData<fn() -> T>,
}

impl<T: OutputType> Reference<T> {
    pub fn new(producer: impl Into<IntentId>) -> Self {
        Self {
            producer: producer.into(),
            _output: PhantomData,
        }
    }

    pub fn producer(&self) -> &IntentId {
        &self.producer
    }

    pub fn key(&self) -> OutputKey {
        T::KEY
    }

    pub fn slot(&self, attribute: impl Into<String>) -> ReferenceSlot {
        ReferenceSlot {
            attribute: attribute.into(),
            producer: self.producer.clone(),
            output: T::KEY,
        }
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.producer == other.producer
    }
}

impl<T> Eq for Reference<T> {}

impl<T: OutputType> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("producer", &self.producer)
            .field("output", &T::KEY)
            .finish()
    }
}
