//! Type-erased operation payloads.
//!
//! Inputs and outputs travel through the dispatcher as `dyn Payload`, which
//! any `Debug + Serialize` value implements. Group hooks see payloads only in
//! this erased form; they can log them, convert them to a [`Value`], or
//! downcast to a concrete type they know about.

use std::any::{type_name, Any};
use std::fmt;

use opkit_core::{Describe, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An opaque operation input or output.
pub trait Payload: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Converts the payload into a generic [`Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the payload's `Serialize` impl fails.
    fn to_value(&self) -> Result<Value, serde_json::Error>;

    /// Rust type name of the concrete payload.
    fn type_name(&self) -> &'static str;
}

impl<T> Payload for T
where
    T: Any + fmt::Debug + Serialize + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        Value::from_serialize(self)
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl dyn Payload {
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Bounds for an operation's input type.
pub trait Input: Payload + Describe + DeserializeOwned {}

impl<T> Input for T where T: Payload + Describe + DeserializeOwned {}

/// Bounds for an operation's output type.
pub trait Output: Payload + Describe {}

impl<T> Output for T where T: Payload + Describe {}
