//! Two-tier hook model.
//!
//! **Group hooks** are untyped: they see the operation through its
//! [`Descriptor`] and the payloads as `dyn Payload`. A group is a named
//! bundle of hooks; every registry owns a root group (`"root"`) that applies
//! to all operations, and operations may declare further groups.
//!
//! **Operation hooks** are typed against one operation's input and output.
//!
//! Sweep order for one call with groups `[root, g1, .., gn]`:
//!
//! - before: group hooks in group order, then operation hooks
//! - after: group hooks in reverse group order, then operation hooks
//! - error: group hooks in reverse group order, then operation hooks
//!
//! Within a single group, hooks of one kind run in insertion order.

use std::fmt;

use opkit_core::ExecutionContext;
use serde::{Serialize, Serializer};

use super::operation::{Descriptor, DispatchError};
use super::payload::Payload;

/// Name of the registry-wide group.
pub const ROOT_GROUP: &str = "root";

// ---------------------------------------------------------------------------
// Group hook signatures
// ---------------------------------------------------------------------------

/// Runs before the handler. May mutate the input and the context; an error
/// aborts the call.
pub type BeforeHook = Box<
    dyn Fn(&mut ExecutionContext, &dyn Descriptor, &mut dyn Payload) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// Observes a successful call: context, descriptor, input, output.
pub type AfterHook =
    Box<dyn Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &dyn Payload) + Send + Sync>;

/// Observes a failed call: context, descriptor, input, error.
pub type ErrorHook =
    Box<dyn Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &DispatchError) + Send + Sync>;

// ---------------------------------------------------------------------------
// GroupHooks
// ---------------------------------------------------------------------------

/// Ordered before/after/error hook lists for one group.
#[derive(Default)]
pub struct GroupHooks {
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    error: Vec<ErrorHook>,
}

impl GroupHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext, &dyn Descriptor, &mut dyn Payload) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.before.push(Box::new(hook));
        self
    }

    pub fn add_after<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &dyn Payload)
            + Send
            + Sync
            + 'static,
    {
        self.after.push(Box::new(hook));
        self
    }

    pub fn add_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &DispatchError)
            + Send
            + Sync
            + 'static,
    {
        self.error.push(Box::new(hook));
        self
    }

    /// Builder form of [`add_before`](Self::add_before).
    #[must_use]
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &dyn Descriptor, &mut dyn Payload) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.add_before(hook);
        self
    }

    /// Builder form of [`add_after`](Self::add_after).
    #[must_use]
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &dyn Payload)
            + Send
            + Sync
            + 'static,
    {
        self.add_after(hook);
        self
    }

    /// Builder form of [`add_error`](Self::add_error).
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &DispatchError)
            + Send
            + Sync
            + 'static,
    {
        self.add_error(hook);
        self
    }

    /// Appends all of `other`'s hooks after this set's own.
    pub fn extend(&mut self, other: GroupHooks) {
        self.before.extend(other.before);
        self.after.extend(other.after);
        self.error.extend(other.error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.error.is_empty()
    }
}

impl fmt::Debug for GroupHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupHooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("error", &self.error.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A named bundle of hooks shared by the operations that declare it.
///
/// Groups are usually wrapped in an `Arc` and handed to several operation
/// builders. In exported schemas a group appears as its name alone.
#[derive(Debug)]
pub struct Group {
    name: String,
    hooks: GroupHooks,
}

impl Group {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_hooks(name, GroupHooks::new())
    }

    #[must_use]
    pub fn with_hooks(name: impl Into<String>, hooks: GroupHooks) -> Self {
        Self {
            name: name.into(),
            hooks,
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(ROOT_GROUP)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn hooks(&self) -> &GroupHooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut GroupHooks {
        &mut self.hooks
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Group sweeps
// ---------------------------------------------------------------------------

/// Runs every group's before hooks in group order, stopping at the first error.
pub(crate) fn run_before(
    groups: &[&Group],
    ctx: &mut ExecutionContext,
    desc: &dyn Descriptor,
    input: &mut dyn Payload,
) -> Result<(), DispatchError> {
    for group in groups {
        for hook in &group.hooks.before {
            hook(&mut *ctx, desc, &mut *input).map_err(DispatchError::Hook)?;
        }
    }
    Ok(())
}

pub(crate) fn run_after(
    groups: &[&Group],
    ctx: &ExecutionContext,
    desc: &dyn Descriptor,
    input: &dyn Payload,
    output: &dyn Payload,
) {
    for group in groups.iter().rev() {
        for hook in &group.hooks.after {
            hook(ctx, desc, input, output);
        }
    }
}

pub(crate) fn run_error(
    groups: &[&Group],
    ctx: &ExecutionContext,
    desc: &dyn Descriptor,
    input: &dyn Payload,
    err: &DispatchError,
) {
    for group in groups.iter().rev() {
        for hook in &group.hooks.error {
            hook(ctx, desc, input, err);
        }
    }
}

// ---------------------------------------------------------------------------
// OperationHooks
// ---------------------------------------------------------------------------

type LocalBefore<I> = Box<dyn Fn(&mut ExecutionContext, &mut I) -> anyhow::Result<()> + Send + Sync>;
type LocalAfter<I, O> = Box<dyn Fn(&ExecutionContext, &I, &O) + Send + Sync>;
type LocalError<I> = Box<dyn Fn(&ExecutionContext, &I, &DispatchError) + Send + Sync>;

/// Hooks typed against a single operation's input `I` and output `O`.
///
/// They run after the group hooks of the same kind.
pub struct OperationHooks<I, O> {
    before: Vec<LocalBefore<I>>,
    after: Vec<LocalAfter<I, O>>,
    error: Vec<LocalError<I>>,
}

impl<I, O> OperationHooks<I, O> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            error: Vec::new(),
        }
    }

    pub fn add_before<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext, &mut I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before.push(Box::new(hook));
        self
    }

    pub fn add_after<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &I, &O) + Send + Sync + 'static,
    {
        self.after.push(Box::new(hook));
        self
    }

    pub fn add_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &I, &DispatchError) + Send + Sync + 'static,
    {
        self.error.push(Box::new(hook));
        self
    }

    pub(crate) fn run_before(
        &self,
        ctx: &mut ExecutionContext,
        input: &mut I,
    ) -> Result<(), DispatchError> {
        for hook in &self.before {
            hook(&mut *ctx, &mut *input).map_err(DispatchError::Hook)?;
        }
        Ok(())
    }

    pub(crate) fn run_after(&self, ctx: &ExecutionContext, input: &I, output: &O) {
        for hook in &self.after {
            hook(ctx, input, output);
        }
    }

    pub(crate) fn run_error(&self, ctx: &ExecutionContext, input: &I, err: &DispatchError) {
        for hook in &self.error {
            hook(ctx, input, err);
        }
    }
}

impl<I, O> Default for OperationHooks<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> fmt::Debug for OperationHooks<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("error", &self.error.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
