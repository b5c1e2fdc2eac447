//! Operations: typed handlers wrapped with metadata and hooks.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use opkit_core::{CancelReason, ExecutionContext, TypeDescriptor, ValidationError, Value};

use super::hooks::{Group, OperationHooks};
use super::payload::{Input, Output, Payload};
use super::registry::Pipeline;

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Which side of the handler a validation ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Input,
    Output,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Errors returned by a dispatch call.
///
/// Handler and hook errors are carried through unchanged: their `Display` is
/// the original error's, and the original can be recovered with
/// `anyhow::Error::downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown operation: {target}")]
    NotFound { target: String },
    #[error("operation {operation} cannot accept the given payload: {reason}")]
    InvalidShape { operation: String, reason: String },
    #[error("{phase} of {operation} failed validation: {source}")]
    Validation {
        operation: String,
        phase: Phase,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Handler(anyhow::Error),
    #[error(transparent)]
    Hook(anyhow::Error),
    #[error("operation {operation} not executed: {reason}")]
    Cancelled {
        operation: String,
        reason: CancelReason,
    },
    #[error("operation {operation} produced {found}, caller expected {expected}")]
    TypeMismatch {
        operation: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl DispatchError {
    /// The offending field path, for validation failures.
    #[must_use]
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::Validation { source, .. } => Some(&source.path),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// The business logic of one operation.
///
/// Implemented by hand for handler structs that carry dependencies, and
/// automatically for plain closures `Fn(&ExecutionContext, &I) -> anyhow::Result<O>`.
pub trait Handler<I, O>: Send + Sync + 'static {
    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Any error aborts the call and is surfaced as [`DispatchError::Handler`].
    fn execute(&self, ctx: &ExecutionContext, input: &I) -> anyhow::Result<O>;
}

impl<F, I, O> Handler<I, O> for F
where
    F: Fn(&ExecutionContext, &I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &ExecutionContext, input: &I) -> anyhow::Result<O> {
        self(ctx, input)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Type-erased view of a registered operation.
///
/// The registry stores operations behind this trait, and group hooks receive
/// it to learn which operation they are wrapping.
pub trait Descriptor: Send + Sync {
    fn operation(&self) -> &str;

    fn description(&self) -> &str;

    /// Schema of the input type, built fresh on each call.
    fn input(&self) -> TypeDescriptor;

    /// Schema of the output type, built fresh on each call.
    fn output(&self) -> TypeDescriptor;

    /// Declared groups, excluding the root group.
    fn groups(&self) -> &[Arc<Group>];

    fn input_type(&self) -> TypeId;

    fn output_type(&self) -> TypeId;

    fn input_type_name(&self) -> &'static str;

    fn output_type_name(&self) -> &'static str;

    /// Decodes a generic value into this operation's input type.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidShape`] if the value does not fit.
    fn decode_input(&self, input: Value) -> Result<Box<dyn Payload>, DispatchError>;

    /// Runs the operation through `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidShape`] if `input` is not this
    /// operation's input type, otherwise whatever the pipeline reports.
    fn call(
        &self,
        pipeline: &Pipeline<'_>,
        ctx: ExecutionContext,
        input: Box<dyn Payload>,
    ) -> Result<Box<dyn Payload>, DispatchError>;
}

impl fmt::Debug for dyn Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("operation", &self.operation())
            .field("input", &self.input_type_name())
            .field("output", &self.output_type_name())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A handler bound to its name, description, local hooks and groups.
pub struct Operation<I, O> {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) handler: Box<dyn Handler<I, O>>,
    pub(crate) hooks: OperationHooks<I, O>,
    pub(crate) groups: Vec<Arc<Group>>,
}

impl<I: Input, O: Output> Operation<I, O> {
    /// Starts building an operation around `handler`.
    ///
    /// The operation name defaults to the handler's type name.
    pub fn builder<H: Handler<I, O>>(handler: H) -> OperationBuilder<I, O> {
        OperationBuilder::new(handler)
    }

    /// Starts building an operation around a closure.
    ///
    /// Closures have no useful type name, so set one with
    /// [`OperationBuilder::with_operation`].
    pub fn from_fn<F>(handler: F) -> OperationBuilder<I, O>
    where
        F: Fn(&ExecutionContext, &I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        OperationBuilder::new(handler)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<I, O> fmt::Debug for Operation<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("hooks", &self.hooks)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl<I: Input, O: Output> Descriptor for Operation<I, O> {
    fn operation(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input(&self) -> TypeDescriptor {
        I::describe()
    }

    fn output(&self) -> TypeDescriptor {
        O::describe()
    }

    fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    fn input_type(&self) -> TypeId {
        TypeId::of::<I>()
    }

    fn output_type(&self) -> TypeId {
        TypeId::of::<O>()
    }

    fn input_type_name(&self) -> &'static str {
        type_name::<I>()
    }

    fn output_type_name(&self) -> &'static str {
        type_name::<O>()
    }

    fn decode_input(&self, input: Value) -> Result<Box<dyn Payload>, DispatchError> {
        let decoded: I = input
            .deserialize_into()
            .map_err(|e| DispatchError::InvalidShape {
                operation: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(decoded))
    }

    fn call(
        &self,
        pipeline: &Pipeline<'_>,
        ctx: ExecutionContext,
        input: Box<dyn Payload>,
    ) -> Result<Box<dyn Payload>, DispatchError> {
        let found = input.type_name();
        let input = input
            .into_any()
            .downcast::<I>()
            .map_err(|_| DispatchError::InvalidShape {
                operation: self.name.clone(),
                reason: format!("expected {}, got {found}", type_name::<I>()),
            })?;
        let output = pipeline.run(self, ctx, *input)?;
        Ok(Box::new(output))
    }
}

// ---------------------------------------------------------------------------
// OperationBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Operation`].
pub struct OperationBuilder<I, O> {
    op: Operation<I, O>,
}

impl<I: Input, O: Output> OperationBuilder<I, O> {
    fn new<H: Handler<I, O>>(handler: H) -> Self {
        Self {
            op: Operation {
                name: short_type_name(type_name::<H>()).to_string(),
                description: String::new(),
                handler: Box::new(handler),
                hooks: OperationHooks::new(),
                groups: Vec::new(),
            },
        }
    }

    /// Overrides the operation name.
    #[must_use]
    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.op.name = name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.op.description = description.into();
        self
    }

    /// Replaces the operation-local hooks wholesale.
    #[must_use]
    pub fn with_hooks(mut self, hooks: OperationHooks<I, O>) -> Self {
        self.op.hooks = hooks;
        self
    }

    #[must_use]
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &mut I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.op.hooks.add_before(hook);
        self
    }

    #[must_use]
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &I, &O) + Send + Sync + 'static,
    {
        self.op.hooks.add_after(hook);
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &I, &DispatchError) + Send + Sync + 'static,
    {
        self.op.hooks.add_error(hook);
        self
    }

    /// Declares membership in `group`. Groups run in declaration order,
    /// after the root group.
    #[must_use]
    pub fn with_group(mut self, group: Arc<Group>) -> Self {
        self.op.groups.push(group);
        self
    }

    #[must_use]
    pub fn build(self) -> Operation<I, O> {
        self.op
    }
}

/// Last path segment of a type name, ignoring generic arguments.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opkit_core::{describe_struct, Kind, Rule};
    use serde::{Deserialize, Serialize};

    use super::*;

    describe_struct! {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct Greeting {
            pub name: String,
        }
    }

    describe_struct! {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct Reply {
            pub text: String,
        }
    }

    struct Greet;

    impl Handler<Greeting, Reply> for Greet {
        fn execute(&self, _ctx: &ExecutionContext, input: &Greeting) -> anyhow::Result<Reply> {
            Ok(Reply {
                text: format!("hello {}", input.name),
            })
        }
    }

    #[test]
    fn default_name_is_handler_type() {
        let op = Operation::builder(Greet).build();
        assert_eq!(op.name(), "Greet");
        assert_eq!(op.operation(), "Greet");
    }

    #[test]
    fn metadata_comes_from_builder_and_types() {
        let group = Arc::new(Group::new("public"));
        let op = Operation::builder(Greet)
            .with_operation("greet")
            .with_description("Says hello")
            .with_group(group)
            .build();

        assert_eq!(op.operation(), "greet");
        assert_eq!(op.description(), "Says hello");
        assert_eq!(op.groups().len(), 1);
        assert_eq!(op.groups()[0].name(), "public");
        assert_eq!(op.input().kind, Kind::Object);
        assert_eq!(op.input().name, "tests::Greeting");
        assert_eq!(op.output().fields[0].name, "text");
        assert_eq!(op.input_type(), TypeId::of::<Greeting>());
        assert_eq!(op.output_type(), TypeId::of::<Reply>());
    }

    #[test]
    fn closure_handlers_build() {
        let op = Operation::from_fn(|_ctx, input: &Greeting| {
            Ok(Reply {
                text: input.name.to_uppercase(),
            })
        })
        .with_operation("shout")
        .build();
        assert_eq!(op.name(), "shout");

        let reply = op
            .handler
            .execute(&ExecutionContext::new(), &Greeting { name: "ada".into() })
            .unwrap();
        assert_eq!(reply.text, "ADA");
    }

    #[test]
    fn decode_input_rejects_wrong_shape() {
        let op = Operation::builder(Greet).build();
        let decoded = op
            .decode_input(Value::from(serde_json::json!({"name": "ada"})))
            .unwrap();
        assert_eq!(
            decoded.downcast_ref::<Greeting>(),
            Some(&Greeting { name: "ada".into() })
        );

        let err = op
            .decode_input(Value::from(serde_json::json!({"name": 5})))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidShape { .. }));
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name("a::b::SaveUser"), "SaveUser");
        assert_eq!(short_type_name("a::Wrap<b::Inner>"), "Wrap");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn field_path_only_for_validation_errors() {
        let err = DispatchError::Validation {
            operation: "greet".into(),
            phase: Phase::Input,
            source: ValidationError {
                path: "name".into(),
                rule: Rule::Required,
                message: "required".into(),
            },
        };
        assert_eq!(err.field_path(), Some("name"));
        assert!(err.to_string().starts_with("input of greet failed validation"));

        let missing = DispatchError::NotFound {
            target: "nope".into(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.field_path(), None);
    }

    #[test]
    fn handler_errors_display_transparently() {
        let err = DispatchError::Handler(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "disk full");
    }
}
