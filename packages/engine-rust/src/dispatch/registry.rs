//! Operation registry and the per-call execution pipeline.

use std::any::{type_name, TypeId};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opkit_core::{validate, ExecutionContext, SharedValidator, TypeDescriptor, Value};
use tracing::debug;

use super::config::DispatchOptions;
use super::export::{self, ApiSchema};
use super::hooks::{self, Group, GroupHooks};
use super::operation::{Descriptor, DispatchError, Operation, Phase};
use super::payload::{Input, Output, Payload};

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The registry state a single call runs against: the root group and the
/// dispatch options.
///
/// Handed to [`Descriptor::call`], which re-enters the typed world and calls
/// back into the pipeline. Untyped calls also set `encoded`, so the output is
/// converted to a [`Value`] before the after hooks see a success.
pub struct Pipeline<'a> {
    root: &'a Group,
    options: &'a DispatchOptions,
    encoded: Option<OnceCell<Value>>,
}

impl Pipeline<'_> {
    /// Executes one call.
    ///
    /// Order: inject execution time; group before hooks (root first, then
    /// declared groups); operation before hooks; input validation;
    /// cancellation check; handler; output validation; group after hooks in
    /// reverse group order; operation after hooks. Any failure runs group
    /// error hooks in reverse group order, then operation error hooks, and
    /// returns the original error.
    pub(crate) fn run<I: Input, O: Output>(
        &self,
        op: &Operation<I, O>,
        mut ctx: ExecutionContext,
        mut input: I,
    ) -> Result<O, DispatchError> {
        ctx.set_execute_time(self.options.clock.now());

        let groups: Vec<&Group> = std::iter::once(self.root)
            .chain(op.groups.iter().map(Arc::as_ref))
            .collect();

        match self.drive(op, &groups, &mut ctx, &mut input) {
            Ok(output) => Ok(output),
            Err(err) => {
                hooks::run_error(&groups, &ctx, op, &input, &err);
                op.hooks.run_error(&ctx, &input, &err);
                Err(err)
            }
        }
    }

    fn drive<I: Input, O: Output>(
        &self,
        op: &Operation<I, O>,
        groups: &[&Group],
        ctx: &mut ExecutionContext,
        input: &mut I,
    ) -> Result<O, DispatchError> {
        hooks::run_before(groups, ctx, op, &mut *input)?;
        op.hooks.run_before(ctx, input)?;

        if self.options.validate_input {
            self.check(&op.name, Phase::Input, &*input, &I::describe())?;
        }

        ctx.check().map_err(|reason| DispatchError::Cancelled {
            operation: op.name.clone(),
            reason,
        })?;

        let output = op
            .handler
            .execute(ctx, input)
            .map_err(DispatchError::Handler)?;

        if self.options.validate_output || self.encoded.is_some() {
            let value = encode(&op.name, Phase::Output, &output)?;
            if self.options.validate_output {
                self.validate_value(&op.name, Phase::Output, &value, &O::describe())?;
            }
            if let Some(slot) = &self.encoded {
                // A pipeline serves one call, so the slot is always empty here.
                let _ = slot.set(value);
            }
        }

        hooks::run_after(groups, ctx, op, &*input, &output);
        op.hooks.run_after(ctx, input, &output);
        Ok(output)
    }

    fn check(
        &self,
        operation: &str,
        phase: Phase,
        payload: &dyn Payload,
        schema: &TypeDescriptor,
    ) -> Result<(), DispatchError> {
        let value = encode(operation, phase, payload)?;
        self.validate_value(operation, phase, &value, schema)
    }

    fn validate_value(
        &self,
        operation: &str,
        phase: Phase,
        value: &Value,
        schema: &TypeDescriptor,
    ) -> Result<(), DispatchError> {
        validate(value, schema, &self.options.field_validators).map_err(|source| {
            DispatchError::Validation {
                operation: operation.to_string(),
                phase,
                source,
            }
        })
    }
}

fn encode(operation: &str, phase: Phase, payload: &dyn Payload) -> Result<Value, DispatchError> {
    payload.to_value().map_err(|e| DispatchError::InvalidShape {
        operation: operation.to_string(),
        reason: format!("{phase} cannot be converted: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of registered operations plus the root group and options.
///
/// Built once through [`RegistryBuilder`] and read-only afterwards, so a
/// shared `Arc<Registry>` can serve concurrent calls without locking.
pub struct Registry {
    description: String,
    operations: HashMap<String, Arc<dyn Descriptor>>,
    root: Group,
    options: DispatchOptions,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The registry-wide group whose hooks wrap every operation.
    #[must_use]
    pub fn root(&self) -> &Group {
        &self.root
    }

    #[must_use]
    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All operations, sorted by operation name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<dyn Descriptor>> {
        let mut ops: Vec<_> = self.operations.values().cloned().collect();
        ops.sort_by(|a, b| a.operation().cmp(b.operation()));
        ops
    }

    #[must_use]
    pub fn get(&self, operation: &str) -> Option<Arc<dyn Descriptor>> {
        self.operations.get(operation).cloned()
    }

    /// First operation, in name order, whose input and output types are `I` and `O`.
    #[must_use]
    pub fn find_by_types<I: 'static, O: 'static>(&self) -> Option<Arc<dyn Descriptor>> {
        let (input, output) = (TypeId::of::<I>(), TypeId::of::<O>());
        self.list()
            .into_iter()
            .find(|d| d.input_type() == input && d.output_type() == output)
    }

    /// Invokes an operation by name with an untyped input.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown name,
    /// [`DispatchError::InvalidShape`] if `input` does not decode into the
    /// operation's input type, or any error raised during the call.
    pub fn invoke(
        &self,
        ctx: ExecutionContext,
        operation: &str,
        input: Value,
    ) -> Result<Value, DispatchError> {
        let desc = self.lookup(operation)?;
        let input = desc.decode_input(input)?;
        let pipeline = Pipeline {
            encoded: Some(OnceCell::new()),
            ..self.pipeline()
        };
        let output = self.dispatch(&pipeline, desc.as_ref(), ctx, input)?;
        match pipeline.encoded.and_then(OnceCell::into_inner) {
            Some(value) => Ok(value),
            None => encode(operation, Phase::Output, output.as_ref()),
        }
    }

    /// Invokes an operation by name with an already-typed, boxed input.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub fn invoke_payload(
        &self,
        ctx: ExecutionContext,
        operation: &str,
        input: Box<dyn Payload>,
    ) -> Result<Box<dyn Payload>, DispatchError> {
        let desc = self.lookup(operation)?;
        self.dispatch(&self.pipeline(), desc.as_ref(), ctx, input)
    }

    /// Invokes an operation by name and casts the result to `O`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::TypeMismatch`] if the operation's output is
    /// not an `O`, otherwise as [`invoke`](Self::invoke).
    pub fn invoke_as<I: Payload, O: Payload>(
        &self,
        ctx: ExecutionContext,
        operation: &str,
        input: I,
    ) -> Result<O, DispatchError> {
        let output = self.invoke_payload(ctx, operation, Box::new(input))?;
        downcast_output(operation, output)
    }

    /// Invokes the operation selected by its input and output types.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] if no operation has the type pair
    /// `(I, O)`, otherwise any error raised during the call.
    pub fn invoke_typed<I: Payload, O: Payload>(
        &self,
        ctx: ExecutionContext,
        input: I,
    ) -> Result<O, DispatchError> {
        let desc = self
            .find_by_types::<I, O>()
            .ok_or_else(|| DispatchError::NotFound {
                target: format!("{} -> {}", type_name::<I>(), type_name::<O>()),
            })?;
        let output = self.dispatch(&self.pipeline(), desc.as_ref(), ctx, Box::new(input))?;
        downcast_output(desc.operation(), output)
    }

    /// Schema document for every operation, keyed and ordered by name.
    #[must_use]
    pub fn export(&self) -> ApiSchema {
        export::export(self)
    }

    fn lookup(&self, operation: &str) -> Result<Arc<dyn Descriptor>, DispatchError> {
        self.get(operation).ok_or_else(|| DispatchError::NotFound {
            target: operation.to_string(),
        })
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            root: &self.root,
            options: &self.options,
            encoded: None,
        }
    }

    fn dispatch(
        &self,
        pipeline: &Pipeline<'_>,
        desc: &dyn Descriptor,
        ctx: ExecutionContext,
        input: Box<dyn Payload>,
    ) -> Result<Box<dyn Payload>, DispatchError> {
        let started = Instant::now();
        let result = desc.call(pipeline, ctx, input);
        let duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => debug!(operation = desc.operation(), duration_us, "operation completed"),
            Err(e) => debug!(
                operation = desc.operation(),
                duration_us,
                error = %e,
                "operation failed"
            ),
        }
        result
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .list()
            .iter()
            .map(|d| d.operation().to_string())
            .collect();
        f.debug_struct("Registry")
            .field("description", &self.description)
            .field("operations", &names)
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

fn downcast_output<O: Payload>(
    operation: &str,
    output: Box<dyn Payload>,
) -> Result<O, DispatchError> {
    let found = output.type_name();
    output
        .into_any()
        .downcast::<O>()
        .map(|o| *o)
        .map_err(|_| DispatchError::TypeMismatch {
            operation: operation.to_string(),
            expected: type_name::<O>(),
            found,
        })
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Registry`].
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry {
                description: String::new(),
                operations: HashMap::new(),
                root: Group::root(),
                options: DispatchOptions::default(),
            },
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.registry.description = description.into();
        self
    }

    /// Appends a whole hook set to the root group, after any hooks already
    /// installed there.
    #[must_use]
    pub fn extend_hooks(mut self, hooks: GroupHooks) -> Self {
        self.registry.root.hooks_mut().extend(hooks);
        self
    }

    #[must_use]
    pub fn add_before_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &dyn Descriptor, &mut dyn Payload) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.registry.root.hooks_mut().add_before(hook);
        self
    }

    #[must_use]
    pub fn add_after_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &dyn Payload)
            + Send
            + Sync
            + 'static,
    {
        self.registry.root.hooks_mut().add_after(hook);
        self
    }

    #[must_use]
    pub fn add_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &DispatchError)
            + Send
            + Sync
            + 'static,
    {
        self.registry.root.hooks_mut().add_error(hook);
        self
    }

    /// Replaces all dispatch options.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.registry.options = options;
        self
    }

    #[must_use]
    pub fn with_fixed_time(mut self, t: DateTime<Utc>) -> Self {
        self.registry.options = self.registry.options.with_fixed_time(t);
        self
    }

    #[must_use]
    pub fn enable_input_validation(mut self) -> Self {
        self.registry.options.validate_input = true;
        self
    }

    #[must_use]
    pub fn enable_output_validation(mut self) -> Self {
        self.registry.options.validate_output = true;
        self
    }

    #[must_use]
    pub fn add_field_validator(mut self, validator: SharedValidator) -> Self {
        self.registry.options.field_validators.push(validator);
        self
    }

    /// Registers an operation. A later registration under the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn register<D: Descriptor + 'static>(self, operation: D) -> Self {
        self.register_shared(Arc::new(operation))
    }

    #[must_use]
    pub fn register_shared(mut self, operation: Arc<dyn Descriptor>) -> Self {
        let name = operation.operation().to_string();
        if self
            .registry
            .operations
            .insert(name.clone(), operation)
            .is_some()
        {
            debug!(operation = %name, "replaced previously registered operation");
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        debug!(
            operations = self.registry.operations.len(),
            validate_input = self.registry.options.validate_input,
            validate_output = self.registry.options.validate_output,
            "registry built"
        );
        self.registry
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
