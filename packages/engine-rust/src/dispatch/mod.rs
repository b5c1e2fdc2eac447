//! Operation dispatch.
//!
//! 1. **Operations** (`operation`): typed handlers plus name, description,
//!    local hooks and group membership, erased behind `Descriptor`
//! 2. **Hooks** (`hooks`): named groups of untyped before/after/error hooks
//! 3. **Registry** (`registry`): name lookup and the per-call pipeline
//! 4. **Options** (`config`): clock, validation toggles, custom field validators
//! 5. **Export** (`export`): registry-wide schema document and help text
//! 6. **Tower adapter** (`service`): `tower::Service` over a shared registry

pub mod config;
pub mod export;
pub mod hooks;
pub mod operation;
pub mod payload;
pub mod registry;
pub mod service;

pub use config::DispatchOptions;
pub use export::{export, render_help, ApiSchema, OperationSchema};
pub use hooks::{AfterHook, BeforeHook, ErrorHook, Group, GroupHooks, OperationHooks, ROOT_GROUP};
pub use operation::{Descriptor, DispatchError, Handler, Operation, OperationBuilder, Phase};
pub use payload::{Input, Output, Payload};
pub use registry::{Pipeline, Registry, RegistryBuilder};
pub use service::{DispatchService, Invocation};
