//! `opkit` engine: operation registry, two-tier hooks, schema export, and the
//! CLI, Tower and logging adapters built on top of them.

pub mod cli;
pub mod dispatch;
pub mod logging;

pub use dispatch::{
    Descriptor, DispatchError, DispatchOptions, Group, GroupHooks, Handler, Operation, Registry,
    RegistryBuilder,
};
