//! Structured logging: subscriber setup and ready-made logging hooks.
//!
//! The hook constructors return plain closures, so they can be installed on
//! the root group through `RegistryBuilder::add_*_hook` or on any named
//! group through [`GroupHooks`].

use std::borrow::Cow;

use opkit_core::ExecutionContext;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::dispatch::{Descriptor, DispatchError, GroupHooks, Payload};

/// Emits a `tracing` event at a level chosen at runtime.
macro_rules! event_at {
    ($level:expr, $($rest:tt)+) => {{
        let level: Level = $level;
        if level == Level::ERROR {
            tracing::event!(Level::ERROR, $($rest)+);
        } else if level == Level::WARN {
            tracing::event!(Level::WARN, $($rest)+);
        } else if level == Level::INFO {
            tracing::event!(Level::INFO, $($rest)+);
        } else if level == Level::DEBUG {
            tracing::event!(Level::DEBUG, $($rest)+);
        } else {
            tracing::event!(Level::TRACE, $($rest)+);
        }
    }};
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Installing twice
/// is harmless; the first subscriber stays in place.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

// ---------------------------------------------------------------------------
// Logging hooks
// ---------------------------------------------------------------------------

/// Level and message of the events a logging hook emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookLogOptions {
    pub level: Level,
    pub message: Cow<'static, str>,
}

impl HookLogOptions {
    #[must_use]
    pub fn new(level: Level, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = message.into();
        self
    }
}

/// Before hook that logs the operation name and input. Never fails.
pub fn log_before(
    opts: HookLogOptions,
) -> impl Fn(&mut ExecutionContext, &dyn Descriptor, &mut dyn Payload) -> anyhow::Result<()>
       + Send
       + Sync
       + 'static {
    move |_ctx: &mut ExecutionContext,
          desc: &dyn Descriptor,
          input: &mut dyn Payload|
          -> anyhow::Result<()> {
        event_at!(
            opts.level,
            operation = desc.operation(),
            input = ?input,
            "{}",
            opts.message
        );
        Ok(())
    }
}

/// After hook that logs the operation name, input and output.
pub fn log_after(
    opts: HookLogOptions,
) -> impl Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &dyn Payload) + Send + Sync + 'static
{
    move |_ctx: &ExecutionContext, desc: &dyn Descriptor, input: &dyn Payload, output: &dyn Payload| {
        event_at!(
            opts.level,
            operation = desc.operation(),
            input = ?input,
            output = ?output,
            "{}",
            opts.message
        );
    }
}

/// Error hook that logs the operation name, input and error.
pub fn log_error(
    opts: HookLogOptions,
) -> impl Fn(&ExecutionContext, &dyn Descriptor, &dyn Payload, &DispatchError)
       + Send
       + Sync
       + 'static {
    move |_ctx: &ExecutionContext, desc: &dyn Descriptor, input: &dyn Payload, err: &DispatchError| {
        event_at!(
            opts.level,
            operation = desc.operation(),
            input = ?input,
            error = %err,
            "{}",
            opts.message
        );
    }
}

/// The standard trio: debug-level before/after events and error-level failures.
#[must_use]
pub fn logging_hooks() -> GroupHooks {
    GroupHooks::new()
        .before(log_before(HookLogOptions::new(Level::DEBUG, "operation started")))
        .after(log_after(HookLogOptions::new(Level::DEBUG, "operation finished")))
        .on_error(log_error(HookLogOptions::new(Level::ERROR, "operation failed")))
}
