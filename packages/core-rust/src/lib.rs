//! `opkit` core: runtime schema model, field validation, payload values, and execution context.

pub mod clock;
pub mod context;
pub mod schema;
pub mod types;
pub mod validate;

pub use clock::{ClockSource, FixedClock, SystemClock};
pub use context::{CancelReason, ExecutionContext};
pub use schema::{
    describe, describe_value, parse_annotations, Annotations, Describe, FieldDescriptor, Kind,
    TypeDescriptor,
};
pub use types::Value;
pub use tokio_util::sync::CancellationToken;
pub use validate::{
    validate, FieldValidator, PatternValidator, Rule, SharedValidator, ValidationError, Violation,
};
