//! Registry-wide dispatch options.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opkit_core::{ClockSource, FixedClock, SharedValidator, SystemClock};

/// Options applied to every call on a registry.
///
/// Defaults: system clock, input and output validation off, no custom field
/// validators.
#[derive(Clone)]
pub struct DispatchOptions {
    /// Source of the execution time injected at the start of each call.
    pub clock: Arc<dyn ClockSource>,
    pub validate_input: bool,
    pub validate_output: bool,
    /// Extra per-field rules, run before the built-in rules on every field.
    pub field_validators: Vec<SharedValidator>,
}

impl DispatchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the execution time of every call to `t`.
    #[must_use]
    pub fn with_fixed_time(mut self, t: DateTime<Utc>) -> Self {
        self.clock = Arc::new(FixedClock(t));
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_input_validation(mut self, enabled: bool) -> Self {
        self.validate_input = enabled;
        self
    }

    #[must_use]
    pub fn with_output_validation(mut self, enabled: bool) -> Self {
        self.validate_output = enabled;
        self
    }

    #[must_use]
    pub fn with_field_validator(mut self, validator: SharedValidator) -> Self {
        self.field_validators.push(validator);
        self
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            validate_input: false,
            validate_output: false,
            field_validators: Vec::new(),
        }
    }
}

impl fmt::Debug for DispatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("clock_now", &self.clock.now())
            .field("validate_input", &self.validate_input)
            .field("validate_output", &self.validate_output)
            .field("field_validators", &self.field_validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use opkit_core::{FieldDescriptor, Value, Violation};

    use super::*;

    #[test]
    fn defaults_disable_validation() {
        let opts = DispatchOptions::default();
        assert!(!opts.validate_input);
        assert!(!opts.validate_output);
        assert!(opts.field_validators.is_empty());
    }

    #[test]
    fn fixed_time_replaces_clock() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let opts = DispatchOptions::new().with_fixed_time(t);
        assert_eq!(opts.clock.now(), t);
    }

    #[test]
    fn builder_methods_compose() {
        let noop: SharedValidator =
            Arc::new(|_: &Value, _: &FieldDescriptor| -> Result<(), Violation> { Ok(()) });
        let opts = DispatchOptions::new()
            .with_input_validation(true)
            .with_output_validation(true)
            .with_field_validator(noop);
        assert!(opts.validate_input && opts.validate_output);
        assert_eq!(opts.field_validators.len(), 1);
        assert!(format!("{opts:?}").contains("field_validators: 1"));
    }
}
