//! Rule-based row validation.
//!
//! A [`RuleSet`] is loaded from YAML, prepared once by [`RuleValidator`],
//! and applied to a [`crate::RecordTable`] to split it into valid rows and
//! invalid rows annotated with a `failure_reason`.

mod config;
mod constraints;
mod validator;

pub use config::{Constraint, ReasonPolicy, RuleSet};
pub use validator::{REASON_SEPARATOR, RuleValidator, ValidationOutcome, apply_rules};
