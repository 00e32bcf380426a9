//! Constraint evaluation against single cell values.

use regex::Regex;

use super::config::Constraint;
use crate::models::{Value, format_number};
use crate::{PipelineError, Result};

/// A constraint prepared for evaluation (patterns compiled once).
#[derive(Debug, Clone)]
pub(crate) enum CompiledConstraint {
    NotNull,
    Range { min: Option<f64>, max: Option<f64> },
    Pattern { source: String, regex: Regex },
    AllowedSet { values: Vec<String> },
    MaxLength { max: usize },
}

impl CompiledConstraint {
    pub(crate) fn compile(constraint: &Constraint) -> Result<Self> {
        Ok(match constraint {
            Constraint::NotNull => Self::NotNull,
            Constraint::Range { min, max } => {
                if let (Some(lo), Some(hi)) = (min, max)
                    && lo > hi
                {
                    return Err(PipelineError::configuration(format!(
                        "Range constraint has min {} greater than max {}",
                        format_number(*lo),
                        format_number(*hi)
                    )));
                }
                Self::Range {
                    min: *min,
                    max: *max,
                }
            }
            Constraint::Pattern { regex } => {
                // Anchor so the whole rendered value has to match
                let anchored = format!("^(?:{})$", regex);
                let compiled = Regex::new(&anchored).map_err(|e| {
                    PipelineError::configuration(format!("Invalid pattern '{}': {}", regex, e))
                })?;
                Self::Pattern {
                    source: regex.clone(),
                    regex: compiled,
                }
            }
            Constraint::AllowedSet { values } => Self::AllowedSet {
                values: values.clone(),
            },
            Constraint::MaxLength { max } => Self::MaxLength { max: *max },
        })
    }

    /// Checks one value, returning the failure message when it is violated.
    ///
    /// Nulls satisfy every constraint except `NotNull`.
    pub(crate) fn check(&self, value: &Value) -> Option<String> {
        match self {
            Self::NotNull => check_not_null(value),
            _ if value.is_null() => None,
            Self::Range { min, max } => check_range(value, *min, *max),
            Self::Pattern { source, regex } => check_pattern(value, source, regex),
            Self::AllowedSet { values } => check_allowed(value, values),
            Self::MaxLength { max } => check_max_length(value, *max),
        }
    }
}

fn check_not_null(value: &Value) -> Option<String> {
    value.is_null().then(|| "NULL not allowed".to_string())
}

fn check_range(value: &Value, min: Option<f64>, max: Option<f64>) -> Option<String> {
    let number = match value {
        Value::Number(n) => *n,
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) => n,
            Err(_) => return Some(format!("value '{}' is not numeric", s)),
        },
        Value::Null => return None,
    };
    if number.is_nan() {
        return Some("value is not a number".to_string());
    }
    if let Some(lo) = min
        && number < lo
    {
        return Some(format!(
            "value {} below minimum {}",
            format_number(number),
            format_number(lo)
        ));
    }
    if let Some(hi) = max
        && number > hi
    {
        return Some(format!(
            "value {} above maximum {}",
            format_number(number),
            format_number(hi)
        ));
    }
    None
}

fn check_pattern(value: &Value, source: &str, regex: &Regex) -> Option<String> {
    let rendered = value.render();
    (!regex.is_match(&rendered))
        .then(|| format!("value '{}' does not match pattern '{}'", rendered, source))
}

fn check_allowed(value: &Value, values: &[String]) -> Option<String> {
    let rendered = value.render();
    (!values.iter().any(|v| *v == rendered))
        .then(|| format!("value '{}' not in allowed set", rendered))
}

fn check_max_length(value: &Value, max: usize) -> Option<String> {
    let length = value.render().chars().count();
    (length > max).then(|| format!("value length {} exceeds maximum {}", length, max))
}
