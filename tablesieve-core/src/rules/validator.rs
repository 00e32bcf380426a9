//! Row-level rule validation.

use super::config::{ReasonPolicy, RuleSet};
use super::constraints::CompiledConstraint;
use crate::Result;
use crate::models::{FAILURE_REASON_COLUMN, RecordTable, Value};

/// Separator between reasons when every failure is recorded.
pub const REASON_SEPARATOR: &str = "; ";

/// Result of splitting a table into passing and failing rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationOutcome {
    /// Rows satisfying every applicable constraint, in input order
    pub valid: RecordTable,
    /// Failing rows with a trailing `failure_reason` column, in input order
    pub invalid: RecordTable,
}

impl ValidationOutcome {
    fn empty(columns: &[String]) -> Self {
        let mut annotated = columns.to_vec();
        annotated.push(FAILURE_REASON_COLUMN.to_string());
        Self {
            valid: RecordTable::new(columns.to_vec()),
            invalid: RecordTable::new(annotated),
        }
    }
}

/// Applies a [`RuleSet`] to tables.
///
/// Constructing the validator compiles every pattern, so configuration
/// mistakes surface before any row is checked.
#[derive(Debug, Clone)]
pub struct RuleValidator {
    policy: ReasonPolicy,
    defaults: Vec<CompiledConstraint>,
    columns: Vec<(String, Vec<CompiledConstraint>)>,
}

impl RuleValidator {
    /// Prepares a rule set for evaluation.
    ///
    /// # Errors
    /// Returns a configuration error for invalid patterns or inverted ranges.
    pub fn new(rules: &RuleSet) -> Result<Self> {
        let defaults = rules
            .defaults
            .iter()
            .map(CompiledConstraint::compile)
            .collect::<Result<Vec<_>>>()?;
        let columns = rules
            .columns
            .iter()
            .map(|(name, constraints)| {
                let compiled = constraints
                    .iter()
                    .map(CompiledConstraint::compile)
                    .collect::<Result<Vec<_>>>()?;
                Ok((name.clone(), compiled))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            policy: rules.reason_policy,
            defaults,
            columns,
        })
    }

    /// Reason recording policy in effect.
    pub fn policy(&self) -> ReasonPolicy {
        self.policy
    }

    /// Splits a table into valid and invalid rows.
    ///
    /// Rules naming a column the table does not have are skipped with a
    /// warning. Constraints run in table column order, and within a column
    /// the defaults come before the column's own list.
    pub fn validate(&self, table: &RecordTable) -> ValidationOutcome {
        if table.is_empty() {
            return ValidationOutcome::empty(&table.columns);
        }

        for (name, _) in &self.columns {
            if table.column_index(name).is_none() {
                tracing::warn!("Rule column '{}' not present in input, skipping", name);
            }
        }

        let plan: Vec<(usize, &str, Vec<&CompiledConstraint>)> = table
            .columns
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let own = self
                    .columns
                    .iter()
                    .find(|(rule_column, _)| rule_column == name)
                    .map(|(_, c)| c.as_slice())
                    .unwrap_or_default();
                let constraints: Vec<_> = self.defaults.iter().chain(own).collect();
                (!constraints.is_empty()).then_some((idx, name.as_str(), constraints))
            })
            .collect();

        let mut valid_rows = Vec::new();
        let mut invalid_rows = Vec::new();
        let mut reasons = Vec::new();

        for (row_idx, row) in table.rows.iter().enumerate() {
            match self.row_reason(row, &plan) {
                Some(reason) => {
                    invalid_rows.push(row_idx);
                    reasons.push(reason);
                }
                None => valid_rows.push(row_idx),
            }
        }

        tracing::debug!(
            "Rule validation: {} valid, {} invalid",
            valid_rows.len(),
            invalid_rows.len()
        );

        ValidationOutcome {
            valid: table.select_rows(&valid_rows),
            invalid: table.select_annotated(&invalid_rows, &reasons),
        }
    }

    fn row_reason(
        &self,
        row: &[Value],
        plan: &[(usize, &str, Vec<&CompiledConstraint>)],
    ) -> Option<String> {
        let mut failures = Vec::new();
        for (idx, column, constraints) in plan {
            let value = row.get(*idx).unwrap_or(&Value::Null);
            for constraint in constraints {
                if let Some(message) = constraint.check(value) {
                    let reason = format!("{}: {}", column, message);
                    if self.policy == ReasonPolicy::First {
                        return Some(reason);
                    }
                    failures.push(reason);
                }
            }
        }
        (!failures.is_empty()).then(|| failures.join(REASON_SEPARATOR))
    }
}

/// Validates a table with a rule set in one call.
pub fn apply_rules(table: &RecordTable, rules: &RuleSet) -> Result<ValidationOutcome> {
    Ok(RuleValidator::new(rules)?.validate(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Constraint;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RecordTable {
        RecordTable::from_text_records(
            columns.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn not_null(columns: &[&str]) -> RuleSet {
        columns.iter().fold(RuleSet::new(), |rules, c| {
            rules.with_column(*c, vec![Constraint::NotNull])
        })
    }

    #[test]
    fn test_not_null_split() {
        let input = table(
            &["customer_id", "email"],
            &[&["C1", "a@x.io"], &["C2", ""], &["C3", "c@x.io"]],
        );
        let outcome = apply_rules(&input, &not_null(&["email"])).unwrap();

        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.invalid.len(), 1);
        assert_eq!(
            outcome.invalid.get(0, FAILURE_REASON_COLUMN),
            Some(&Value::Text("email: NULL not allowed".to_string()))
        );
        assert_eq!(
            outcome.invalid.get(0, "customer_id"),
            Some(&Value::Text("C2".to_string()))
        );
    }

    #[test]
    fn test_partition_preserves_order() {
        let input = table(
            &["id", "v"],
            &[&["1", ""], &["2", "x"], &["3", ""], &["4", "y"], &["5", "z"]],
        );
        let outcome = apply_rules(&input, &not_null(&["v"])).unwrap();

        let ids = |t: &RecordTable| -> Vec<String> {
            t.column_values(0).map(Value::render).collect()
        };
        assert_eq!(ids(&outcome.valid), vec!["2", "4", "5"]);
        assert_eq!(ids(&outcome.invalid), vec!["1", "3"]);
        assert_eq!(outcome.valid.len() + outcome.invalid.len(), input.len());
    }

    #[test]
    fn test_first_reason_follows_column_order() {
        let input = table(&["a", "b"], &[&["", ""]]);
        // Rule map order differs from table column order
        let rules = not_null(&["b", "a"]);
        let outcome = apply_rules(&input, &rules).unwrap();

        assert_eq!(
            outcome.invalid.get(0, FAILURE_REASON_COLUMN),
            Some(&Value::Text("a: NULL not allowed".to_string()))
        );
    }

    #[test]
    fn test_all_reasons_policy() {
        let input = table(&["a", "b"], &[&["", ""]]);
        let rules = not_null(&["a", "b"]).with_reason_policy(ReasonPolicy::All);
        let outcome = apply_rules(&input, &rules).unwrap();

        assert_eq!(
            outcome.invalid.get(0, FAILURE_REASON_COLUMN),
            Some(&Value::Text(
                "a: NULL not allowed; b: NULL not allowed".to_string()
            ))
        );
    }

    #[test]
    fn test_defaults_apply_to_every_column() {
        let input = table(&["a", "b"], &[&["ok", "toolong"], &["ok", "ok"]]);
        let rules = RuleSet::new().with_defaults(vec![Constraint::MaxLength { max: 3 }]);
        let outcome = apply_rules(&input, &rules).unwrap();

        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(
            outcome.invalid.get(0, FAILURE_REASON_COLUMN),
            Some(&Value::Text(
                "b: value length 7 exceeds maximum 3".to_string()
            ))
        );
    }

    #[test]
    fn test_missing_rule_column_is_ignored() {
        let input = table(&["a"], &[&["1"], &[""]]);
        let outcome = apply_rules(&input, &not_null(&["ghost"])).unwrap();
        assert_eq!(outcome.valid.len(), 2);
        assert!(outcome.invalid.is_empty());
    }

    #[test]
    fn test_no_rules_everything_valid() {
        let input = table(&["a"], &[&[""], &["x"]]);
        let outcome = apply_rules(&input, &RuleSet::new()).unwrap();
        assert_eq!(outcome.valid, input);
        assert!(outcome.invalid.is_empty());
    }

    #[test]
    fn test_empty_input_short_circuits() {
        let input = RecordTable::new(vec!["a".to_string()]);
        let outcome = apply_rules(&input, &not_null(&["a"])).unwrap();

        assert!(outcome.valid.is_empty());
        assert!(outcome.invalid.is_empty());
        assert_eq!(outcome.valid.columns, vec!["a".to_string()]);
        assert_eq!(
            outcome.invalid.columns,
            vec!["a".to_string(), FAILURE_REASON_COLUMN.to_string()]
        );
    }

    #[test]
    fn test_invalid_pattern_fails_before_rows() {
        let rules = RuleSet::new().with_column(
            "a",
            vec![Constraint::Pattern {
                regex: "[".to_string(),
            }],
        );
        assert!(RuleValidator::new(&rules).is_err());
    }
}
