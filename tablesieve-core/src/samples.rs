//! Demo data generation.
//!
//! Produces a customer table and an order table that exercise the pipeline:
//! customer ids follow the `C00001` pattern used by the starter rules, and
//! roughly one order in ten references a customer id that does not exist.
//! Generation is deterministic for a given seed.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::models::{RecordTable, Value};
use crate::{PipelineError, Result};

/// Default number of generated customers.
pub const DEFAULT_CUSTOMERS: usize = 200;

/// Default number of generated orders.
pub const DEFAULT_ORDERS: usize = 500;

/// File name of the generated customer table.
pub const CUSTOMERS_FILE: &str = "sample_customers.csv";

/// File name of the generated order table.
pub const ORDERS_FILE: &str = "sample_orders.csv";

const FIRST_NAMES: &[&str] = &[
    "Liam", "Olivia", "Noah", "Emma", "Oliver", "Ava", "Elijah", "Sophia",
];
const LAST_NAMES: &[&str] = &["Smith", "Jones", "Brown", "Miller", "Davis", "Garcia"];
const COUNTRIES: &[&str] = &["USA", "CAN", "UK", "IND"];
const US_STATES: &[&str] = &["NY", "CA", "TX", "FL"];
const ORDER_STATUSES: &[&str] = &["PENDING", "COMPLETE", "CANCELLED"];

fn pick<'a>(rng: &mut StdRng, choices: &[&'a str]) -> &'a str {
    choices[rng.random_range(0..choices.len())]
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Generates `n` customers.
///
/// Columns: `customer_id`, `first_name`, `last_name`, `age` (18 to 89),
/// `country`, `state` (only set for USA) and `email`.
pub fn generate_customers(n: usize, seed: u64) -> RecordTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (1..=n)
        .map(|i| {
            let first = pick(&mut rng, FIRST_NAMES);
            let last = pick(&mut rng, LAST_NAMES);
            let age = rng.random_range(18..90);
            let country = pick(&mut rng, COUNTRIES);
            let state = if country == "USA" {
                Value::Text(pick(&mut rng, US_STATES).to_string())
            } else {
                Value::Null
            };
            let initial = first.chars().next().unwrap_or('x').to_ascii_lowercase();
            vec![
                Value::Text(format!("C{:05}", i)),
                Value::Text(first.to_string()),
                Value::Text(last.to_string()),
                Value::Number(f64::from(age)),
                Value::Text(country.to_string()),
                state,
                Value::Text(format!(
                    "{}.{}@example.com",
                    initial,
                    last.to_ascii_lowercase()
                )),
            ]
        })
        .collect();

    RecordTable {
        columns: columns(&[
            "customer_id",
            "first_name",
            "last_name",
            "age",
            "country",
            "state",
            "email",
        ]),
        rows,
    }
}

/// Ninety percent of `n`, rounded down.
fn valid_order_count(n: usize) -> usize {
    n.saturating_sub(n.div_ceil(10))
}

/// Generates `n` orders referencing `customers`.
///
/// Ninety percent of the orders (rounded down) use an existing customer id;
/// the rest use dangling `C9999X<i>` ids, shuffled among the valid ones.
/// Order dates are consecutive days from 2024-01-01.
///
/// # Errors
/// Returns a malformed-table error when `customers` is non-empty but has no
/// `customer_id` column.
pub fn generate_orders(n: usize, customers: &RecordTable, seed: u64) -> Result<RecordTable> {
    let mut rng = StdRng::seed_from_u64(seed);

    let customer_ids: Vec<String> = if customers.is_empty() {
        Vec::new()
    } else {
        let idx = customers.column_index("customer_id").ok_or_else(|| {
            PipelineError::malformed("customer table has no customer_id column")
        })?;
        customers
            .column_values(idx)
            .filter(|v| !v.is_null())
            .map(Value::render)
            .collect()
    };

    let valid_count = if customer_ids.is_empty() {
        0
    } else {
        valid_order_count(n)
    };
    let mut order_customers: Vec<String> = (0..valid_count)
        .map(|_| customer_ids[rng.random_range(0..customer_ids.len())].clone())
        .chain((0..n.saturating_sub(valid_count)).map(|i| format!("C9999X{}", i)))
        .collect();
    order_customers.shuffle(&mut rng);

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| PipelineError::configuration("Invalid order start date"))?;

    let rows = order_customers
        .into_iter()
        .enumerate()
        .map(|(i, customer_id)| {
            let amount: f64 = rng.random_range(5.0..500.0);
            let date = start
                .checked_add_days(Days::new(i as u64))
                .map_or(Value::Null, |d| {
                    Value::Text(d.format("%Y-%m-%d").to_string())
                });
            vec![
                Value::Text(format!("O{:06}", i.saturating_add(1))),
                Value::Text(customer_id),
                Value::Number((amount * 100.0).round() / 100.0),
                Value::Text(pick(&mut rng, ORDER_STATUSES).to_string()),
                date,
            ]
        })
        .collect();

    Ok(RecordTable {
        columns: columns(&[
            "order_id",
            "customer_id",
            "total_amount",
            "status",
            "order_date",
        ]),
        rows,
    })
}

/// Paths of written sample files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFiles {
    /// Customer table
    pub customers: PathBuf,
    /// Order table
    pub orders: PathBuf,
}

fn write_table(table: &RecordTable, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io("create", path, e))?;
    table.write_csv(BufWriter::new(file))
}

/// Generates both sample tables and writes them into `dir`.
///
/// Existing sample files are replaced.
pub fn write_samples(
    dir: &Path,
    customers: usize,
    orders: usize,
    seed: u64,
) -> Result<SampleFiles> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io("create", dir, e))?;

    let customer_table = generate_customers(customers, seed);
    let order_table = generate_orders(orders, &customer_table, seed.wrapping_add(1))?;

    let files = SampleFiles {
        customers: dir.join(CUSTOMERS_FILE),
        orders: dir.join(ORDERS_FILE),
    };
    write_table(&customer_table, &files.customers)?;
    write_table(&order_table, &files.orders)?;

    tracing::info!(
        "Sample data saved: {} customer(s) to {}, {} order(s) to {}",
        customer_table.len(),
        files.customers.display(),
        order_table.len(),
        files.orders.display()
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleSet, apply_rules};

    #[test]
    fn test_customers_shape_and_ids() {
        let table = generate_customers(12, 7);
        assert_eq!(table.len(), 12);
        assert_eq!(table.width(), 7);
        table.check_shape().unwrap();
        assert_eq!(table.get(0, "customer_id"), Some(&Value::Text("C00001".into())));
        assert_eq!(table.get(11, "customer_id"), Some(&Value::Text("C00012".into())));
    }

    #[test]
    fn test_customers_value_domains() {
        let table = generate_customers(300, 3);
        for row in 0..table.len() {
            let age = table.get(row, "age").and_then(Value::as_finite_f64).unwrap();
            assert!((18.0..90.0).contains(&age));

            let country = table.get(row, "country").unwrap().render();
            assert!(COUNTRIES.contains(&country.as_str()));
            let state = table.get(row, "state").unwrap();
            assert_eq!(country == "USA", !state.is_null());

            let email = table.get(row, "email").unwrap().render();
            assert!(email.ends_with("@example.com"));
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_customers(20, 42), generate_customers(20, 42));
        assert_ne!(generate_customers(20, 42), generate_customers(20, 43));
    }

    #[test]
    fn test_orders_reference_customers() {
        let customers = generate_customers(50, 1);
        let orders = generate_orders(100, &customers, 2).unwrap();
        assert_eq!(orders.len(), 100);

        let dangling = (0..orders.len())
            .filter(|&row| {
                orders
                    .get(row, "customer_id")
                    .unwrap()
                    .render()
                    .starts_with("C9999X")
            })
            .count();
        assert_eq!(dangling, 10);

        assert_eq!(orders.get(0, "order_id"), Some(&Value::Text("O000001".into())));
        assert_eq!(orders.get(0, "order_date"), Some(&Value::Text("2024-01-01".into())));
        assert_eq!(orders.get(31, "order_date"), Some(&Value::Text("2024-02-01".into())));
        for row in 0..orders.len() {
            let amount = orders.get(row, "total_amount").and_then(Value::as_finite_f64).unwrap();
            assert!((5.0..=500.0).contains(&amount));
        }
    }

    #[test]
    fn test_valid_order_count_rounds_down() {
        assert_eq!(valid_order_count(0), 0);
        assert_eq!(valid_order_count(7), 6);
        assert_eq!(valid_order_count(10), 9);
        assert_eq!(valid_order_count(500), 450);
        assert_eq!(valid_order_count(usize::MAX), usize::MAX - usize::MAX.div_ceil(10));
    }

    #[test]
    fn test_orders_without_customers_are_all_dangling() {
        let orders = generate_orders(5, &RecordTable::default(), 9).unwrap();
        assert_eq!(orders.len(), 5);
        assert!(orders.rows.iter().all(|r| r[1].render().starts_with("C9999X")));
    }

    #[test]
    fn test_orders_reject_customer_table_without_ids() {
        let customers =
            RecordTable::with_rows(vec!["name".into()], vec![vec![Value::Text("a".into())]])
                .unwrap();
        assert!(generate_orders(3, &customers, 1).is_err());
    }

    #[test]
    fn test_samples_pass_starter_rules() {
        let customers = generate_customers(100, 11);
        let outcome = apply_rules(&customers, &RuleSet::starter()).unwrap();
        assert_eq!(outcome.invalid.len(), 0);
        assert_eq!(outcome.valid.len(), 100);
    }

    #[test]
    fn test_write_samples() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("samples");
        let files = write_samples(&dir, 10, 20, 5).unwrap();

        let customers = std::fs::read_to_string(&files.customers).unwrap();
        assert!(customers.starts_with("customer_id,first_name,last_name,age,country,state,email\n"));
        assert_eq!(customers.lines().count(), 11);

        let orders = std::fs::read_to_string(&files.orders).unwrap();
        assert!(orders.starts_with("order_id,customer_id,total_amount,status,order_date\n"));
        assert_eq!(orders.lines().count(), 21);
    }
}
