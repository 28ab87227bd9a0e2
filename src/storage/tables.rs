//! Table descriptors and the insert-or-update statement builder
//!
//! Each table declares its conflict key once. Writers call [`upsert_sql`]
//! with the columns they bind instead of spelling out `ON CONFLICT` text.

/// A table and the unique tuple that identifies a record in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub conflict_key: &'static [&'static str],
}

pub const DRAWS: Table = Table {
    name: "draw_results",
    conflict_key: &["draw_date", "region", "station"],
};

/// Observations hang off their source draw; `seq` orders values in a tier
pub const TAILS: Table = Table {
    name: "tail_observations",
    conflict_key: &["draw_id", "prize_tier", "seq"],
};

pub const FEATURES: Table = Table {
    name: "feature_rows",
    conflict_key: &["target_date", "region", "station", "pair"],
};

pub const REGISTRY: Table = Table {
    name: "model_registry",
    conflict_key: &["region", "station", "scope", "version"],
};

pub const PREDICTIONS: Table = Table {
    name: "predictions",
    conflict_key: &["prediction_date", "region", "station"],
};

pub const SETTLEMENTS: Table = Table {
    name: "settlements",
    conflict_key: &["prediction_date", "region", "station"],
};

/// `INSERT .. ON CONFLICT(key) DO UPDATE` binding `columns` in order.
///
/// Every non-key column is overwritten from the incoming row. When all
/// columns are key columns the insert is a no-op on conflict.
pub fn upsert_sql(table: &Table, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !table.conflict_key.contains(c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        table.name,
        columns.join(", "),
        placeholders,
        table.conflict_key.join(", "),
        action
    )
}
