//! Executes one SQL statement and maps result rows to string-keyed maps,
//! independent of metric semantics.

use futures::TryStreamExt;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Row, ValueRef};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Lower-cased column name to textual value for one result row.
pub type RowMap = HashMap<String, String>;

/// Runs `sql` under a hard deadline and converts every result row into a
/// [`RowMap`]. Column names are enumerated once, from the first row; values
/// are stringified by their natural textual representation (NULL becomes an
/// empty string). Deadline expiry is reported as the distinguished
/// [`Error::QueryTimeout`], never as a generic query error, and cancels only
/// this query.
pub async fn fetch_row_maps(
    pool: &AnyPool,
    sql: &str,
    timeout: Duration,
) -> Result<Vec<RowMap>> {
    let fetch = async {
        let mut stream = sqlx::query(sql).fetch(pool);
        let mut names: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| Error::Query(e.to_string()))?
        {
            let names = names.get_or_insert_with(|| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_lowercase())
                    .collect()
            });
            let mut map = RowMap::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                map.insert(name.clone(), column_text(&row, idx));
            }
            rows.push(map);
        }
        Ok(rows)
    };

    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(Error::QueryTimeout(timeout)),
    }
}

fn column_text(row: &AnyRow, idx: usize) -> String {
    if row.try_get_raw(idx).map_or(false, |value| value.is_null()) {
        return String::new();
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return format_number(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return v.to_string();
    }
    String::new()
}

// Integral floats render without a trailing ".0" so that downstream integer
// parses (histogram counts) keep working.
fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-7.0), "-7");
    }
}
