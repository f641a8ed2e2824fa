//! Delimited text export of tabular snapshots.

use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::types::Table;

/// Serialize a table as CSV with a header row.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.columns)
        .map_err(|e| VizAlertError::Render(format!("CSV header: {e}")))?;
    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        writer
            .write_record(&cells)
            .map_err(|e| VizAlertError::Render(format!("CSV row: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| VizAlertError::Render(format!("CSV flush: {e}")))
}
