use std::path::Path;

use ldats_core::errors::ErrorInfo;
use ldats_core::{DataTable, LdatsError};

/// Reads a headed CSV file of numeric columns into a [`DataTable`].
pub fn load_table(path: &Path) -> Result<DataTable, LdatsError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| csv_error(path, err))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| csv_error(path, err))?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| csv_error(path, err))?;
        for (idx, field) in record.iter().enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                LdatsError::Data(
                    ErrorInfo::new("non-numeric-cell", "dataset cells must be numeric")
                        .with_context("path", path.display())
                        .with_context("row", row + 1)
                        .with_context("column", &headers[idx])
                        .with_context("value", field),
                )
            })?;
            columns[idx].push(value);
        }
    }

    let mut table = DataTable::new();
    for (name, values) in headers.into_iter().zip(columns) {
        table.push_column(name, values)?;
    }
    Ok(table)
}

fn csv_error(path: &Path, err: csv::Error) -> LdatsError {
    LdatsError::Data(
        ErrorInfo::new("csv-read", err.to_string()).with_context("path", path.display()),
    )
}
