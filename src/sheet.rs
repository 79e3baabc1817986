//! Spreadsheet I/O for the pipeline artifacts.
//!
//! Import goes through calamine (xlsx, xls, ods — whatever the portal
//! serves), export through rust_xlsxwriter. Everything is held as text:
//! the pipeline never computes on cell values, it only carries them
//! through and appends columns.

use crate::types::DataLoadError;
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

/// The portal export carries a banner line above the column header.
pub const DEFAULT_HEADER_ROW: usize = 1;

/// An in-memory table: one header row plus data rows, all text.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of a named column. Header comparison is trimmed and
    /// ASCII-case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    /// Append columns, defaulted to the empty string in every row, so the
    /// output schema is stable even when nothing matches.
    pub fn add_columns(&mut self, names: &[&str]) {
        for name in names {
            self.headers.push((*name).to_string());
        }
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: String) {
        if let Some(r) = self.rows.get_mut(row) {
            if let Some(cell) = r.get_mut(col) {
                *cell = value;
            }
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(|s| s.as_str())
    }
}

/// Load the first worksheet of a workbook into a [`Table`].
///
/// `header_row` is the zero-based index of the column header; rows above
/// it are discarded. Fully empty rows below the header are dropped.
pub fn load(path: &Path, header_row: usize) -> Result<Table, DataLoadError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| DataLoadError::Open(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(DataLoadError::EmptySheet)?
        .map_err(|e| DataLoadError::Open(e.to_string()))?;

    let mut iter = range.rows().skip(header_row);
    let headers: Vec<String> = iter
        .next()
        .ok_or(DataLoadError::EmptySheet)?
        .iter()
        .map(cell_to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DataLoadError::EmptySheet);
    }

    let width = headers.len();
    let rows: Vec<Vec<String>> = iter
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
            cells.resize(width, String::new());
            cells
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Table { headers, rows })
}

/// Write a [`Table`] to `path` as xlsx, overwriting. Header row is bold,
/// at row zero — the banner line from the portal export is not carried
/// into the output.
pub fn write(table: &Table, path: &Path) -> Result<(), DataLoadError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(|e| DataLoadError::Write(e.to_string()))?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            worksheet
                .write_string((r + 1) as u32, c as u16, cell)
                .map_err(|e| DataLoadError::Write(e.to_string()))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| DataLoadError::Write(e.to_string()))?;
    Ok(())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            // Excel stores integers as floats; keep "42" instead of "42.0"
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Table {
        Table {
            headers: vec!["username".into(), "seen_at".into()],
            rows: vec![
                vec!["alice".into(), "2024-06-24 13:34:17".into()],
                vec!["bob".into(), String::new()],
            ],
        }
    }

    #[test]
    fn column_lookup_ignores_case_and_padding() {
        let table = sample();
        assert_eq!(table.column_index("Username"), Some(0));
        assert_eq!(table.column_index(" seen_at "), None); // caller trims, header doesn't
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn add_columns_pads_every_row() {
        let mut table = sample();
        table.add_columns(&["name", "city"]);
        assert_eq!(table.headers.len(), 4);
        for row in &table.rows {
            assert_eq!(row.len(), 4);
            assert_eq!(row[2], "");
            assert_eq!(row[3], "");
        }
    }

    #[test]
    fn write_then_load_round_trips_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.xlsx");
        let table = sample();
        write(&table, &path).unwrap();

        // Output files carry the header at row zero
        let loaded = load(&path, 0).unwrap();
        assert_eq!(loaded.headers, table.headers);
        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.cell(0, 0), Some("alice"));
        assert_eq!(loaded.cell(1, 1), Some(""));
    }

    #[test]
    fn load_skips_banner_rows_above_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("banner.xlsx");

        let banner = Table {
            headers: vec!["Authentication records — 2024-06-24".into()],
            rows: vec![
                vec!["username".into(), "seen_at".into()],
                vec!["alice".into(), "x".into()],
            ],
        };
        write(&banner, &path).unwrap();

        let loaded = load(&path, 1).unwrap();
        assert_eq!(loaded.headers[0], "username");
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.cell(0, 0), Some("alice"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Path::new("/nonexistent/nope.xlsx"), 0).unwrap_err();
        assert!(matches!(err, DataLoadError::Open(_)));
    }
}
