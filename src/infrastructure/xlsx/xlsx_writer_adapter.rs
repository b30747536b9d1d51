// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Infrastructure adapter for writing a result set to an `.xlsx` workbook.
//!
//! ## Features
//! - **Single Sheet**: the workbook holds exactly one sheet, header row first.
//! - **Typed Cells**: numbers, booleans and dates are written as native
//!   spreadsheet values; text is never re-interpreted as a number.
//! - **Atomic Replace**: the workbook is written to a temporary file next to
//!   the destination and renamed into place, so a failed export leaves any
//!   previous file untouched.

use crate::config::OutputConfig;
use crate::domain::entities::{CellValue, ExportSummary, ResultSet};
use crate::domain::errors::{PipelineError, Result};
use crate::ports::sheet_port::SheetWriter;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};
use std::path::Path;
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

/// Largest integer an IEEE double holds exactly (2^53).
const MAX_EXACT_INT: u64 = 1 << 53;

const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const HEADER_FILL_ARGB: &str = "FFD3D3D3";
const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const TIME_FORMAT: &str = "hh:mm:ss";

/// Concrete implementation of `SheetWriter` backed by `umya-spreadsheet`.
#[derive(Debug, Default)]
pub struct XlsxSheetWriter;

impl XlsxSheetWriter {
    pub fn new() -> Self {
        Self
    }

    /// Builds the in-memory workbook with one sheet named `sheet_name`.
    fn build_workbook(&self, result: &ResultSet, sheet_name: &str) -> Result<Spreadsheet> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        let sheet = book
            .new_sheet(sheet_name)
            .map_err(|e| PipelineError::ExportError(format!("cannot create sheet: {}", e)))?;

        write_header(sheet, result.columns());
        for (r, row) in result.rows().iter().enumerate() {
            let row_no = r as u32 + 2;
            for (c, value) in row.iter().enumerate() {
                if value.is_null() {
                    continue;
                }
                write_value(sheet.get_cell_mut((c as u32 + 1, row_no)), value);
            }
        }

        for c in 1..=result.column_count() as u32 {
            sheet.get_column_dimension_by_number_mut(&c).set_auto_width(true);
        }

        Ok(book)
    }

    /// Writes the workbook beside `target` and renames it into place.
    fn persist_atomically(&self, book: &Spreadsheet, target: &Path) -> Result<()> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            return Err(PipelineError::ExportError(format!(
                "output directory does not exist: {}",
                dir.display()
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(".db-sheet-export").suffix(".xlsx.tmp");
        // Same mode as a plainly created file (umask applies), not 0600.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }
        let mut tmp = builder
            .tempfile_in(dir)
            .map_err(|e| export_io_error(dir, e))?;
        debug!("Writing workbook to temporary file {}", tmp.path().display());

        umya_spreadsheet::writer::xlsx::write_writer(book, tmp.as_file_mut())
            .map_err(|e| PipelineError::ExportError(e.to_string()))?;
        // A replaced report keeps the permissions it had.
        if let Ok(existing) = std::fs::metadata(target) {
            tmp.as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| export_io_error(tmp.path(), e))?;
        }
        tmp.as_file_mut()
            .sync_all()
            .map_err(|e| export_io_error(tmp.path(), e))?;

        tmp.persist(target)
            .map_err(|e| export_io_error(target, e.error))?;
        Ok(())
    }
}

impl SheetWriter for XlsxSheetWriter {
    fn write_sheet(&self, result: &ResultSet, output: &OutputConfig) -> Result<ExportSummary> {
        validate_sheet_name(&output.sheet)?;

        let book = self.build_workbook(result, &output.sheet)?;
        self.persist_atomically(&book, &output.file)?;

        info!(
            "Wrote {} rows x {} columns to {} [{}]",
            result.row_count(),
            result.column_count(),
            output.file.display(),
            output.sheet
        );
        Ok(ExportSummary {
            file: output.file.clone(),
            sheet: output.sheet.clone(),
            rows: result.row_count(),
            columns: result.column_count(),
        })
    }
}

fn export_io_error(path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::ExportError(format!("{}: {}", path.display(), e))
}

/// Rejects names Excel refuses to open.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("sheet name is empty".to_string())
    } else if name.chars().count() > MAX_SHEET_NAME_LEN {
        Some(format!(
            "sheet name '{}' is longer than {} characters",
            name, MAX_SHEET_NAME_LEN
        ))
    } else if let Some(c) = name.chars().find(|c| INVALID_SHEET_CHARS.contains(c)) {
        Some(format!("sheet name '{}' contains invalid character '{}'", name, c))
    } else if name.starts_with('\'') || name.ends_with('\'') {
        Some(format!(
            "sheet name '{}' cannot start or end with an apostrophe",
            name
        ))
    } else {
        None
    };

    match reason {
        Some(r) => Err(PipelineError::ExportError(r)),
        None => Ok(()),
    }
}

fn write_header(sheet: &mut Worksheet, columns: &[String]) {
    for (c, name) in columns.iter().enumerate() {
        let cell = sheet.get_cell_mut((c as u32 + 1, 1));
        cell.set_value_string(name.as_str());
        let style = cell.get_style_mut();
        style.get_font_mut().set_bold(true);
        style.set_background_color(HEADER_FILL_ARGB);
    }
}

fn write_value(cell: &mut Cell, value: &CellValue) {
    match value {
        CellValue::Null => {}
        CellValue::Bool(b) => {
            cell.set_value_bool(*b);
        }
        CellValue::Int(i) if i.unsigned_abs() <= MAX_EXACT_INT => {
            cell.set_value_number(*i as f64);
        }
        CellValue::Int(i) => {
            cell.set_value_string(i.to_string());
        }
        CellValue::Float(f) if f.is_finite() => {
            cell.set_value_number(*f);
        }
        CellValue::Float(f) => {
            cell.set_value_string(f.to_string());
        }
        CellValue::Text(s) => {
            cell.set_value_string(s.as_str());
        }
        CellValue::Date(d) => match excel_serial_date(d) {
            Some(serial) => {
                cell.set_value_number(serial);
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code(DATE_FORMAT);
            }
            None => {
                cell.set_value_string(value.to_string());
            }
        },
        CellValue::DateTime(dt) => match excel_serial_datetime(dt) {
            Some(serial) => {
                cell.set_value_number(serial);
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code(DATETIME_FORMAT);
            }
            None => {
                cell.set_value_string(value.to_string());
            }
        },
        CellValue::Time(t) => {
            cell.set_value_number(day_fraction(t));
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(TIME_FORMAT);
        }
    }
}

/// Days from 0001-01-01 (day 1) to the Excel epoch 1899-12-30 (serial 0).
///
/// The 1899-12-30 epoch absorbs Excel's 1900 leap-year bug for dates from
/// March 1900 on.
const EXCEL_EPOCH_FROM_CE: i32 = 693_594;

/// Excel serial number of a date; `None` before 1900, which Excel cannot show.
///
/// Excel counts the nonexistent 1900-02-29 as serial 60, so dates in
/// January and February 1900 sit one day lower than the epoch gives.
fn excel_serial_date(d: &NaiveDate) -> Option<f64> {
    if d.year() < 1900 {
        return None;
    }
    let mut serial = d.num_days_from_ce() - EXCEL_EPOCH_FROM_CE;
    if d.year() == 1900 && d.month() < 3 {
        serial -= 1;
    }
    Some(f64::from(serial))
}

fn excel_serial_datetime(dt: &NaiveDateTime) -> Option<f64> {
    Some(excel_serial_date(&dt.date())? + day_fraction(&dt.time()))
}

fn day_fraction(t: &NaiveTime) -> f64 {
    let secs = f64::from(t.num_seconds_from_midnight()) + f64::from(t.nanosecond()) / 1e9;
    secs / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use std::path::PathBuf;

    fn output(dir: &Path, file: &str, sheet: &str) -> OutputConfig {
        OutputConfig {
            file: dir.join(file),
            sheet: sheet.to_string(),
        }
    }

    fn sample() -> ResultSet {
        let mut rs = ResultSet::new(vec!["ID".into(), "NAME".into(), "SCORE".into()]);
        rs.push_row(vec![
            CellValue::Int(3),
            CellValue::Text("carol".into()),
            CellValue::Float(7.25),
        ])
        .unwrap();
        rs.push_row(vec![
            CellValue::Int(1),
            CellValue::Text("alice".into()),
            CellValue::Float(-1.5),
        ])
        .unwrap();
        rs.push_row(vec![
            CellValue::Int(2),
            CellValue::Text("bob".into()),
            CellValue::Float(0.0),
        ])
        .unwrap();
        rs
    }

    fn read_rows(path: &PathBuf, sheet: &str) -> Vec<Vec<Data>> {
        let mut wb: Xlsx<_> = open_workbook(path).unwrap();
        let range = wb.worksheet_range(sheet).unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    fn number(d: &Data) -> f64 {
        match d {
            Data::Float(f) => *f,
            Data::Int(i) => *i as f64,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    fn text(d: &Data) -> &str {
        match d {
            Data::String(s) => s,
            other => panic!("expected a string, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_preserves_order_and_types() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "report.xlsx", "Results");

        let summary = XlsxSheetWriter::new().write_sheet(&sample(), &out).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.columns, 3);

        let mut wb: Xlsx<_> = open_workbook(&out.file).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Results".to_string()]);
        drop(wb);

        let rows = read_rows(&out.file, "Results");
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0].iter().map(text).collect::<Vec<_>>(),
            vec!["ID", "NAME", "SCORE"]
        );

        let ids: Vec<f64> = rows[1..].iter().map(|r| number(&r[0])).collect();
        assert_eq!(ids, vec![3.0, 1.0, 2.0]);
        let names: Vec<&str> = rows[1..].iter().map(|r| text(&r[1])).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
        let scores: Vec<f64> = rows[1..].iter().map(|r| number(&r[2])).collect();
        assert_eq!(scores, vec![7.25, -1.5, 0.0]);
    }

    #[test]
    fn test_empty_result_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "empty.xlsx", "Empty");
        let rs = ResultSet::new(vec!["A".into(), "B".into()]);

        let summary = XlsxSheetWriter::new().write_sheet(&rs, &out).unwrap();
        assert_eq!(summary.rows, 0);

        let rows = read_rows(&out.file, "Empty");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iter().map(text).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_text_stays_text_and_nulls_are_blank() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "mixed.xlsx", "Mixed");
        let mut rs = ResultSet::new(vec!["CODE".into(), "NOTE".into(), "FLAG".into()]);
        rs.push_row(vec![
            CellValue::Text("00123".into()),
            CellValue::Null,
            CellValue::Bool(true),
        ])
        .unwrap();
        rs.push_row(vec![
            CellValue::Int(9_007_199_254_740_993),
            CellValue::Text("x".into()),
            CellValue::Bool(false),
        ])
        .unwrap();

        XlsxSheetWriter::new().write_sheet(&rs, &out).unwrap();
        let rows = read_rows(&out.file, "Mixed");

        assert_eq!(rows[1][0], Data::String("00123".into()));
        assert_eq!(rows[1][1], Data::Empty);
        assert_eq!(rows[1][2], Data::Bool(true));
        assert_eq!(rows[2][0], Data::String("9007199254740993".into()));
        assert_eq!(rows[2][2], Data::Bool(false));
    }

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "report.xlsx", "Results");
        std::fs::write(&out.file, b"stale").unwrap();

        XlsxSheetWriter::new().write_sheet(&sample(), &out).unwrap();
        assert_eq!(read_rows(&out.file, "Results").len(), 4);
    }

    #[test]
    fn test_invalid_sheet_name_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "bad.xlsx", "Q1/Q2");

        let err = XlsxSheetWriter::new().write_sheet(&sample(), &out).unwrap_err();
        assert!(matches!(err, PipelineError::ExportError(_)));
        assert!(!out.file.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputConfig {
            file: dir.path().join("missing").join("report.xlsx"),
            sheet: "Results".into(),
        };
        let err = XlsxSheetWriter::new().write_sheet(&sample(), &out).unwrap_err();
        assert!(matches!(err, PipelineError::ExportError(_)));
    }

    #[test]
    fn test_validate_sheet_name() {
        assert!(validate_sheet_name("Customers").is_ok());
        assert!(validate_sheet_name("Q1 'draft'x").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name(&"x".repeat(31)).is_ok());
        assert!(validate_sheet_name("a[b]").is_err());
        assert!(validate_sheet_name("what?").is_err());
        assert!(validate_sheet_name("'quoted").is_err());
    }

    #[test]
    fn test_excel_serials() {
        let d = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap();
        assert_eq!(excel_serial_date(&d), Some(61.0));
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(excel_serial_date(&d), Some(45292.0));
        let dt = d.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(excel_serial_datetime(&dt), Some(45292.5));
        let old = NaiveDate::from_ymd_opt(1850, 6, 1).unwrap();
        assert_eq!(excel_serial_date(&old), None);
    }

    #[test]
    fn test_excel_serials_early_1900() {
        let serial = |y, m, d| excel_serial_date(&NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(serial(1900, 1, 1), Some(1.0));
        assert_eq!(serial(1900, 1, 31), Some(31.0));
        assert_eq!(serial(1900, 2, 28), Some(59.0));
        // Serial 60 is the phantom 1900-02-29.
        assert_eq!(serial(1900, 3, 1), Some(61.0));
        let dt = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        assert_eq!(excel_serial_datetime(&dt), Some(1.75));
    }

    #[test]
    fn test_time_written_as_day_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "times.xlsx", "Times");
        let mut rs = ResultSet::new(vec!["AT".into()]);
        rs.push_row(vec![CellValue::Time(NaiveTime::from_hms_opt(6, 0, 0).unwrap())])
            .unwrap();

        XlsxSheetWriter::new().write_sheet(&rs, &out).unwrap();
        let rows = read_rows(&out.file, "Times");
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[1][0], Data::Empty);
        assert_eq!(day_fraction(&NaiveTime::from_hms_opt(6, 0, 0).unwrap()), 0.25);
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_file_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = output(dir.path(), "shared.xlsx", "Results");
        std::fs::write(&out.file, b"old").unwrap();
        std::fs::set_permissions(&out.file, std::fs::Permissions::from_mode(0o640)).unwrap();

        XlsxSheetWriter::new().write_sheet(&sample(), &out).unwrap();
        let mode = std::fs::metadata(&out.file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
