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

//! # Domain Entities
//!
//! The "Nouns" of the exporter: a single typed cell, the fully materialized
//! result set produced by the query step, and the summary returned once the
//! spreadsheet has been written.

use crate::domain::errors::{PipelineError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::path::PathBuf;

/// One scalar value read from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL `NULL`. Written as an empty cell.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Time of day without a date.
    Time(NaiveTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Classifies the text form of an exact decimal number.
    ///
    /// Integers that fit in `i64` become `Int`. Other values become `Float`
    /// only when the `f64` reproduces every digit, otherwise they stay `Text`.
    /// Exponent notation is already approximate and is accepted as `Float`.
    pub fn from_decimal(text: &str) -> CellValue {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return CellValue::Int(i);
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() && text.contains(|c: char| c == 'e' || c == 'E') => {
                CellValue::Float(f)
            }
            Ok(f) if f.is_finite() && canonical_decimal(text) == canonical_decimal(&f.to_string()) => {
                CellValue::Float(f)
            }
            _ => CellValue::Text(text.to_string()),
        }
    }
}

/// Plain decimal text without redundant zeros, e.g. `-.50` -> `-0.5`.
fn canonical_decimal(s: &str) -> String {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let int = int.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}{}", sign, int)
    } else {
        format!("{}{}.{}", sign, int, frac)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
        }
    }
}

impl From<Option<CellValue>> for CellValue {
    fn from(v: Option<CellValue>) -> Self {
        v.unwrap_or(CellValue::Null)
    }
}

/// `ResultSet` is the in-memory table produced by the query step.
///
/// Every row has exactly one value per column, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, rejecting rows whose width differs from the header.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::QueryError(format!(
                "row {} has {} values but the result has {} columns",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// `ExportSummary` is the "Report Card" of a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub file: PathBuf,
    pub sheet: String,
    pub rows: usize,
    pub columns: usize,
}
