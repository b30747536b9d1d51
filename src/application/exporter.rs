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

//! The application logic that drives one export run.
//!
//! The pipeline is strictly linear: connect → query → export. Each step
//! prints an operator-facing progress line and any error aborts the run
//! unchanged; the caller decides how to report it.

use crate::config::AppConfig;
use crate::domain::entities::{ExportSummary, ResultSet};
use crate::domain::errors::{PipelineError, Result};
use crate::ports::database_port::{ConnectionGuard, DatabasePort};
use crate::ports::sheet_port::SheetWriter;
use log::{debug, info};
use std::time::Instant;

const BANNER_WIDTH: usize = 50;
const QUERY_PREVIEW_CHARS: usize = 50;

/// Runs the configured query and writes its result to a spreadsheet.
pub struct Exporter<'a> {
    config: &'a AppConfig,
    database: Box<dyn DatabasePort>,
    sheet_writer: Box<dyn SheetWriter>,
}

impl<'a> Exporter<'a> {
    /// Creates a new Exporter with the provided components.
    pub fn new(
        config: &'a AppConfig,
        database: Box<dyn DatabasePort>,
        sheet_writer: Box<dyn SheetWriter>,
    ) -> Self {
        Self {
            config,
            database,
            sheet_writer,
        }
    }

    /// Entry point for running the full pipeline.
    pub fn run(&self) -> Result<ExportSummary> {
        let start_time = Instant::now();
        banner("Database Query to Excel Exporter");

        let conn = self.connect()?;
        let result = self.run_query(conn)?;
        let summary = self.export_to_spreadsheet(result)?;

        banner("✓ Process completed successfully!");
        info!(
            "Export finished in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Opens the database connection, wrapped so it is always released.
    pub fn connect(&self) -> Result<ConnectionGuard> {
        let db = &self.config.database;
        debug!("Connection settings: {:?}", db);

        match self.database.connect(db) {
            Ok(conn) => {
                println!("✓ Database connection established");
                Ok(ConnectionGuard::new(conn))
            }
            Err(e) => {
                println!("{}", failure_line(&e));
                Err(e)
            }
        }
    }

    /// Runs the configured SQL and materializes every row.
    ///
    /// Takes ownership of the connection: it is closed when this returns,
    /// whether the query succeeded or not.
    pub fn run_query(&self, mut conn: ConnectionGuard) -> Result<ResultSet> {
        let sql = &self.config.query.sql;
        println!("Executing query: {}...", query_preview(sql));

        let result = conn.query(sql)?;
        println!(
            "✓ Query executed successfully. Rows retrieved: {}",
            result.row_count()
        );
        Ok(result)
    }

    /// Writes the result set to the configured file and sheet.
    pub fn export_to_spreadsheet(&self, result: ResultSet) -> Result<ExportSummary> {
        let output = &self.config.output;
        match self.sheet_writer.write_sheet(&result, output) {
            Ok(summary) => {
                println!("✓ Results saved to: {}", summary.file.display());
                println!("  Sheet name: {}", summary.sheet);
                println!("  Rows: {}, Columns: {}", summary.rows, summary.columns);
                Ok(summary)
            }
            Err(e) => {
                println!("{}", failure_line(&e));
                Err(e)
            }
        }
    }
}

/// Operator-facing line for a failed connect or export step.
fn failure_line(e: &PipelineError) -> String {
    match e {
        PipelineError::ConnectionError(cause) => format!("✗ Connection failed: {}", cause),
        other => format!("✗ {}", other),
    }
}

fn banner(title: &str) {
    println!("{}", "=".repeat(BANNER_WIDTH));
    println!("{}", title);
    println!("{}", "=".repeat(BANNER_WIDTH));
}

/// First characters of the query on one line, for progress output.
fn query_preview(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(QUERY_PREVIEW_CHARS)
        .collect()
}
