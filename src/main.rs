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

//! # Database Query to Spreadsheet Exporter
//!
//! A one-shot batch utility: it loads a connection and query definition from
//! a config file, runs the query once against PostgreSQL or Oracle, and
//! writes the result to a single sheet of an `.xlsx` workbook.
//!
//! This application follows the **Hexagonal Architecture** (Ports and Adapters)
//! to keep the pipeline independent of the database driver and the
//! spreadsheet library.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use crate::application::exporter::Exporter;
use crate::config::{AppConfig, CliArgs};
use crate::domain::entities::ExportSummary;
use crate::domain::errors::{PipelineError, Result};
use crate::infrastructure::database_adapter;
use crate::infrastructure::xlsx::xlsx_writer_adapter::XlsxSheetWriter;
use clap::Parser;
use log::{error, info};
use std::process;

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Run and exit with its status
    process::exit(run(&args));
}

/// Runs one export and returns the process exit status.
fn run(args: &CliArgs) -> i32 {
    match export(args) {
        Ok(_) => 0,
        Err(e) => {
            report_failure(&e);
            1
        }
    }
}

fn export(args: &CliArgs) -> Result<ExportSummary> {
    let config = AppConfig::load(args)?;
    info!(
        "Loaded configuration from {} (driver: {})",
        args.config.display(),
        config.database.driver
    );

    let exporter = Exporter::new(
        &config,
        database_adapter(config.database.driver),
        Box::new(XlsxSheetWriter::new()),
    );
    exporter.run()
}

fn report_failure(e: &PipelineError) {
    error!("Export failed at {} stage: {:?}", e.stage(), e);
    eprintln!("\n✗ Process failed [{}]: {}", e.stage(), e);
}
