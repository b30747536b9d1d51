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

//! # Sheet Port
//!
//! Contract for turning a `ResultSet` into a spreadsheet file.

use crate::config::OutputConfig;
use crate::domain::entities::{ExportSummary, ResultSet};
use crate::domain::errors::Result;

/// `SheetWriter` writes one result set as one named sheet.
pub trait SheetWriter {
    /// Writes the header row followed by every data row, with no index column.
    ///
    /// Failures are reported as `PipelineError::ExportError`.
    fn write_sheet(&self, result: &ResultSet, output: &OutputConfig) -> Result<ExportSummary>;
}
