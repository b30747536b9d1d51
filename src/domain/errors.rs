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

//! Core error definitions for the spreadsheet exporter.
//!
//! Every failure belongs to exactly one pipeline stage. Adapters map their
//! driver or library errors into the variant of the stage they run in, so
//! callers and tests can tell failures apart without matching on messages.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Config,
    Connect,
    Query,
    Export,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Config => write!(f, "config"),
            PipelineStage::Connect => write!(f, "connect"),
            PipelineStage::Query => write!(f, "query"),
            PipelineStage::Export => write!(f, "export"),
        }
    }
}

/// Error types encountered while running the export pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration in {source_name}: {reason}")]
    ConfigParseError { source_name: String, reason: String },

    #[error("Missing required configuration key: {0}")]
    ConfigKeyMissing(String),

    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Failed to save Excel file: {0}")]
    ExportError(String),
}

impl PipelineError {
    /// Shorthand for a parse error tied to a file or a single key.
    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::ConfigParseError {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the stage this error aborted.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::ConfigNotFound(_)
            | PipelineError::ConfigParseError { .. }
            | PipelineError::ConfigKeyMissing(_) => PipelineStage::Config,
            PipelineError::ConnectionError(_) => PipelineStage::Connect,
            PipelineError::QueryError(_) => PipelineStage::Query,
            PipelineError::ExportError(_) => PipelineStage::Export,
        }
    }
}

/// A specialized Result type for the exporter.
pub type Result<T> = std::result::Result<T, PipelineError>;
