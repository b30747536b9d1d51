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

//! Infrastructure adapter for running the configured query on Oracle.

use crate::config::DatabaseConfig;
use crate::domain::entities::{CellValue, ResultSet};
use crate::domain::errors::{PipelineError, Result};
use crate::ports::database_port::{DatabasePort, QueryConnection};
use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use oracle::sql_type::{OracleType, Timestamp};
use oracle::Connection;

/// Rows fetched per network round-trip.
const PREFETCH_ROWS: u32 = 5000;

/// Concrete implementation of `DatabasePort` for Oracle databases.
///
/// Connects with an Easy Connect string built from host, port and service
/// name (`//host:port/service`).
#[derive(Debug, Default)]
pub struct OracleAdapter;

impl OracleAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn connection_string(config: &DatabaseConfig) -> String {
        format!("//{}:{}/{}", config.host, config.port, config.name)
    }
}

impl DatabasePort for OracleAdapter {
    fn connect(&self, config: &DatabaseConfig) -> Result<Box<dyn QueryConnection>> {
        let conn_str = Self::connection_string(config);
        let conn = Connection::connect(&config.user, &config.password, &conn_str)
            .map_err(|e| PipelineError::ConnectionError(e.to_string()))?;

        info!("Connected to Oracle {} as {}", conn_str, config.user);
        Ok(Box::new(OracleConnection { conn: Some(conn) }))
    }
}

struct OracleConnection {
    conn: Option<Connection>,
}

impl QueryConnection for OracleConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| PipelineError::QueryError("connection already closed".into()))?;

        let mut stmt = conn
            .statement(sql)
            .prefetch_rows(PREFETCH_ROWS)
            .build()
            .map_err(query_error)?;

        let rows = stmt.query(&[]).map_err(query_error)?;
        let col_infos = rows.column_info();
        let col_types: Vec<OracleType> =
            col_infos.iter().map(|c| c.oracle_type().clone()).collect();
        let col_names: Vec<String> = col_infos.iter().map(|c| c.name().to_string()).collect();
        debug!("Query returned columns {:?} of types {:?}", col_names, col_types);

        let mut result = ResultSet::new(col_names);
        for row_res in rows {
            let row = row_res.map_err(query_error)?;
            let mut values = Vec::with_capacity(col_types.len());
            for (i, otype) in col_types.iter().enumerate() {
                values.push(read_value(&row, i, otype).map_err(query_error)?);
            }
            result.push_row(values)?;
        }
        Ok(result)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|e| PipelineError::ConnectionError(e.to_string()))?;
        }
        Ok(())
    }
}

fn query_error(e: oracle::Error) -> PipelineError {
    PipelineError::QueryError(e.to_string())
}

fn read_value(row: &oracle::Row, i: usize, otype: &OracleType) -> oracle::Result<CellValue> {
    let value = match otype {
        // NUMBER precision varies per row for unconstrained columns, so the
        // text form decides between integer and float.
        OracleType::Number(_, _) | OracleType::Int64 => {
            let v: Option<String> = row.get(i)?;
            v.map(|s| CellValue::from_decimal(&s))
        }
        OracleType::Float(_) | OracleType::BinaryFloat | OracleType::BinaryDouble => {
            let v: Option<f64> = row.get(i)?;
            v.map(CellValue::Float)
        }
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => {
            let v: Option<Timestamp> = row.get(i)?;
            v.map(|ts| timestamp_value(&ts))
        }
        OracleType::Raw(_) | OracleType::BLOB => {
            let v: Option<Vec<u8>> = row.get(i)?;
            v.map(|b| CellValue::Text(general_purpose::STANDARD.encode(b)))
        }
        _ => {
            let v: Option<String> = row.get(i)?;
            v.map(CellValue::Text)
        }
    };
    Ok(value.into())
}

fn timestamp_value(ts: &Timestamp) -> CellValue {
    to_datetime(
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.nanosecond(),
    )
    .map(CellValue::DateTime)
    .unwrap_or_else(|| CellValue::Text(format_timestamp(ts)))
}

fn to_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    nanosecond: u32,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_nano_opt(hour, minute, second, nanosecond)
}

/// Format: `YYYY-MM-DD HH:MI:SS.FF6`, used when chrono cannot represent the value.
fn format_timestamp(ts: &Timestamp) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.nanosecond() / 1000
    )
}
