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

//! Infrastructure adapter for running the configured query on PostgreSQL.
//!
//! The statement is prepared first so column names and types are known even
//! when the query returns no rows. Rows are normally fetched in the binary
//! format and decoded per column type. When a column has a type without a
//! binary decoder here (intervals, arrays, network types, ...), the query is
//! run through the simple query protocol instead and every column is read
//! from the server's own text rendering.

use crate::config::DatabaseConfig;
use crate::domain::entities::{CellValue, ResultSet};
use crate::domain::errors::{PipelineError, Result};
use crate::ports::database_port::{DatabasePort, QueryConnection};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{debug, info};
use postgres::types::{FromSql, Type};
use postgres::{Client, NoTls, Row, SimpleQueryMessage};
use std::error::Error as StdError;
use uuid::Uuid;

type DecodeResult<T> = std::result::Result<T, Box<dyn StdError + Sync + Send>>;

/// Concrete implementation of `DatabasePort` for PostgreSQL.
#[derive(Debug, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl DatabasePort for PostgresAdapter {
    fn connect(&self, config: &DatabaseConfig) -> Result<Box<dyn QueryConnection>> {
        let client = postgres::Config::new()
            .host(&config.host)
            .port(config.port)
            .dbname(&config.name)
            .user(&config.user)
            .password(&config.password)
            .application_name(env!("CARGO_PKG_NAME"))
            .connect(NoTls)
            .map_err(|e| PipelineError::ConnectionError(e.to_string()))?;

        info!(
            "Connected to PostgreSQL {}:{}/{} as {}",
            config.host, config.port, config.name, config.user
        );
        Ok(Box::new(PostgresConnection {
            client: Some(client),
        }))
    }
}

struct PostgresConnection {
    client: Option<Client>,
}

impl QueryConnection for PostgresConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| PipelineError::QueryError("connection already closed".into()))?;

        let stmt = client.prepare(sql).map_err(query_error)?;
        let columns = stmt.columns();
        let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
        let kinds: Vec<PgKind> = columns.iter().map(|c| PgKind::of(c.type_())).collect();
        debug!(
            "Prepared statement with {} columns: {:?}",
            names.len(),
            columns.iter().map(|c| c.type_().name()).collect::<Vec<_>>()
        );

        let mut result = ResultSet::new(names);
        if kinds.contains(&PgKind::Other) {
            let untyped: Vec<&str> = columns
                .iter()
                .filter(|c| PgKind::of(c.type_()) == PgKind::Other)
                .map(|c| c.type_().name())
                .collect();
            info!("Reading rows as text because of column types {:?}", untyped);

            for message in client.simple_query(sql).map_err(query_error)? {
                if let SimpleQueryMessage::Row(row) = message {
                    let mut values: Vec<CellValue> = Vec::with_capacity(kinds.len());
                    for (i, kind) in kinds.iter().enumerate() {
                        let text = row.try_get(i).map_err(query_error)?;
                        values.push(text.map(|t| decode_text(*kind, t)).into());
                    }
                    result.push_row(values)?;
                }
            }
            return Ok(result);
        }

        let rows = client.query(&stmt, &[]).map_err(query_error)?;
        for row in &rows {
            let values = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| read_value(row, i, *kind))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(query_error)?;
            result.push_row(values)?;
        }
        Ok(result)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .map_err(|e| PipelineError::ConnectionError(e.to_string()))?;
        }
        Ok(())
    }
}

fn query_error(e: postgres::Error) -> PipelineError {
    PipelineError::QueryError(e.to_string())
}

/// How a column is decoded, decided once per column from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PgKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Text,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytea,
    /// No binary decoder; read through the text protocol.
    Other,
}

impl PgKind {
    fn of(ty: &Type) -> Self {
        if *ty == Type::BOOL {
            PgKind::Bool
        } else if *ty == Type::INT2 {
            PgKind::Int2
        } else if *ty == Type::INT4 {
            PgKind::Int4
        } else if *ty == Type::INT8 {
            PgKind::Int8
        } else if *ty == Type::OID {
            PgKind::Oid
        } else if *ty == Type::FLOAT4 {
            PgKind::Float4
        } else if *ty == Type::FLOAT8 {
            PgKind::Float8
        } else if *ty == Type::NUMERIC {
            PgKind::Numeric
        } else if *ty == Type::UUID {
            PgKind::Uuid
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            PgKind::Json
        } else if *ty == Type::DATE {
            PgKind::Date
        } else if *ty == Type::TIME {
            PgKind::Time
        } else if *ty == Type::TIMESTAMP {
            PgKind::Timestamp
        } else if *ty == Type::TIMESTAMPTZ {
            PgKind::TimestampTz
        } else if *ty == Type::BYTEA {
            PgKind::Bytea
        } else if <String as FromSql>::accepts(ty) {
            PgKind::Text
        } else {
            PgKind::Other
        }
    }
}

fn read_value(row: &Row, i: usize, kind: PgKind) -> std::result::Result<CellValue, postgres::Error> {
    let value = match kind {
        PgKind::Bool => row.try_get::<_, Option<bool>>(i)?.map(CellValue::Bool),
        PgKind::Int2 => row
            .try_get::<_, Option<i16>>(i)?
            .map(|v| CellValue::Int(v.into())),
        PgKind::Int4 => row
            .try_get::<_, Option<i32>>(i)?
            .map(|v| CellValue::Int(v.into())),
        PgKind::Int8 => row.try_get::<_, Option<i64>>(i)?.map(CellValue::Int),
        PgKind::Oid => row
            .try_get::<_, Option<u32>>(i)?
            .map(|v| CellValue::Int(v.into())),
        PgKind::Float4 => row
            .try_get::<_, Option<f32>>(i)?
            .map(|v| CellValue::Float(v.into())),
        PgKind::Float8 => row.try_get::<_, Option<f64>>(i)?.map(CellValue::Float),
        PgKind::Numeric => row
            .try_get::<_, Option<PgNumeric>>(i)?
            .map(|v| CellValue::from_decimal(&v.0)),
        PgKind::Uuid => row
            .try_get::<_, Option<Uuid>>(i)?
            .map(|v| CellValue::Text(v.hyphenated().to_string())),
        PgKind::Json => row
            .try_get::<_, Option<serde_json::Value>>(i)?
            .map(|v| CellValue::Text(v.to_string())),
        PgKind::Date => row.try_get::<_, Option<NaiveDate>>(i)?.map(CellValue::Date),
        PgKind::Time => row.try_get::<_, Option<NaiveTime>>(i)?.map(CellValue::Time),
        PgKind::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(i)?
            .map(CellValue::DateTime),
        PgKind::TimestampTz => row
            .try_get::<_, Option<DateTime<Utc>>>(i)?
            .map(|v| CellValue::DateTime(v.naive_utc())),
        PgKind::Bytea => row
            .try_get::<_, Option<Vec<u8>>>(i)?
            .map(|b| CellValue::Text(general_purpose::STANDARD.encode(b))),
        // Only text-protocol results carry these columns; a wrong-type error
        // here names the column type instead of guessing at the bytes.
        PgKind::Text | PgKind::Other => row.try_get::<_, Option<String>>(i)?.map(CellValue::Text),
    };
    Ok(value.into())
}

/// Reads one value from the server's text output format.
///
/// Anything that does not parse is kept as the server rendered it.
fn decode_text(kind: PgKind, text: &str) -> CellValue {
    let keep = || CellValue::Text(text.to_string());
    match kind {
        PgKind::Bool => match text {
            "t" => CellValue::Bool(true),
            "f" => CellValue::Bool(false),
            _ => keep(),
        },
        PgKind::Int2 | PgKind::Int4 | PgKind::Int8 | PgKind::Oid => {
            text.parse().map(CellValue::Int).unwrap_or_else(|_| keep())
        }
        PgKind::Float4 | PgKind::Float8 => {
            text.parse().map(CellValue::Float).unwrap_or_else(|_| keep())
        }
        PgKind::Numeric => CellValue::from_decimal(text),
        PgKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(CellValue::Date)
            .unwrap_or_else(|_| keep()),
        PgKind::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map(CellValue::Time)
            .unwrap_or_else(|_| keep()),
        PgKind::Timestamp => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .map(CellValue::DateTime)
            .unwrap_or_else(|_| keep()),
        PgKind::TimestampTz => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|dt| CellValue::DateTime(dt.naive_utc()))
            .unwrap_or_else(|_| keep()),
        PgKind::Bytea => decode_hex_bytea(text)
            .map(|b| CellValue::Text(general_purpose::STANDARD.encode(b)))
            .unwrap_or_else(keep),
        PgKind::Text | PgKind::Uuid | PgKind::Json | PgKind::Other => keep(),
    }
}

/// Parses the `\x0a1b...` hex output form of `bytea`.
fn decode_hex_bytea(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// `NUMERIC` read from its binary wire form, as exact decimal text.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        decode_numeric(raw).map(PgNumeric).map_err(Into::into)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decodes `ndigits, weight, sign, dscale` followed by base-10000 digits.
///
/// Digit group `k` is worth `10000^(weight - k)`; `dscale` is the number of
/// decimal places to display.
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, String> {
    if raw.len() < 8 {
        return Err(format!("numeric value too short ({} bytes)", raw.len()));
    }
    let word = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
    let ndigits = word(0) as usize;
    let weight = i32::from(word(2) as i16);
    let sign = word(4);
    let dscale = word(6) as usize;
    if raw.len() != 8 + 2 * ndigits {
        return Err(format!(
            "numeric value has {} bytes, expected {}",
            raw.len(),
            8 + 2 * ndigits
        ));
    }

    let negative = match sign {
        NUMERIC_POS => false,
        NUMERIC_NEG => true,
        NUMERIC_NAN => return Ok("NaN".into()),
        NUMERIC_PINF => return Ok("Infinity".into()),
        NUMERIC_NINF => return Ok("-Infinity".into()),
        other => return Err(format!("invalid numeric sign 0x{:04X}", other)),
    };
    let digit = |k: i32| -> u16 {
        if k < 0 || k as usize >= ndigits {
            0
        } else {
            word(8 + 2 * k as usize)
        }
    };

    let mut int_part = String::new();
    for k in 0..=weight {
        let d = digit(k);
        if int_part.is_empty() {
            if d != 0 {
                int_part = d.to_string();
            }
        } else {
            int_part.push_str(&format!("{:04}", d));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let frac_groups = (ndigits as i32 - 1 - weight).max(0).max((dscale as i32 + 3) / 4);
    let mut frac = String::new();
    for p in 1..=frac_groups {
        frac.push_str(&format!("{:04}", digit(weight + p)));
    }
    let keep = dscale.max(frac.trim_end_matches('0').len());
    frac.truncate(keep);

    let mut text = String::with_capacity(int_part.len() + frac.len() + 2);
    if negative {
        text.push('-');
    }
    text.push_str(&int_part);
    if !frac.is_empty() {
        text.push('.');
        text.push_str(&frac);
    }
    Ok(text)
}
