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

//! # Configuration
//!
//! Loading happens in two steps:
//! 1. **Raw**: the file is read into a flat `key -> value` map. Properties
//!    files map directly; YAML and JSON documents are flattened by joining
//!    nested keys with `.`.
//! 2. **Typed**: the flat map is turned into an [`AppConfig`] once. Every
//!    required key is checked here, so a bad config fails before any
//!    connection attempt.

use crate::domain::errors::{PipelineError, Result};
use clap::Parser;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.properties";

/// Configuration keys.
pub mod keys {
    pub const DB_DRIVER: &str = "db.driver";
    pub const DB_HOST: &str = "db.host";
    pub const DB_PORT: &str = "db.port";
    pub const DB_NAME: &str = "db.name";
    pub const DB_USER: &str = "db.user";
    pub const DB_PASSWORD: &str = "db.password";
    pub const QUERY_SQL: &str = "query.sql";
    pub const OUTPUT_FILE: &str = "output.file";
    pub const OUTPUT_SHEET: &str = "output.sheet";
}

/// The flat key-value view of a config file.
pub type RawConfig = BTreeMap<String, String>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (.properties, YAML or JSON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    // Overrides for ad-hoc runs
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(short, long)]
    pub sheet: Option<String>,
}

/// Database engine used to run the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Postgres,
    Oracle,
}

impl FromStr for DatabaseDriver {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DatabaseDriver::Postgres),
            "oracle" => Ok(DatabaseDriver::Oracle),
            other => Err(PipelineError::parse(
                keys::DB_DRIVER,
                format!("unsupported driver '{}' (expected postgresql or oracle)", other),
            )),
        }
    }
}

impl fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseDriver::Postgres => write!(f, "postgresql"),
            DatabaseDriver::Oracle => write!(f, "oracle"),
        }
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub sql: String,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub file: PathBuf,
    pub sheet: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Loads, merges CLI overrides and validates in one go.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut raw = load_raw(&args.config)?;
        merge_cli(&mut raw, args);
        Self::from_raw(&raw)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_raw(&load_raw(path)?)
    }

    /// Builds the typed config, failing on the first missing required key.
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        let driver = match raw.get(keys::DB_DRIVER).map(|s| s.trim()) {
            Some(d) if !d.is_empty() => d.parse()?,
            _ => DatabaseDriver::Postgres,
        };

        let host = required(raw, keys::DB_HOST)?;
        let port_str = required(raw, keys::DB_PORT)?;
        let name = required(raw, keys::DB_NAME)?;
        let user = required(raw, keys::DB_USER)?;
        let password = required_untrimmed(raw, keys::DB_PASSWORD)?;
        let sql = required(raw, keys::QUERY_SQL)?;
        let file = required(raw, keys::OUTPUT_FILE)?;
        let sheet = required(raw, keys::OUTPUT_SHEET)?;

        let port = port_str.parse::<u16>().map_err(|_| {
            PipelineError::parse(
                keys::DB_PORT,
                format!("'{}' is not a valid port number", port_str),
            )
        })?;

        Ok(Self {
            database: DatabaseConfig {
                driver,
                host,
                port,
                name,
                user,
                password,
            },
            query: QueryConfig { sql },
            output: OutputConfig {
                file: PathBuf::from(file),
                sheet,
            },
        })
    }
}

fn required(raw: &RawConfig, key: &str) -> Result<String> {
    required_untrimmed(raw, key).map(|v| v.trim().to_string())
}

fn required_untrimmed(raw: &RawConfig, key: &str) -> Result<String> {
    match raw.get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(PipelineError::ConfigKeyMissing(key.to_string())),
    }
}

/// Applies `--output` / `--sheet` on top of the file's values.
pub fn merge_cli(raw: &mut RawConfig, args: &CliArgs) {
    if let Some(o) = &args.output {
        raw.insert(keys::OUTPUT_FILE.to_string(), o.display().to_string());
    }
    if let Some(s) = &args.sheet {
        raw.insert(keys::OUTPUT_SHEET.to_string(), s.clone());
    }
}

/// Reads a config file into its flat key-value form.
///
/// The format is chosen by extension: `.yaml`/`.yml` and `.json` are
/// structured documents, anything else is read as a properties file.
pub fn load_raw(path: &Path) -> Result<RawConfig> {
    if !path.is_file() {
        return Err(PipelineError::ConfigNotFound(path.to_path_buf()));
    }
    let source_name = path.display().to_string();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::parse(&source_name, e.to_string()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let raw = match ext.as_deref() {
        Some("yaml") | Some("yml") => {
            let doc: serde_yaml::Value = serde_yaml::from_str(&contents)
                .map_err(|e| PipelineError::parse(&source_name, e.to_string()))?;
            flatten_yaml(&doc, &source_name)?
        }
        Some("json") => {
            let doc: serde_json::Value = serde_json::from_str(&contents)
                .map_err(|e| PipelineError::parse(&source_name, e.to_string()))?;
            flatten_json(&doc, &source_name)?
        }
        _ => parse_properties(&contents, &source_name)?,
    };

    debug!("Loaded {} configuration keys from {}", raw.len(), source_name);
    Ok(raw)
}

/// Parses Java-style properties text.
///
/// A `[section]` header switches the rest of the file to INI rules, as read
/// by Python's `configparser`: `=` or `:` separates key and value, `#` and
/// `;` start comment lines, indented lines continue the previous value
/// (joined with a newline), values are taken literally except that `%%`
/// stands for `%`, and keys are lower-cased. `[DEFAULT]` keys are stored
/// as-is; any other section prefixes its keys with `section.`.
pub fn parse_properties(contents: &str, source_name: &str) -> Result<RawConfig> {
    let mut out = RawConfig::new();
    let mut section: Option<String> = None;
    let mut ini = false;
    let mut last_key: Option<String> = None;
    let mut lines = contents.lines().enumerate();

    while let Some((idx, line)) = lines.next() {
        let line_no = idx + 1;
        let first = line.trim_start();
        if first.is_empty() {
            last_key = None;
            continue;
        }
        let comment_marker = if ini { ';' } else { '!' };
        if first.starts_with('#') || first.starts_with(comment_marker) {
            continue;
        }

        if ini && first.len() < line.len() {
            if let Some(value) = last_key.as_ref().and_then(|k| out.get_mut(k)) {
                value.push('\n');
                value.push_str(&ini_value(first.trim_end()));
                continue;
            }
        }

        if first.starts_with('[') {
            let header = first.trim_end();
            if !header.ends_with(']') {
                return Err(PipelineError::parse(
                    source_name,
                    format!("line {}: unterminated section header", line_no),
                ));
            }
            let name = header[1..header.len() - 1].trim();
            section = if name.eq_ignore_ascii_case("DEFAULT") || name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
            ini = true;
            last_key = None;
            continue;
        }

        if ini {
            let (raw_key, raw_value) = first
                .split_once(|c: char| c == '=' || c == ':')
                .ok_or_else(|| {
                    PipelineError::parse(
                        source_name,
                        format!("line {}: expected 'key = value'", line_no),
                    )
                })?;
            let key = qualify(&section, &raw_key.trim().to_lowercase());
            out.insert(key.clone(), ini_value(raw_value.trim()));
            last_key = Some(key);
            continue;
        }

        // Join continuation lines.
        let mut logical = String::from(first);
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (raw_key, raw_value) = split_key_value(&logical);
        let key = unescape(raw_key)
            .map_err(|e| PipelineError::parse(source_name, format!("line {}: {}", line_no, e)))?;
        let value = unescape(raw_value)
            .map_err(|e| PipelineError::parse(source_name, format!("line {}: {}", line_no, e)))?;
        out.insert(qualify(&section, &key), value);
    }

    Ok(out)
}

fn qualify(section: &Option<String>, key: &str) -> String {
    match section {
        Some(s) => format!("{}.{}", s, key),
        None => key.to_string(),
    }
}

fn ini_value(raw: &str) -> String {
    raw.replace("%%", "%")
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Splits at the first unescaped `=`, `:` or whitespace.
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if c.is_whitespace() => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start();
    if rest.starts_with('=') || rest.starts_with(':') {
        rest = rest[1..].trim_start();
    }
    (key, rest)
}

fn unescape(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let ch = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("malformed \\u escape '\\u{}'", hex))?;
                out.push(ch);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn flatten_yaml(doc: &serde_yaml::Value, source_name: &str) -> Result<RawConfig> {
    fn walk(
        prefix: &str,
        value: &serde_yaml::Value,
        out: &mut RawConfig,
        source_name: &str,
    ) -> Result<()> {
        use serde_yaml::Value;
        match value {
            Value::Mapping(map) => {
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => {
                            return Err(PipelineError::parse(
                                source_name,
                                format!("unsupported key under '{}'", prefix),
                            ))
                        }
                    };
                    walk(&join_key(prefix, &key), v, out, source_name)?;
                }
            }
            Value::Null => {
                out.insert(prefix.to_string(), String::new());
            }
            Value::Bool(b) => {
                out.insert(prefix.to_string(), b.to_string());
            }
            Value::Number(n) => {
                out.insert(prefix.to_string(), n.to_string());
            }
            Value::String(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            Value::Sequence(_) | Value::Tagged(_) => {
                return Err(PipelineError::parse(
                    source_name,
                    format!("'{}' must be a scalar value", prefix),
                ));
            }
        }
        Ok(())
    }

    if !doc.is_mapping() {
        return Err(PipelineError::parse(
            source_name,
            "top-level document must be a mapping",
        ));
    }
    let mut out = RawConfig::new();
    walk("", doc, &mut out, source_name)?;
    Ok(out)
}

fn flatten_json(doc: &serde_json::Value, source_name: &str) -> Result<RawConfig> {
    fn walk(
        prefix: &str,
        value: &serde_json::Value,
        out: &mut RawConfig,
        source_name: &str,
    ) -> Result<()> {
        use serde_json::Value;
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    walk(&join_key(prefix, k), v, out, source_name)?;
                }
            }
            Value::Null => {
                out.insert(prefix.to_string(), String::new());
            }
            Value::Bool(b) => {
                out.insert(prefix.to_string(), b.to_string());
            }
            Value::Number(n) => {
                out.insert(prefix.to_string(), n.to_string());
            }
            Value::String(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            Value::Array(_) => {
                return Err(PipelineError::parse(
                    source_name,
                    format!("'{}' must be a scalar value", prefix),
                ));
            }
        }
        Ok(())
    }

    if !doc.is_object() {
        return Err(PipelineError::parse(
            source_name,
            "top-level document must be an object",
        ));
    }
    let mut out = RawConfig::new();
    walk("", doc, &mut out, source_name)?;
    Ok(out)
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_PROPERTIES: &str = r#"
# Database connection
db.host=localhost
db.port=5432
db.name=sales
db.user=report
db.password=s3cret

query.sql=SELECT id, name \
          FROM customers \
          ORDER BY id
output.file=out/customers.xlsx
output.sheet=Customers
"#;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_load_properties_config() {
        let file = write_config(".properties", FULL_PROPERTIES);
        let config = AppConfig::from_file(file.path()).expect("Failed to parse config");

        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.password, "s3cret");
        assert_eq!(
            config.query.sql,
            "SELECT id, name FROM customers ORDER BY id"
        );
        assert_eq!(config.output.file, PathBuf::from("out/customers.xlsx"));
        assert_eq!(config.output.sheet, "Customers");
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.properties");
        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigNotFound(p) if p == path));
    }

    #[test]
    fn test_directory_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_raw(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigNotFound(_)));
    }

    #[test]
    fn test_missing_query_key_is_reported_by_name() {
        let contents = FULL_PROPERTIES.replace("query.sql", "query.other");
        let file = write_config(".properties", &contents);
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigKeyMissing(k) if k == keys::QUERY_SQL));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut raw = parse_properties(FULL_PROPERTIES, "test").unwrap();
        raw.insert(keys::OUTPUT_SHEET.into(), "   ".into());
        let err = AppConfig::from_raw(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigKeyMissing(k) if k == keys::OUTPUT_SHEET));
    }

    #[test]
    fn test_invalid_port() {
        let mut raw = parse_properties(FULL_PROPERTIES, "test").unwrap();
        raw.insert(keys::DB_PORT.into(), "70000".into());
        let err = AppConfig::from_raw(&raw).unwrap_err();
        assert!(
            matches!(err, PipelineError::ConfigParseError { ref source_name, .. } if source_name == keys::DB_PORT)
        );
    }

    #[test]
    fn test_driver_selection() {
        let mut raw = parse_properties(FULL_PROPERTIES, "test").unwrap();
        raw.insert(keys::DB_DRIVER.into(), "Oracle".into());
        assert_eq!(
            AppConfig::from_raw(&raw).unwrap().database.driver,
            DatabaseDriver::Oracle
        );

        raw.insert(keys::DB_DRIVER.into(), "mysql".into());
        assert!(matches!(
            AppConfig::from_raw(&raw).unwrap_err(),
            PipelineError::ConfigParseError { .. }
        ));
    }

    #[test]
    fn test_properties_separators_and_escapes() {
        let raw = parse_properties(
            "! bang comment\n\
             a = 1\n\
             b: two words\n\
             c   spaced\n\
             d=tab\\there\n\
             e\\=key=value\n\
             f=caf\\u00e9\n\
             g\n",
            "test",
        )
        .unwrap();

        assert_eq!(raw["a"], "1");
        assert_eq!(raw["b"], "two words");
        assert_eq!(raw["c"], "spaced");
        assert_eq!(raw["d"], "tab\there");
        assert_eq!(raw["e=key"], "value");
        assert_eq!(raw["f"], "café");
        assert_eq!(raw["g"], "");
        assert_eq!(raw.len(), 7);
    }

    #[test]
    fn test_properties_malformed_unicode_escape() {
        let err = parse_properties("a=1\nb=\\u12\n", "cfg").unwrap_err();
        match err {
            PipelineError::ConfigParseError { reason, .. } => assert!(reason.contains("line 2")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_properties_sections() {
        let raw = parse_properties(
            "[DEFAULT]\ndb.host=h\n[output]\nfile=x.xlsx\n",
            "test",
        )
        .unwrap();
        assert_eq!(raw["db.host"], "h");
        assert_eq!(raw["output.file"], "x.xlsx");

        let err = parse_properties("[broken\n", "test").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParseError { .. }));
    }

    #[test]
    fn test_ini_multiline_values_and_comments() {
        let raw = parse_properties(
            "[DEFAULT]\n\
             ; connection\n\
             db.host = h\n\
             query.sql = SELECT id\n    FROM orders\n    WHERE note LIKE '%%paid'\n\
             # output\n\
             output.file: C:\\reports\\out.xlsx\n",
            "test",
        )
        .unwrap();

        assert_eq!(raw["db.host"], "h");
        assert_eq!(
            raw["query.sql"],
            "SELECT id\nFROM orders\nWHERE note LIKE '%paid'"
        );
        assert_eq!(raw["output.file"], "C:\\reports\\out.xlsx");
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn test_ini_line_without_separator_is_parse_error() {
        let err = parse_properties("[DEFAULT]\ndb.host h\n", "cfg").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParseError { .. }));
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml = r#"
db:
  driver: oracle
  host: "dbhost"
  port: 1521
  name: "ORCL"
  user: "scott"
  password: "tiger"
query:
  sql: "SELECT * FROM emp"
output:
  file: "./emp.xlsx"
  sheet: "Emp"
"#;
        let file = write_config(".yaml", yaml);
        let config = AppConfig::from_file(file.path()).expect("Failed to parse config");

        assert_eq!(config.database.driver, DatabaseDriver::Oracle);
        assert_eq!(config.database.port, 1521);
        assert_eq!(config.database.user, "scott");
        assert_eq!(config.query.sql, "SELECT * FROM emp");
    }

    #[test]
    fn test_load_json_config_with_dotted_keys() {
        let json = r#"{
            "db.host": "localhost",
            "db": { "port": 5432, "name": "n", "user": "u", "password": "p" },
            "query.sql": "SELECT 1",
            "output": { "file": "o.xlsx", "sheet": "S" }
        }"#;
        let file = write_config(".json", json);
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.output.sheet, "S");
    }

    #[test]
    fn test_yaml_sequence_is_parse_error() {
        let file = write_config(".yml", "db:\n  host: [a, b]\n");
        let err = load_raw(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParseError { .. }));
    }

    #[test]
    fn test_cli_overrides_fill_missing_keys() {
        let contents = FULL_PROPERTIES
            .replace("output.file=out/customers.xlsx", "")
            .replace("output.sheet=Customers", "output.sheet=FromFile");
        let file = write_config(".properties", &contents);
        let args = CliArgs::parse_from([
            "db-sheet-exporter",
            "--config",
            file.path().to_str().unwrap(),
            "--output",
            "override.xlsx",
        ]);

        let config = AppConfig::load(&args).unwrap();
        assert_eq!(config.output.file, PathBuf::from("override.xlsx"));
        assert_eq!(config.output.sheet, "FromFile");
    }

    #[test]
    fn test_default_config_path() {
        let args = CliArgs::parse_from(["db-sheet-exporter"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_debug_redacts_password() {
        let raw = parse_properties(FULL_PROPERTIES, "test").unwrap();
        let config = AppConfig::from_raw(&raw).unwrap();
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<redacted>"));
    }
}
