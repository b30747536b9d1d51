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

//! # Database Port
//!
//! This Port defines what it means to "run a query" against a database.
//! The Exporter does not care whether it talks to PostgreSQL, Oracle, or a
//! mock used in tests. Anything implementing `DatabasePort` can open a
//! `QueryConnection`, and every connection is handed out wrapped in a
//! [`ConnectionGuard`] that closes it exactly once.

use crate::config::DatabaseConfig;
use crate::domain::entities::ResultSet;
use crate::domain::errors::{PipelineError, Result};
use log::{debug, warn};

/// Opens connections for one database engine.
pub trait DatabasePort {
    /// Connects with the configured credentials.
    ///
    /// Failures are reported as `PipelineError::ConnectionError`.
    fn connect(&self, config: &DatabaseConfig) -> Result<Box<dyn QueryConnection>>;
}

/// An open connection able to run one text query.
pub trait QueryConnection {
    /// Executes `sql` and materializes every row.
    ///
    /// Failures are reported as `PipelineError::QueryError`.
    fn query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Releases the connection. Called once, by [`ConnectionGuard`].
    fn close(&mut self) -> Result<()>;
}

/// Owns a connection and closes it when dropped.
///
/// Dropping covers every exit path out of the query step, including `?`
/// returns, so callers never close connections by hand.
pub struct ConnectionGuard {
    conn: Option<Box<dyn QueryConnection>>,
}

impl ConnectionGuard {
    pub fn new(conn: Box<dyn QueryConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn query(&mut self, sql: &str) -> Result<ResultSet> {
        match self.conn.as_mut() {
            Some(conn) => conn.query(sql),
            None => Err(PipelineError::QueryError(
                "connection already closed".to_string(),
            )),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            match conn.close() {
                Ok(()) => debug!("Database connection closed"),
                // Nothing left to recover at this point; the pipeline result stands.
                Err(e) => warn!("Failed to close database connection: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingConnection {
        closes: Rc<Cell<usize>>,
        fail_query: bool,
    }

    impl QueryConnection for CountingConnection {
        fn query(&mut self, _sql: &str) -> Result<ResultSet> {
            if self.fail_query {
                Err(PipelineError::QueryError("boom".into()))
            } else {
                Ok(ResultSet::new(vec!["A".into()]))
            }
        }

        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    fn guard(fail_query: bool) -> (ConnectionGuard, Rc<Cell<usize>>) {
        let closes = Rc::new(Cell::new(0));
        let conn = CountingConnection {
            closes: closes.clone(),
            fail_query,
        };
        (ConnectionGuard::new(Box::new(conn)), closes)
    }

    #[test]
    fn test_guard_closes_once_on_success() {
        let (mut g, closes) = guard(false);
        let rs = g.query("SELECT 1").unwrap();
        assert_eq!(rs.columns(), ["A".to_string()]);
        assert_eq!(closes.get(), 0);
        drop(g);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_guard_closes_once_on_query_error() {
        fn run(mut g: ConnectionGuard) -> Result<ResultSet> {
            let rs = g.query("SELEC")?;
            Ok(rs)
        }

        let (g, closes) = guard(true);
        assert!(matches!(run(g), Err(PipelineError::QueryError(_))));
        assert_eq!(closes.get(), 1);
    }
}
