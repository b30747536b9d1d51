//! Concrete adapters behind the ports: database drivers and the spreadsheet
//! writer.

pub mod oracle;
pub mod postgres;
pub mod xlsx;

use crate::config::DatabaseDriver;
use crate::ports::database_port::DatabasePort;
use self::oracle::oracle_adapter::OracleAdapter;
use self::postgres::postgres_adapter::PostgresAdapter;

/// Picks the adapter for the configured driver.
pub fn database_adapter(driver: DatabaseDriver) -> Box<dyn DatabasePort> {
    match driver {
        DatabaseDriver::Postgres => Box::new(PostgresAdapter::new()),
        DatabaseDriver::Oracle => Box::new(OracleAdapter::new()),
    }
}
