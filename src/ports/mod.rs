pub mod database_port;
pub mod sheet_port;
