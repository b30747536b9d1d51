pub mod oracle_adapter;
