pub mod postgres_adapter;
