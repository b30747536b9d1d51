pub mod xlsx_writer_adapter;
