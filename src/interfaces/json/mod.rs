pub mod inventory_reader;
pub mod result_writer;
