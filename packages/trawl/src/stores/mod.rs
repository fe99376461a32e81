//! Built-in storage backends.

pub mod csv;
pub mod jsonl;
pub mod memory;

pub use csv::CsvStore;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
