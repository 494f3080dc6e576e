pub mod document;
pub mod memory;
pub mod sql;

pub use document::DocumentAdapter;
pub use memory::MemoryAdapter;
pub use sql::SqlAdapter;
