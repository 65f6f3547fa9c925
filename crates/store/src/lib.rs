//! Persistence backends for the ticket document.
//!
//! - `JsonFileTicketStore` keeps `{"tickets": {...}}` on disk and replaces the
//!   whole file on every save.
//! - `InMemoryTicketStore` holds the document in process memory.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileTicketStore;
pub use memory::InMemoryTicketStore;
