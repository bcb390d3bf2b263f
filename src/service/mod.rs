//! CrudService: resource persistence over the document store, with request validation.

mod crud;
mod validation;
pub use crud::{next_offset, CrudService};
pub use validation::RequestValidator;
