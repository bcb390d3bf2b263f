//! HTTP handlers for catalog resources and user accounts.

pub mod resource;
pub mod users;
