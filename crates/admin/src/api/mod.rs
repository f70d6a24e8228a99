// Admin HTTP API

pub mod common;
pub mod components;

pub use common::{ErrorResponse, ListResponse};
