//! HTTP surface of the draekz server: config routes, the `config.js`
//! module and the link fixer endpoints.

pub mod rest;

pub use rest::{ApiState, RestApi};
