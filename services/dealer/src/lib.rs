pub mod api;
pub mod auth;
pub mod commitment;
pub mod service;
pub mod store;
