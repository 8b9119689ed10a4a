//! Course registration backend.
//!
//! Students search the catalog, hold sections in a per-session cart, and
//! enroll once the cart passes schedule-conflict validation.

pub mod cart;
pub mod catalog;
pub mod config;
pub mod db;
pub mod registration;
pub mod schedule;
pub mod server;
pub mod session;
pub mod types;
