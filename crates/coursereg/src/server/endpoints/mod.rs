pub mod cart;
pub mod catalog;
pub mod registration;
pub mod session;
pub mod status;
