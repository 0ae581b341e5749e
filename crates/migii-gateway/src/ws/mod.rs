pub mod connection;
pub mod hub;
