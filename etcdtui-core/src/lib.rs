pub mod config;
pub mod connection;
pub mod controller;
pub mod debug_log;
pub mod error;
pub mod input;
pub mod live;
pub mod model;
pub mod session;
pub mod store;
pub mod tree;

#[cfg(test)]
mod testing;
