pub mod cli;
pub mod common;
pub mod config;
pub mod mover;
#[cfg(feature = "http")]
pub mod server;
pub mod service;
pub mod source;
