pub mod cli;
pub mod client;
pub mod config;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod world;
