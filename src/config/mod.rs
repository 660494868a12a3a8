pub mod generation;
pub mod server;
