// Library interface for the infinite pipeline modules
// This allows tests and the binary to import modules

pub mod fetch;
pub mod generator;
pub mod images;
pub mod llm;
pub mod model;
pub mod server;
pub mod store;
