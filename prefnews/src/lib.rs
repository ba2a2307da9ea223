// Library interface for prefnews modules
// This allows tests and other binaries to import modules

pub mod cache;
pub mod feed;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod sources;
