pub mod cli;
pub mod client;
pub mod config;
pub mod global;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod storage;
