pub mod catalog;
pub mod config;
pub mod extract;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod schema;
