pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod lesson;
pub mod logging;
pub mod model;
pub mod page;
pub mod pipeline;
pub mod scraper;
pub mod store;
pub mod targets;
pub mod utils;
