pub mod cli;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod github;
pub mod grammar;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod syntax;
pub mod util;
pub mod writer;
