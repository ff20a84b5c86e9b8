// Library for tests to access modules

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod line_protocol;
pub mod mapreduce;
pub mod models;
pub mod parser;
pub mod pipeline_stats;
pub mod scheduler;
pub mod server;
pub mod sink;
pub mod stats;
pub mod version;
pub mod window;
