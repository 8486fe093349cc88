pub mod app;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod fetch;
pub mod monitor;
pub mod output;
pub mod pool;
pub mod producer;
pub mod resources;
pub mod runner;
pub mod utils;
pub mod words;

#[cfg(test)]
mod tests;
