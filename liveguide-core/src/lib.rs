#[cfg(test)]
mod test_util;

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod models;
pub mod poll;
pub mod push;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod tracing_ext;
pub mod visibility;
