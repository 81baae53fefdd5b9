pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod planner;
pub mod registry;
pub mod service;
pub mod state;

pub use anyhow::Result;
