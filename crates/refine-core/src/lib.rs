pub mod analyzer;
pub mod artifact;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod io;
pub mod memory;
pub mod oracle;
pub mod orchestrator;
pub mod paths;
pub mod project;
pub mod types;

pub use error::{RefineError, Result};
