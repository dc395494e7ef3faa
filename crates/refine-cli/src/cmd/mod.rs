pub mod analyze;
pub mod config;
pub mod init;
pub mod memory;
pub mod project;
pub mod run;
