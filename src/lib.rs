pub mod classify;
pub mod config;
pub mod cycle;
pub mod daemon;
pub mod github;
pub mod logger;
pub mod report;
