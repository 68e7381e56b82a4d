pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod report;
pub mod resource;
pub mod retention;
pub mod scheduler;
pub mod sources;
pub mod summary;
pub mod sweep;
