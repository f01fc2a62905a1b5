pub mod analytics;
pub mod config;
pub mod dates;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod settings;
pub mod storage;
pub mod task_api;
