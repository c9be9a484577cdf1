pub mod annotator;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod ownership;
pub mod supervisor;
pub mod watcher;
pub mod worker;
pub mod workload;
