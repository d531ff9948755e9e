pub mod config;
pub mod error;
pub mod notifier;
pub mod remote_store;
pub mod snapshot_store;
pub mod storage;
