pub mod broadcast;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod lock;
pub mod persistence;
pub mod presence;
pub mod scheduler;
pub mod state;
pub mod store;
