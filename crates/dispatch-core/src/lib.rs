pub mod config;
pub mod dispatch_context;
pub mod extensions;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod parameters;
pub mod persistence;
pub mod registration;
pub mod registry;
pub mod runners;
pub mod sqlite;
