pub mod config;
pub mod deferred;
