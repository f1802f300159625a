pub mod adapter;
pub mod config;
pub mod cooldown;
pub mod core;
pub mod discord;
pub mod liveness;
pub mod logging;
pub mod persona;
pub mod shell;
