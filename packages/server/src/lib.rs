// Core runtime for the chat-bot platform: authorization pipeline, persistent
// job scheduler, tag resolver, and the limiter/cache/group-settings/retry
// facilities they depend on.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod common;
pub mod config;
pub mod group_settings;
pub mod kernel;
pub mod limiters;
pub mod retry;
pub mod scheduler;
pub mod tags;

pub use config::Config;
