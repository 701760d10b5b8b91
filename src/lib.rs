pub mod auth;
pub mod cli;
pub mod config;
pub mod conversion;
pub mod domain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod permissions;
pub mod server;
pub mod services;
pub mod store;
