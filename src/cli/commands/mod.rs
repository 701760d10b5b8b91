pub mod database;
pub mod permissions;
pub mod server;
pub mod token;
pub mod user;
