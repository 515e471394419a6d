pub mod config;
pub mod database;
pub mod errors;
pub mod extract;
pub mod ids;
pub mod jwt;
pub mod logger;
pub mod pagination;
