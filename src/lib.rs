pub mod access;
pub mod actor;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod database;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod read_client;
pub mod record;
pub mod tables;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod testing;
