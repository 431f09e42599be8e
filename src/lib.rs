pub mod app;
pub mod auth;
pub mod authz;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod state;
pub mod store;
pub mod users;
