pub mod app;
pub mod config;
pub mod data;
pub mod db;
pub mod errors;
pub mod movies;
pub mod state;
pub mod users;
