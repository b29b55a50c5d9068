pub mod api;
pub mod auth;
pub mod book;
pub mod club;
pub mod config;
pub mod database;
pub mod discussion;
pub mod error;
pub mod google_books;
pub mod progress;
pub mod server;
pub mod user;
pub mod utils;
