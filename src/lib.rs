// Library exports for Mural
// This allows integration tests and external code to use Mural modules

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod push;
pub mod session;
pub mod state;
