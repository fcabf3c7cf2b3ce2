pub mod codec;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod issuance;
pub mod middleware;
pub mod models;
pub mod util;
pub mod validation;
