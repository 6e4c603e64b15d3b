pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod routes;
pub mod validator;

pub use config::Config;
pub use routes::{AppState, router};
