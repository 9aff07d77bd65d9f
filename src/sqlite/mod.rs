mod config;
mod executor;
pub mod params;
pub mod query;
mod worker;

pub use params::Params;
pub use worker::SqliteConnection;
