pub mod db;
pub mod ident;
pub mod models;
pub mod queries;
pub mod schema;
pub mod snapshots;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
