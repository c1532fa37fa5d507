pub mod category;
pub mod classifier;
pub mod narrative;
pub mod reference;
pub mod similarity;

mod error;

pub use error::{Error, Result};
