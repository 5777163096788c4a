pub mod landscape;
pub mod patent;
pub mod query_plan;
pub mod strategy;
pub mod text;

mod error;

pub use error::{Result, Violation};
