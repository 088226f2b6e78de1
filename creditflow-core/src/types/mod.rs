//! Types and traits used across creditflow
mod data;

pub use data::{Batch, Data};
