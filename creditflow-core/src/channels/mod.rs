//! Edges of the dataflow graph as seen from a single operator
pub mod operator_io;

pub use operator_io::{Downstream, Node};
