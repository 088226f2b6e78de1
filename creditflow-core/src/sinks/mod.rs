//! Sinks for collecting data at the end of a dataflow
mod vec_sink;
pub use vec_sink::{Emission, VecSink};
