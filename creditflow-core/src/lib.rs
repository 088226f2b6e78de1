//! Creditflow provides stream operators which reshape batches of data (regrouping,
//! partitioning, mapping locally or remotely, gathering remote results) without
//! breaking the credit protocol the surrounding dataflow engine uses for backpressure.
//!
//! Every emission travels with [credit::Credits]. Operators which hold on to data
//! retain its credits and release them only after the data left downstream.
pub mod channels;
pub mod credit;
pub mod errorhandling;
pub mod operators;
pub mod remote;
pub mod sinks;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
