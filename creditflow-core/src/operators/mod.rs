//! Operators reshaping, transforming and gathering batches while keeping the credit
//! protocol intact
mod gather_fallback;
mod map;
mod partition;
mod rebatch;
mod remote_map;

pub use gather_fallback::{
    DiagnosticSink, GatherFallback, GatherNode, GatherStats, InFlight, TracingDiagnostics,
};
pub use map::BatchMapper;
pub use partition::PairPartitioner;
pub use rebatch::RebatchBuffer;
pub use remote_map::RemoteBatchMapper;
