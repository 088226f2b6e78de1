//! Types and traits for data moving through creditflow operators

/// Data which may move through a stream.
///
/// Payloads are cloned when an emission fans out to more than one subscriber and
/// may cross task boundaries at asynchronous operators, hence `Send + Sync`.
#[diagnostic::on_unimplemented(
    message = "Type must be `Clone + Send + Sync + 'static` to be used as data"
)]
pub trait Data: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> Data for T {}

/// An ordered, finite group of stream items delivered as a single emission
pub type Batch<V> = Vec<V>;
