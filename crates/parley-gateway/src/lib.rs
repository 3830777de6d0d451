//! Live access to the document store.
//!
//! [`store::DocumentStore`] is the seam the client talks to. [`store::LiveStore`]
//! implements it on top of `parley-db`, with [`dispatcher::Dispatcher`] fanning
//! committed changes out to every matching live query.

pub mod dispatcher;
pub mod error;
pub mod store;
pub mod subscription;

pub use error::StoreError;
pub use store::{DocumentStore, LiveStore};
pub use subscription::Subscription;
