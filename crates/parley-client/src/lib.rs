//! Client core of the Parley messenger: sign-in, the user directory and the
//! two-party chat timeline, all driven through a [`DocumentStore`].
//!
//! [`DocumentStore`]: parley_gateway::DocumentStore

pub mod auth;
pub mod chat;
pub mod error;
pub mod prefs;
pub mod push;
pub mod timeline;
pub mod users;
pub mod view;

pub use error::ClientError;
