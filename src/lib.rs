//! farm dashboard host
//!
//! polls a two-farm irrigation controller over a peripheral link, decodes
//! its status line into a `SystemSnapshot`, keeps the last known snapshot on
//! disk, and serves a small web dashboard.

pub mod advisory;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod link;
pub mod monitor;
pub mod plant;
pub mod server;
pub mod store;
pub mod weather;

pub use decoder::{DecodeError, StatusDecoder, STATUS_REQUEST};
pub use domain::{EnvironmentReading, Farm, FarmReading, SystemSnapshot};
