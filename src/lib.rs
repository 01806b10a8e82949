//! Mail triage: back up and delete mailbox clutter, keep everything else.

pub mod classify;
pub mod config;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod store;

pub use error::{Error, Result};
