//! Feed Module
//!
//! Ties the expiring cache and the page sequencer into the refresh /
//! fetch / fetch-next-page flow every list screen follows.

mod controller;
mod signature;
mod source;
mod state;

pub use controller::FeedController;
pub use signature::QuerySignature;
pub use source::{HttpPageSource, PageSource};
pub use state::FetchState;
