//! Paging Module
//!
//! Sequences incremental page loads for one result stream.

mod sequencer;

#[cfg(test)]
mod property_tests;

pub use sequencer::{PageLoad, PageProgress, PageSequencer};
