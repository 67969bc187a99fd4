//! Immutable, mergeable profile views.
//!
//! Views are what live profiles snapshot into, what gets merged across workers and time
//! windows, and what is persisted. They never change after construction, so they can be
//! shared by reference across threads without synchronization.

pub mod column;
pub mod dataset;

pub use column::ColumnProfileView;
pub use dataset::{DatasetProfileReader, DatasetProfileView};
