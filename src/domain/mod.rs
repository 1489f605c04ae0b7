pub mod entry;
pub mod processed;

pub use entry::FeedEntry;
pub use processed::ProcessedSet;
