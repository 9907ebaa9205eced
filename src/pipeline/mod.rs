// ETL pipeline: ingestion, cleaning, staging storage, and the stage entry points

pub mod ingestion;
pub mod processing;
pub mod storage;
pub mod tasks;

pub use processing::{CaseTable, Cleaner, CleanedTable, CleaningReport};
pub use tasks::TransformOptions;
