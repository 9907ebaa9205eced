// Cleaning stage: the working table and the components that rewrite it, in run order

pub mod table;
pub mod point;
pub mod missing;
pub mod normalize;
pub mod geocode;
pub mod quality_gate;
pub mod cleaner;

pub use cleaner::{Cleaner, CleaningReport};
pub use table::{CaseRecord, CaseTable, CleanedRecord, CleanedTable};
