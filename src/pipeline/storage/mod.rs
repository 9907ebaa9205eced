pub mod sqlite;

pub use sqlite::StagingDb;
