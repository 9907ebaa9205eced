// Adapters behind the ports in `app::ports`

pub mod dataworld;
pub mod fs_store;
pub mod s3_store;

pub use dataworld::DataWorldSource;
pub use fs_store::FsObjectStore;
pub use s3_store::S3ObjectStore;
