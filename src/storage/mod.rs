//! Bucket backend implementations

mod memory;
mod s3;
mod traits;

pub use memory::MemoryBackend;
pub use s3::S3Backend;
pub use traits::{ObjectBody, ObjectStore, StorageError, StoredObject};
