//! Impls - port implementations.
//!
//! - S3StoreProvider: production object storage
//! - InMemoryStoreProvider: tests and dry runs

pub mod memory;
pub mod s3;

pub use self::memory::InMemoryStoreProvider;
pub use self::s3::S3StoreProvider;
