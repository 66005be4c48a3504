//! Reference [`crate::BlobStore`] backends. Concrete cloud adapters (S3,
//! Azure Blob) are external collaborators, not part of this crate — see
//! §1 of the design for the scope boundary.
mod local_fs;
mod memory;

pub use local_fs::LocalFsBlobStore;
pub use memory::MemoryBlobStore;
