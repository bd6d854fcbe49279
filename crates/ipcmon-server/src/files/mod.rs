//! File storage: the object store seam and the upload/proxy service.

mod service;
mod store;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

pub use service::{CHUNK_SIZE, Download, FileService, Folder, Upload};
pub use store::{FsObjectStore, ObjectMeta, ObjectStore, StoreError};
