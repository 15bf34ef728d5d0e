pub mod fallback;
pub mod in_memory;
pub mod json_file;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod smm_api;
