pub mod cleanup;
pub mod storage;

pub use storage::Storage;
