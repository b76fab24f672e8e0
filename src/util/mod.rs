pub mod digest;
pub mod fs;

pub use digest::{md5, md5_hex};
pub use fs::ChunkFile;
