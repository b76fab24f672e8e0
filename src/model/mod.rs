pub mod chunk;
pub mod file;
pub mod queue;
pub mod state;

pub use chunk::{chunk_range, enumerate_chunks, Chunk, PartIndex};
pub use file::{validate_chunk_size, Destination, FileMutableState, LocalSource, UploadFile, Visibility};
pub use queue::{BoundedQueue, QueueSender};
pub use state::{PartManifestEntry, PartState, RemoteFileState};
