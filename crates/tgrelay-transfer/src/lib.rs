//! tgrelay Transfer Library
//!
//! Moves files in and out of a blob store as ordered chunks:
//!
//! - [`FetchScheduler`] fetches chunks with a bounded number in flight.
//! - [`ReassemblyWriter`] writes them to a [`ChunkSink`] strictly in order.
//! - [`Reassembler`] drives both from a stored manifest.
//! - [`ChunkUploader`] stores pieces and the manifest that lists them.

pub mod reassembly;
pub mod scheduler;
pub mod upload;
pub mod writer;

pub use reassembly::Reassembler;
pub use scheduler::{FetchResult, FetchScheduler, ScheduledFetches};
pub use upload::{ChunkUploader, UploadError, UploadedFile};
pub use writer::{
    BodyStream, ChannelSink, ChunkSink, ReassemblyError, ReassemblyStats, ReassemblyWriter,
    WriterSink,
};
