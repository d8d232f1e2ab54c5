//! Storage ports and their in-memory implementations.
//!
//! Every external store the service talks to — the structured document
//! store, the realtime transcript store, the ephemeral (Redis-like)
//! store, and the vector index — is a trait here. The in-memory
//! implementations back local mode and the test suite; production
//! deployments plug their own adapters into the same traits.

pub mod document;
pub mod ephemeral;
pub mod paths;
pub mod transcript;
pub mod vector;

pub use document::{DocumentStore, MemoryDocumentStore};
pub use ephemeral::{EphemeralStore, MemoryEphemeralStore};
pub use transcript::{MemoryTranscriptStore, TranscriptStore};
pub use vector::{MemoryVectorIndex, SearchHit, VectorSearch};
