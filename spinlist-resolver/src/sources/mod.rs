//! External collaborators
//!
//! Traits the core depends on, plus one concrete adapter for each.

pub mod catalog;
pub mod playlist;
pub mod transcript;

pub use catalog::{CatalogSearch, MusicBrainzSearch};
pub use playlist::{JsonPlaylistSink, PlaylistDocument, PlaylistHandle, PlaylistSink};
pub use transcript::{FileTranscriptSource, TranscriptSource};
