//! Playlist output boundary
//!
//! Consumes the resolved tracks of a [`ProcessingReport`](crate::types::ProcessingReport).
//! [`JsonPlaylistSink`] stores each playlist as a JSON document in a directory.

use crate::error::PlaylistError;
use crate::types::CatalogSearchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque reference to a playlist created by a sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistHandle {
    pub id: String,
}

/// Playlist destination
#[async_trait]
pub trait PlaylistSink: Send + Sync {
    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PlaylistHandle, PlaylistError>;

    /// Append tracks in the given order
    async fn add_tracks(
        &self,
        handle: &PlaylistHandle,
        tracks: &[CatalogSearchResult],
    ) -> Result<(), PlaylistError>;
}

/// On-disk playlist document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDocument {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub tracks: Vec<CatalogSearchResult>,
}

/// Writes playlists as `<dir>/<id>.json`
#[derive(Debug)]
pub struct JsonPlaylistSink {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on documents
    write_lock: Mutex<()>,
}

impl JsonPlaylistSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, handle: &PlaylistHandle) -> PathBuf {
        self.dir.join(format!("{}.json", handle.id))
    }

    /// Load a previously written playlist
    pub async fn load(&self, handle: &PlaylistHandle) -> Result<PlaylistDocument, PlaylistError> {
        let path = self.path_for(handle);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaylistError::UnknownPlaylist(handle.id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn store(&self, document: &PlaylistDocument) -> Result<(), PlaylistError> {
        let handle = PlaylistHandle {
            id: document.id.clone(),
        };
        let path = self.path_for(&handle);
        let temp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl PlaylistSink for JsonPlaylistSink {
    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<PlaylistHandle, PlaylistError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        let document = PlaylistDocument {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            tracks: Vec::new(),
        };
        self.store(&document).await?;

        tracing::info!(playlist_id = %document.id, name = %name, "Created playlist");

        Ok(PlaylistHandle { id: document.id })
    }

    async fn add_tracks(
        &self,
        handle: &PlaylistHandle,
        tracks: &[CatalogSearchResult],
    ) -> Result<(), PlaylistError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load(handle).await?;
        document.tracks.extend_from_slice(tracks);
        self.store(&document).await?;

        tracing::info!(
            playlist_id = %handle.id,
            added = tracks.len(),
            total = document.tracks.len(),
            "Added tracks to playlist"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> CatalogSearchResult {
        CatalogSearchResult {
            artist: "Radiohead".into(),
            title: title.into(),
            album: None,
            service_id: title.to_lowercase(),
            service_uri: format!("https://musicbrainz.org/recording/{}", title.to_lowercase()),
        }
    }

    #[tokio::test]
    async fn test_create_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonPlaylistSink::new(dir.path().join("playlists"));

        let handle = sink.create_playlist("Episode 12", "From the show").await.unwrap();
        sink.add_tracks(&handle, &[track("Creep")]).await.unwrap();
        sink.add_tracks(&handle, &[track("Airbag"), track("Nude")]).await.unwrap();

        let document = sink.load(&handle).await.unwrap();
        assert_eq!(document.name, "Episode 12");
        assert_eq!(document.description, "From the show");
        let titles: Vec<&str> = document.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Creep", "Airbag", "Nude"]);
        assert!(!sink.path_for(&handle).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonPlaylistSink::new(dir.path());
        let handle = PlaylistHandle { id: "missing".into() };

        let result = sink.add_tracks(&handle, &[track("Creep")]).await;
        assert!(matches!(result, Err(PlaylistError::UnknownPlaylist(id)) if id == "missing"));
    }
}
