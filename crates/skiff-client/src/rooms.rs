//! Room CRUD collaborator boundary.
//!
//! Room creation, discovery, and membership live outside the
//! synchronization engine; the engine only consumes this narrow interface
//! for metadata, read-marking, and leaving. [`RestRoomDirectory`] is the
//! thin production implementation.

use std::{future::Future, sync::Arc};

use serde::Deserialize;
use skiff_proto::{Room, RoomId, Timestamp};

use crate::{
    auth::{TokenProvider, require_success},
    config::ClientConfig,
    error::ClientError,
};

/// Narrow room-metadata boundary consumed by the engine.
pub trait RoomDirectory: Clone + Send + Sync + 'static {
    /// Rooms the current user is a member of.
    fn list_rooms(&self) -> impl Future<Output = Result<Vec<Room>, ClientError>> + Send;

    /// Move the room's read marker to now. Returns the new marker.
    fn mark_read(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Option<Timestamp>, ClientError>> + Send;

    /// Leave the room.
    fn leave(&self, room_id: RoomId) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// REST-backed room directory.
#[derive(Clone)]
pub struct RestRoomDirectory {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Deserialize)]
struct ReadMarker {
    last_read_at: Option<Timestamp>,
}

impl RestRoomDirectory {
    /// Create a directory client over the configured REST boundary.
    pub fn new(
        http: reqwest::Client,
        config: Arc<ClientConfig>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self { http, config, tokens }
    }
}

impl RoomDirectory for RestRoomDirectory {
    async fn list_rooms(&self) -> Result<Vec<Room>, ClientError> {
        let response = self
            .http
            .get(format!("{}/rooms", self.config.api_base))
            .bearer_auth(self.tokens.token())
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let response = require_success(response, self.tokens.as_ref())?;
        Ok(response.json::<Vec<Room>>().await?)
    }

    async fn mark_read(&self, room_id: RoomId) -> Result<Option<Timestamp>, ClientError> {
        let response = self
            .http
            .patch(format!("{}/rooms/{room_id}/read", self.config.api_base))
            .bearer_auth(self.tokens.token())
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let response = require_success(response, self.tokens.as_ref())?;
        let marker = response.json::<ReadMarker>().await?;
        Ok(marker.last_read_at)
    }

    async fn leave(&self, room_id: RoomId) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/rooms/{room_id}/leave", self.config.api_base))
            .bearer_auth(self.tokens.token())
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        require_success(response, self.tokens.as_ref())?;
        Ok(())
    }
}
