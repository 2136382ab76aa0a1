//! SFU manager
//!
//! Owns the room table. Each room lives on this process; there is no
//! cross-node coordination.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use voicebridge_core::{Publisher, TaskPool};

use crate::room::{Room, RoomOptions};
use crate::traits::{TrackFactory, TrackKind};
use crate::MediaError;

/// SFU-wide configuration.
#[derive(Debug, Clone)]
pub struct SfuConfig {
    pub simulcast_enabled: bool,
    pub svc_enabled: bool,
    pub speaker_interval_ms: u64,
    pub speaker_threshold: u8,
    pub default_max_peers: usize,
    pub default_max_publishers: usize,
    pub default_auto_subscribe_audio: bool,
    pub e2ee_default_required: bool,
    pub audio_level_ext_id: u8,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            simulcast_enabled: true,
            svc_enabled: true,
            speaker_interval_ms: 500,
            speaker_threshold: 30,
            default_max_peers: 1000,
            default_max_publishers: 100,
            default_auto_subscribe_audio: true,
            e2ee_default_required: false,
            audio_level_ext_id: crate::codecs::DEFAULT_AUDIO_LEVEL_EXT_ID,
        }
    }
}

/// Optional per-room overrides at creation time.
#[derive(Debug, Clone, Default)]
pub struct RoomConfig {
    /// 0 means use the SFU default.
    pub max_publishers: usize,
    pub e2ee_required: bool,
    /// None means use the SFU default.
    pub auto_subscribe_audio: Option<bool>,
}

/// Aggregate SFU metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SfuStats {
    pub room_count: usize,
    pub peer_count: usize,
    pub track_count: usize,
    pub audio_track_count: usize,
    pub video_track_count: usize,
    pub subscription_count: usize,
}

/// The top-level Selective Forwarding Unit manager.
pub struct Sfu {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    config: SfuConfig,
    pool: TaskPool,
    factory: Arc<dyn TrackFactory>,
    events: Option<Arc<Publisher>>,
}

impl Sfu {
    pub fn new(
        config: SfuConfig,
        pool: TaskPool,
        factory: Arc<dyn TrackFactory>,
        events: Option<Arc<Publisher>>,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
            pool,
            factory,
            events,
        }
    }

    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    /// Create a room. A missing id gets a fresh one; a duplicate id fails.
    pub fn create_room(
        &self,
        id: Option<String>,
        max_peers: usize,
        metadata: HashMap<String, String>,
        rc: RoomConfig,
    ) -> Result<Arc<Room>, MediaError> {
        let id = match id {
            Some(id) if !id.is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let mut rooms = self.rooms.write();
        if rooms.contains_key(&id) {
            return Err(MediaError::RoomExists(id));
        }

        let max_peers = if max_peers == 0 {
            self.config.default_max_peers
        } else {
            max_peers
        };
        let max_publishers = if rc.max_publishers == 0 {
            self.config.default_max_publishers
        } else {
            rc.max_publishers
        };
        let auto_subscribe_audio = rc
            .auto_subscribe_audio
            .unwrap_or(self.config.default_auto_subscribe_audio);
        let e2ee_required = rc.e2ee_required || self.config.e2ee_default_required;

        let opts = RoomOptions {
            max_publishers,
            auto_subscribe_audio,
            e2ee_required,
            speaker_threshold: self.config.speaker_threshold,
            speaker_interval: Duration::from_millis(self.config.speaker_interval_ms.max(1)),
            audio_level_ext_id: self.config.audio_level_ext_id,
        };

        let room = Room::new(
            id.clone(),
            max_peers,
            metadata,
            self.pool.clone(),
            Arc::clone(&self.factory),
            self.events.clone(),
            opts,
        );
        rooms.insert(id, Arc::clone(&room));
        Ok(room)
    }

    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(id).cloned()
    }

    pub async fn close_room(&self, id: &str) -> Result<(), MediaError> {
        let room = self
            .rooms
            .write()
            .remove(id)
            .ok_or_else(|| MediaError::RoomNotFound(id.to_string()))?;
        room.close().await;
        Ok(())
    }

    pub fn list_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().values().cloned().collect()
    }

    pub fn stats(&self) -> SfuStats {
        let rooms: Vec<Arc<Room>> = self.rooms.read().values().cloned().collect();
        let mut stats = SfuStats {
            room_count: rooms.len(),
            ..Default::default()
        };
        for room in rooms {
            stats.peer_count += room.peer_count();
            for track in room.list_publisher_tracks() {
                stats.track_count += 1;
                match track.kind() {
                    TrackKind::Audio => stats.audio_track_count += 1,
                    TrackKind::Video => stats.video_track_count += 1,
                }
                stats.subscription_count += track.subscriber_count();
            }
        }
        stats
    }

    /// Close every room.
    pub async fn close(&self) {
        let rooms: Vec<Arc<Room>> = self.rooms.write().drain().map(|(_, r)| r).collect();
        for room in rooms {
            room.close().await;
        }
    }
}
