//! Track selection
//!
//! A multiplexed stream may carry several tracks of the same media kind.
//! The selector holds one active track per kind; while a kind has no
//! selection every track of that kind is forwarded.

use std::fmt;

use crate::media::MediaKind;

/// Track identifier within a multiplexed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u8);

impl TrackId {
    /// Sentinel for "no track selected"
    pub const UNASSIGNED: TrackId = TrackId(u8::MAX);

    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u8 {
        self.0
    }

    pub const fn is_assigned(&self) -> bool {
        self.0 != u8::MAX
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl From<u8> for TrackId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unassigned")
        }
    }
}

/// Active track per media kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSelector {
    audio: TrackId,
    video: TrackId,
}

impl TrackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a track for `kind`; `None` clears the selection
    pub fn select(&mut self, id: Option<u8>, kind: MediaKind) {
        let id = id.map(TrackId::new).unwrap_or(TrackId::UNASSIGNED);
        match kind {
            MediaKind::Audio => self.audio = id,
            MediaKind::Video => self.video = id,
        }
    }

    /// Currently selected track for `kind`
    pub fn selected(&self, kind: MediaKind) -> TrackId {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }

    /// Whether a frame on `track` should be processed
    pub fn accepts(&self, kind: MediaKind, track: TrackId) -> bool {
        let selected = self.selected(kind);
        !selected.is_assigned() || selected == track
    }
}
