//! Externally owned rig and clip data.
//!
//! Both blobs are produced by an external compiler and are opaque to this
//! crate; only the backend knows how to decode them.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Stable `(group, name)` identifier for a clip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId {
    pub group: String,
    pub name: String,
}

impl ClipId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Parse `group.name`. A string without a dot is a name in the default group.
    pub fn parse(id: &str) -> Self {
        match id.split_once('.') {
            Some((group, name)) => Self::new(group, name),
            None => Self::new("", id),
        }
    }

    /// A clip id needs at least a name.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.group, self.name)
        }
    }
}

/// `[start, end)` bounds of a clip in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipBounds {
    pub start: f32,
    pub end: f32,
}

impl ClipBounds {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }
}

/// Compiled facial rig for one character.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RigData {
    pub actor_bytes: Vec<u8>,
    #[serde(default)]
    pub bone_bytes: Option<Vec<u8>>,
    /// Numeric id -> name for tracks and bones.
    #[serde(default)]
    pub id_table: HashMap<u64, String>,
}

impl RigData {
    pub fn new(
        actor_bytes: Vec<u8>,
        bone_bytes: Option<Vec<u8>>,
        id_table: HashMap<u64, String>,
    ) -> Self {
        Self {
            actor_bytes,
            bone_bytes,
            id_table,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.actor_bytes.is_empty()
    }

    /// Bone bytes, treating an empty blob as absent.
    pub fn bone_bytes(&self) -> Option<&[u8]> {
        self.bone_bytes.as_deref().filter(|b| !b.is_empty())
    }

    pub fn name_of(&self, id: u64) -> Option<&str> {
        self.id_table.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<u64> {
        self.id_table
            .iter()
            .find_map(|(id, n)| (n == name).then_some(*id))
    }
}

/// Compiled animation clip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    pub id: ClipId,
    pub bytes: Vec<u8>,
    /// Bounds cached by the compiler. The backend stays authoritative.
    #[serde(default)]
    pub bounds: Option<ClipBounds>,
    /// Voice asset played alongside the clip.
    #[serde(default)]
    pub voice: Option<String>,
}

impl ClipData {
    pub fn new(id: ClipId, bytes: Vec<u8>) -> Self {
        Self {
            id,
            bytes,
            bounds: None,
            voice: None,
        }
    }

    pub fn with_bounds(mut self, bounds: ClipBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_valid() && !self.bytes.is_empty()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Canonical 64-bit id for a track or bone name (FNV-1a).
pub fn name_id(name: &str) -> u64 {
    name.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_id_parse_and_display() {
        let id = ClipId::parse("vo.hello");
        assert_eq!(id, ClipId::new("vo", "hello"));
        assert_eq!(id.to_string(), "vo.hello");

        let bare = ClipId::parse("blink");
        assert_eq!(bare.group, "");
        assert_eq!(bare.to_string(), "blink");
        assert!(!ClipId::default().is_valid());
    }

    #[test]
    fn test_name_id_is_stable() {
        assert_eq!(name_id(""), FNV_OFFSET);
        assert_eq!(name_id("jaw"), name_id("jaw"));
        assert_ne!(name_id("jaw"), name_id("Jaw"));
    }

    #[test]
    fn test_empty_bone_bytes_are_absent() {
        let rig = RigData::new(vec![1], Some(Vec::new()), HashMap::new());
        assert!(rig.bone_bytes().is_none());
        assert!(rig.is_valid());
        assert!(!RigData::default().is_valid());
    }

    #[test]
    fn test_id_table_lookups() {
        let mut ids = HashMap::new();
        ids.insert(7, "smile".to_string());
        let rig = RigData::new(vec![1], None, ids);
        assert_eq!(rig.name_of(7), Some("smile"));
        assert_eq!(rig.id_of("smile"), Some(7));
        assert_eq!(rig.id_of("frown"), None);
    }

    #[test]
    fn test_rig_data_json_round_trip() {
        let mut ids = HashMap::new();
        ids.insert(u64::MAX, "big".to_string());
        let rig = RigData::new(vec![1, 2, 3], Some(vec![4]), ids);
        let text = serde_json::to_string(&rig).unwrap();
        let back: RigData = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rig);
    }
}
