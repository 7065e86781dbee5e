//! ChannelPath parsing and formatting.
//!
//! Grammar (DSON url form):
//!   [file-ref]#entity?channel[/component]
//! - everything before '#' is the file reference and may be empty
//! - the entity id sits between '#' and '?' and is percent-decoded
//! - the channel is one of the DAZ property channels; the optional component is x/y/z
//!   Examples:
//!   "Genesis8Female:/data/Genesis8Female.dsf#lForeArm?rotation/x"
//!     -> file="Genesis8Female:/data/Genesis8Female.dsf", entity="lForeArm", channel=Rotation, component=X
//!   "#pJCMForeArmFwd_75_L?value" -> file="", entity="pJCMForeArmFwd_75_L", channel=Value, component=None
//!   "lShldr?rotation/y" -> file="", entity="lShldr", channel=Rotation, component=Y
//!
//! Formulas read and drivers write through these paths. The file reference is kept
//! for display only; lookups go through the entity id.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a channel path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelPathError {
    #[error("empty channel path")]
    Empty,
    #[error("channel path '{0}' has no '?' channel separator")]
    MissingChannel(String),
    #[error("channel path '{0}' has an empty entity id")]
    EmptyEntity(String),
    #[error("unknown channel '{channel}' in '{path}'")]
    UnknownChannel { path: String, channel: String },
    #[error("unknown component '{component}' in '{path}'")]
    UnknownComponent { path: String, component: String },
}

/// The addressable property channels of a DAZ node or modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Rotation,
    Translation,
    Scale,
    GeneralScale,
    Value,
    CenterPoint,
    EndPoint,
    Orientation,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Rotation => "rotation",
            Channel::Translation => "translation",
            Channel::Scale => "scale",
            Channel::GeneralScale => "general_scale",
            Channel::Value => "value",
            Channel::CenterPoint => "center_point",
            Channel::EndPoint => "end_point",
            Channel::Orientation => "orientation",
        }
    }

    /// Channels a pose-time driver can write or read.
    pub fn is_drivable(&self) -> bool {
        matches!(
            self,
            Channel::Rotation
                | Channel::Translation
                | Channel::Scale
                | Channel::GeneralScale
                | Channel::Value
        )
    }

    /// Channels that belong to a bone transform rather than a morph dial.
    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            Channel::Rotation | Channel::Translation | Channel::Scale | Channel::GeneralScale
        )
    }
}

impl FromStr for Channel {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "rotation" => Channel::Rotation,
            "translation" => Channel::Translation,
            "scale" => Channel::Scale,
            "general_scale" => Channel::GeneralScale,
            "value" => Channel::Value,
            "center_point" => Channel::CenterPoint,
            "end_point" => Channel::EndPoint,
            "orientation" => Channel::Orientation,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector component selector. Scalar channels carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    X,
    Y,
    Z,
    None,
}

impl Component {
    /// Index into an `[x, y, z]` triple; scalar channels map to 0.
    pub fn index(&self) -> usize {
        match self {
            Component::X | Component::None => 0,
            Component::Y => 1,
            Component::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Component::X,
            1 => Component::Y,
            2 => Component::Z,
            _ => Component::None,
        }
    }

    fn as_str(&self) -> Option<&'static str> {
        match self {
            Component::X => Some("x"),
            Component::Y => Some("y"),
            Component::Z => Some("z"),
            Component::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelPath {
    /// File reference preceding '#' (may be empty)
    pub file: String,
    /// Entity id: bone name, morph id or node id
    pub entity: String,
    pub channel: Channel,
    pub component: Component,
}

impl ChannelPath {
    pub fn new(entity: impl Into<String>, channel: Channel, component: Component) -> Self {
        Self {
            file: String::new(),
            entity: entity.into(),
            channel,
            component,
        }
    }

    /// Shorthand for a morph dial path (`#id?value`).
    pub fn value_of(entity: impl Into<String>) -> Self {
        Self::new(entity, Channel::Value, Component::None)
    }

    /// Parse a DSON channel url according to the grammar described above.
    pub fn parse(s: &str) -> Result<Self, ChannelPathError> {
        if s.trim().is_empty() {
            return Err(ChannelPathError::Empty);
        }
        let (file, rest) = match s.rsplit_once('#') {
            Some((file, rest)) => (file, rest),
            None => ("", s),
        };
        let (entity, prop) = rest
            .split_once('?')
            .ok_or_else(|| ChannelPathError::MissingChannel(s.to_string()))?;
        let entity = percent_decode(entity);
        if entity.is_empty() {
            return Err(ChannelPathError::EmptyEntity(s.to_string()));
        }
        let (channel_s, component_s) = match prop.split_once('/') {
            Some((c, comp)) => (c, Some(comp)),
            None => (prop, None),
        };
        let channel = channel_s
            .parse::<Channel>()
            .map_err(|_| ChannelPathError::UnknownChannel {
                path: s.to_string(),
                channel: channel_s.to_string(),
            })?;
        let component = match component_s {
            None | Some("") => Component::None,
            Some("x") => Component::X,
            Some("y") => Component::Y,
            Some("z") => Component::Z,
            Some(other) => {
                return Err(ChannelPathError::UnknownComponent {
                    path: s.to_string(),
                    component: other.to_string(),
                })
            }
        };
        Ok(ChannelPath {
            file: file.to_string(),
            entity,
            channel,
            component,
        })
    }

    /// Same entity and channel, ignoring file reference and component.
    pub fn same_channel(&self, other: &ChannelPath) -> bool {
        self.entity == other.entity && self.channel == other.channel
    }

    /// Entity/channel/component key without the file reference.
    pub fn key(&self) -> String {
        match self.component.as_str() {
            Some(c) => format!("{}?{}/{}", self.entity, self.channel, c),
            None => format!("{}?{}", self.entity, self.channel),
        }
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.key())
    }
}

impl FromStr for ChannelPath {
    type Err = ChannelPathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelPath::parse(s)
    }
}

// Serde support: serialize as string, deserialize from string
impl Serialize for ChannelPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChannelPath {
    fn deserialize<D>(deserializer: D) -> Result<ChannelPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChannelPath::parse(&s).map_err(de::Error::custom)
    }
}
