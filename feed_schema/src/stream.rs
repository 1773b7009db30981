use ahash::AHashMap;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{error::DefinitionError, window::WindowFlags, MAX_STREAMS};

bitflags! {
    /// Layout flags carried by every stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StreamFlags: u8 {
        /// Paints only set cells over the layer below.
        const TRANSPARENT = 0x01;
        /// Content is not memorized between redraws.
        const OVERLAYED = 0x02;
        /// Starts a new group in the subscription listing.
        const NEXT_GROUP = 0x04;
        /// Pushed to every connection without a request.
        const AUTO = 0x08;
        /// Follows the window's horizontal scroll offset.
        const KEEP_X = 0x10;
        /// Follows the window's vertical scroll offset.
        const KEEP_Y = 0x20;
        /// Buffers are sized for `max_rows` from the start.
        const MAX_BUFFER = 0x40;
        /// Never advertised in the subscription listing.
        const HIDE = 0x80;
    }
}

/// Static description of one grid channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDef {
    pub id: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flags: StreamFlags,
    pub window: WindowFlags,
    pub cols: u16,
    pub rows: u16,
    #[serde(default)]
    pub max_rows: u16,
}

impl StreamDef {
    /// Transparent and overlay channels never keep a delta baseline.
    pub fn keeps_baseline(&self) -> bool {
        !self
            .flags
            .intersects(StreamFlags::TRANSPARENT | StreamFlags::OVERLAYED)
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(StreamFlags::TRANSPARENT)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(StreamFlags::HIDE)
    }

    pub fn is_auto(&self) -> bool {
        self.flags.contains(StreamFlags::AUTO)
    }

    /// Number of rows buffers must be able to hold for this stream.
    pub fn capacity_rows(&self) -> u16 {
        if self.flags.contains(StreamFlags::MAX_BUFFER) {
            self.rows.max(self.max_rows)
        } else {
            self.rows
        }
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.id as usize >= MAX_STREAMS {
            return Err(DefinitionError::StreamIdOutOfRange(self.id));
        }
        let max_rows_invalid = self.flags.contains(StreamFlags::MAX_BUFFER)
            && self.max_rows != 0
            && self.max_rows < self.rows;
        if self.cols == 0 || self.rows == 0 || max_rows_invalid {
            return Err(DefinitionError::StreamDimensions {
                id: self.id,
                cols: self.cols,
                rows: self.rows,
                max_rows: self.max_rows,
            });
        }
        if self.window.bits().count_ones() != 1 {
            return Err(DefinitionError::StreamWindow {
                id: self.id,
                bits: self.window.bits(),
            });
        }
        Ok(())
    }
}

/// Consecutive advertised streams the client picks from as one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGroup {
    pub streams: Vec<u8>,
}

/// The loaded set of streams, in declaration (and draw) order.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: Vec<StreamDef>,
    slots: [Option<usize>; MAX_STREAMS],
    by_name: AHashMap<String, u8>,
}

impl StreamRegistry {
    pub fn new(defs: Vec<StreamDef>) -> Result<Self, DefinitionError> {
        let mut slots = [None; MAX_STREAMS];
        let mut by_name = AHashMap::with_capacity(defs.len());
        for (position, def) in defs.iter().enumerate() {
            def.validate()?;
            let slot = &mut slots[def.id as usize];
            if slot.is_some() {
                return Err(DefinitionError::DuplicateStream(def.id));
            }
            *slot = Some(position);
            if !def.name.is_empty() {
                by_name.insert(def.name.clone(), def.id);
            }
        }
        Ok(Self {
            streams: defs,
            slots,
            by_name,
        })
    }

    pub fn get(&self, id: u8) -> Option<&StreamDef> {
        let position = (*self.slots.get(id as usize)?)?;
        self.streams.get(position)
    }

    pub fn find(&self, name: &str) -> Option<&StreamDef> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamDef> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn auto_subscribed(&self) -> impl Iterator<Item = &StreamDef> {
        self.streams.iter().filter(|def| def.is_auto())
    }

    /// Subscription listing shown to users. Hidden streams never appear.
    pub fn listing(&self) -> Vec<StreamGroup> {
        let mut groups: Vec<StreamGroup> = Vec::new();
        for def in &self.streams {
            if def.is_hidden() {
                continue;
            }
            let starts_group = def.flags.contains(StreamFlags::NEXT_GROUP);
            match groups.last_mut() {
                Some(group) if !starts_group => group.streams.push(def.id),
                _ => groups.push(StreamGroup {
                    streams: vec![def.id],
                }),
            }
        }
        groups
    }

    pub fn defs(&self) -> &[StreamDef] {
        &self.streams
    }
}
