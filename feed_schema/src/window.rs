use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Kinds of client window a stream can be routed to.
    ///
    /// `0x4000` and `0x8000` mean `PLAYER_3` and `SPECIAL_INFO` in this
    /// deployment. The older borg message/status windows that shared those
    /// bits are not supported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct WindowFlags: u32 {
        const INVEN = 0x0000_0001;
        const EQUIP = 0x0000_0002;
        const PLAYER_0 = 0x0000_0004;
        const PLAYER_1 = 0x0000_0008;
        const PLAYER_2 = 0x0000_0010;
        const MAP = 0x0000_0020;
        const MESSAGE = 0x0000_0040;
        const OVERHEAD = 0x0000_0080;
        const MONSTER = 0x0000_0100;
        const OBJECT = 0x0000_0200;
        const MONLIST = 0x0000_0400;
        const STATUS = 0x0000_0800;
        const MESSAGE_CHAT = 0x0000_1000;
        const SPELL = 0x0000_2000;
        const PLAYER_3 = 0x0000_4000;
        const SPECIAL_INFO = 0x0000_8000;
        const STORE = 0x0001_0000;
        const ITEMLIST = 0x0002_0000;
    }
}

impl WindowFlags {
    /// Basic and compact character sheets.
    pub const PLAYER: Self = Self::PLAYER_0.union(Self::PLAYER_2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_bits_have_one_meaning() {
        assert_eq!(WindowFlags::PLAYER_3.bits(), 0x4000);
        assert_eq!(WindowFlags::SPECIAL_INFO.bits(), 0x8000);
        let parsed: WindowFlags = serde_json::from_str("\"SPECIAL_INFO\"").unwrap();
        assert_eq!(parsed, WindowFlags::SPECIAL_INFO);
    }

    #[test]
    fn player_combines_basic_and_compact() {
        assert!(WindowFlags::PLAYER.contains(WindowFlags::PLAYER_0));
        assert!(WindowFlags::PLAYER.contains(WindowFlags::PLAYER_2));
        assert!(!WindowFlags::PLAYER.contains(WindowFlags::PLAYER_1));
    }
}
