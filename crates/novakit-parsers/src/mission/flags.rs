//! Flag words stored in mission files
//!
//! Every flag type keeps unknown bits so a decoded file re-encodes
//! byte for byte.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Mission-wide attributes and game modes from the header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AttribFlags: u32 {
        const WATER_OVERRIDE_ENABLE = 0x1;
        const FOG_DISTANCE_OVERRIDE_ENABLE = 0x2;
        const FOG_COLOR_OVERRIDE_ENABLE = 0x4;
        const WEATHER_OVERRIDE_ENABLE = 0x8;
        const ROTATE_MAP_180 = 0x20;
        const SINGLE_PLAYER_RESPAWN = 0x40;
        const ADVANCE_AND_SECURE = 0x1_0000;
        const CONQUER_AND_CONTROL = 0x2_0000;
        const ENABLE_NVG = 0x10_0000;
        const START_WITH_NVG_ON = 0x40_0000;
        const ATTACK_AND_DEFEND = 0x80_0000;
        const COOP = 0x100_0000;
        const DEATHMATCH = 0x200_0000;
        const KING_OF_THE_HILL = 0x400_0000;
        const FLAG_BALL = 0x800_0000;
        const CAPTURE_THE_FLAG = 0x1000_0000;
        const TEAM_DEATHMATCH = 0x2000_0000;
        const TEAM_KING_OF_THE_HILL = 0x4000_0000;
        const SEARCH_AND_DESTROY = 0x8000_0000;
    }
}

impl AttribFlags {
    /// Game mode name, checked in the order the game menus list them
    pub fn game_mode(&self) -> &'static str {
        const MODES: [(AttribFlags, &str); 11] = [
            (AttribFlags::DEATHMATCH, "Deathmatch"),
            (AttribFlags::TEAM_DEATHMATCH, "TeamDeathmatch"),
            (AttribFlags::COOP, "Coop"),
            (AttribFlags::TEAM_KING_OF_THE_HILL, "TeamKingOfTheHill"),
            (AttribFlags::KING_OF_THE_HILL, "KingOfTheHill"),
            (AttribFlags::SEARCH_AND_DESTROY, "SearchAndDestroy"),
            (AttribFlags::ATTACK_AND_DEFEND, "AttackAndDefend"),
            (AttribFlags::CAPTURE_THE_FLAG, "CaptureTheFlag"),
            (AttribFlags::FLAG_BALL, "FlagBall"),
            (AttribFlags::ADVANCE_AND_SECURE, "AdvanceAndSecure"),
            (AttribFlags::CONQUER_AND_CONTROL, "ConquerAndControl"),
        ];
        MODES
            .iter()
            .find(|(flag, _)| self.contains(*flag))
            .map_or("SinglePlayer", |(_, name)| *name)
    }
}

bitflags! {
    /// AI and placement attributes of a mission entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntityAttributes: u32 {
        const BLIND = 1 << 0;
        const GUARDING = 1 << 1;
        /// Removed when the player count is below `no_less_than`
        const REMOVE_IF_LESS_THAN = 1 << 4;
        /// Removed when the player count is above `no_more_than`
        const REMOVE_IF_MORE_THAN = 1 << 5;
        const MULTIPLAYER = 1 << 6;
        const BERSERK = 1 << 11;
        const FLYING_ORGANIC = 1 << 14;
        const COWARD = 1 << 16;
        const ADVANCED_AMMO = 1 << 18;
        const INDESTRUCTIBLE = 1 << 21;
        const NAVIGATION_WAYPOINT = 1 << 22;
        const REFLECTIVE = 1 << 23;
        const NO_SHADOW = 1 << 24;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WaypointFlags: u32 {
        const DOES_NOT_LOOP = 1 << 0;
        const BLUE_TEAM = 1 << 1;
        const RED_TEAM = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventFlags: u32 {
        const RESET_AFTER = 0x1;
        const PRE_MISSION = 0x2;
        const POST_MISSION = 0x4;
        const UNKNOWN_4 = 0x10;
        const UNKNOWN_5 = 0x20;
    }
}

/// `A | B` style rendering of the named bits, with any leftover bits in hex
pub fn describe_flags<B>(flags: &B) -> String
where
    B: bitflags::Flags<Bits = u32>,
{
    let mut names: Vec<String> = flags.iter_names().map(|(name, _)| name.to_string()).collect();
    let unknown = flags.bits() & !B::all().bits();
    if unknown != 0 {
        names.push(format!("0x{unknown:X}"));
    }
    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_priority() {
        assert_eq!(AttribFlags::empty().game_mode(), "SinglePlayer");
        assert_eq!((AttribFlags::COOP | AttribFlags::DEATHMATCH).game_mode(), "Deathmatch");
        assert_eq!(AttribFlags::FLAG_BALL.game_mode(), "FlagBall");
    }

    #[test]
    fn test_unknown_bits_survive() {
        let flags = EntityAttributes::from_bits_retain(0x8000_0003);
        assert_eq!(flags.bits(), 0x8000_0003);
        assert!(flags.contains(EntityAttributes::BLIND | EntityAttributes::GUARDING));
    }

    #[test]
    fn test_describe_flags() {
        assert_eq!(describe_flags(&EventFlags::empty()), "None");
        assert_eq!(
            describe_flags(&(EventFlags::RESET_AFTER | EventFlags::POST_MISSION)),
            "RESET_AFTER | POST_MISSION"
        );
        assert_eq!(describe_flags(&EventFlags::from_bits_retain(0x41)), "RESET_AFTER | 0x40");
    }
}
