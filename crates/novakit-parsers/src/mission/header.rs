//! Fixed 616-byte mission header
//!
//! ```text
//! 0x000  magic[4] "BMS?"   name[32]  designer[32]  terrain[48]  default[16]
//! 0x084  climate:u32  attrib_flags:u32  reserved[12]
//! 0x098  water_override:u16  unknown:u32  fog_override:u16  fog_color[3]  reserved:u8
//! 0x0A4  items  buildings  markers  people  events  weather      (u32 each)
//! 0x0BC  win[8]  lose[8]  reserved[16]  environment[16]  reserved[10]
//! 0x0F6  water_color[3]  murk:u16  unknown:u8  wind_speed  wind_dir  unknown[4]
//! 0x108  health  mana  music  reverb   terrain_tile[16]  briefing[256]
//! 0x228  reserved:i16  mission_type:u8  max_saves:u8  reserved[16]
//! 0x23C  map_zoom:f32  area_triggers:i16  loadout_len:u16  bonus_expiration:u16
//!        reserved:u16  start_time:u16  minutes_per_day:u16  reserved[28]
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::flags::AttribFlags;
use crate::io::{ByteReader, FixedString};
use crate::traits::{ParseError, ParseResult};
use crate::validation::{InvariantCheck, Validator};

pub const HEADER_SIZE: usize = 616;
pub const MAGIC_PREFIX: &[u8; 3] = b"BMS";

/// Header fields that are zero in every known file, plus two unknown words
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderReserved {
    pub unknown0: [u8; 12],
    pub unknown1: u32,
    pub unknown2: u8,
    pub unknown3: [u8; 16],
    pub unknown4: [u8; 10],
    pub unknown5: [u8; 4],
    pub unknown6: i16,
    pub unknown7: [u8; 16],
    pub unknown8: u16,
    pub unknown9: [u8; 28],
}

/// Section sizes stored in the header
///
/// These are derived from the mission's collections when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionCounts {
    pub items: u32,
    pub buildings: u32,
    pub markers: u32,
    pub people: u32,
    pub area_triggers: i16,
    pub loadout_len: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionHeader {
    pub magic: [u8; 4],
    pub name: FixedString<32>,
    pub designer: FixedString<32>,
    pub terrain: FixedString<48>,
    pub default_str: FixedString<16>,
    pub climate: u32,
    pub attrib_flags: AttribFlags,
    pub water_override: u16,
    pub fog_override: u16,
    pub fog_color: [u8; 3],
    /// Event count as stored; the trailer carries the authoritative one
    pub num_events: u32,
    pub weather: u32,
    pub win_conditions: [u8; 8],
    pub lose_conditions: [u8; 8],
    pub environment: FixedString<16>,
    pub water_color: [u8; 3],
    pub murk: u16,
    pub something1: u8,
    pub wind_speed: u32,
    pub wind_direction: u32,
    pub health: u32,
    pub mana: u32,
    pub music: u32,
    pub reverb: u32,
    pub terrain_tile: FixedString<16>,
    pub briefing: FixedString<256>,
    pub mission_type: u8,
    pub max_saves: u8,
    pub map_zoom: f32,
    pub bonus_expiration: u16,
    pub start_time: u16,
    pub minutes_per_day: u16,
    pub reserved: HeaderReserved,
}

impl Default for MissionHeader {
    fn default() -> Self {
        Self {
            magic: *b"BMS1",
            name: FixedString::default(),
            designer: FixedString::default(),
            terrain: FixedString::default(),
            default_str: FixedString::default(),
            climate: 0,
            attrib_flags: AttribFlags::empty(),
            water_override: 0,
            fog_override: 0,
            fog_color: [0; 3],
            num_events: 0,
            weather: 0,
            win_conditions: [0; 8],
            lose_conditions: [0; 8],
            environment: FixedString::default(),
            water_color: [0; 3],
            murk: 0,
            something1: 0,
            wind_speed: 0,
            wind_direction: 0,
            health: 0,
            mana: 0,
            music: 0,
            reverb: 0,
            terrain_tile: FixedString::default(),
            briefing: FixedString::default(),
            mission_type: 0,
            max_saves: 0,
            map_zoom: 1.0,
            bonus_expiration: 0,
            start_time: 0,
            minutes_per_day: 0,
            reserved: HeaderReserved::default(),
        }
    }
}

impl MissionHeader {
    /// Read the header and the section counts it carries
    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<(Self, SectionCounts)> {
        reader.mark();
        let start = reader.offset();

        let magic: [u8; 4] = reader.read_array("magic")?;
        if !magic.starts_with(MAGIC_PREFIX) {
            return Err(ParseError::malformed(
                start,
                "magic",
                format!("expected BMS prefix, found {magic:02X?}"),
            ));
        }

        let name = reader.read_fixed("name")?;
        let designer = reader.read_fixed("designer")?;
        let terrain = reader.read_fixed("terrain")?;
        let default_str = reader.read_fixed("default_str")?;
        let climate = reader.read_u32("climate")?;
        let attrib_flags = AttribFlags::from_bits_retain(reader.read_u32("attrib_flags")?);

        let mut reserved = HeaderReserved::default();
        let offset = reader.offset();
        reserved.unknown0 = reader.read_array("unknown0")?;
        validator.check(offset, InvariantCheck::zero_bytes("unknown0", &reserved.unknown0))?;

        let water_override = reader.read_u16("water_override")?;
        reserved.unknown1 = reader.read_u32("unknown1")?;
        let fog_override = reader.read_u16("fog_override")?;
        let fog_color = reader.read_array("fog_color")?;
        let offset = reader.offset();
        reserved.unknown2 = reader.read_u8("unknown2")?;
        validator.check(offset, InvariantCheck::zero("unknown2", reserved.unknown2))?;

        let mut counts = SectionCounts {
            items: reader.read_u32("num_items")?,
            buildings: reader.read_u32("num_buildings")?,
            markers: reader.read_u32("num_markers")?,
            people: reader.read_u32("num_people")?,
            ..SectionCounts::default()
        };
        let num_events = reader.read_u32("num_events")?;
        let weather = reader.read_u32("weather")?;
        let win_conditions = reader.read_array("win_conditions")?;
        let lose_conditions = reader.read_array("lose_conditions")?;

        let offset = reader.offset();
        reserved.unknown3 = reader.read_array("unknown3")?;
        validator.check(offset, InvariantCheck::zero_bytes("unknown3", &reserved.unknown3))?;
        let environment = reader.read_fixed("environment")?;
        let offset = reader.offset();
        reserved.unknown4 = reader.read_array("unknown4")?;
        validator.check(offset, InvariantCheck::zero_bytes("unknown4", &reserved.unknown4))?;

        let water_color = reader.read_array("water_color")?;
        let murk = reader.read_u16("murk")?;
        let something1 = reader.read_u8("something1")?;
        let wind_speed = reader.read_u32("wind_speed")?;
        let wind_direction = reader.read_u32("wind_direction")?;
        reserved.unknown5 = reader.read_array("unknown5")?;
        let health = reader.read_u32("health")?;
        let mana = reader.read_u32("mana")?;
        let music = reader.read_u32("music")?;
        let reverb = reader.read_u32("reverb")?;
        let terrain_tile = reader.read_fixed("terrain_tile")?;
        let briefing = reader.read_fixed("briefing")?;

        let offset = reader.offset();
        reserved.unknown6 = reader.read_i16("unknown6")?;
        validator.check(offset, InvariantCheck::zero("unknown6", reserved.unknown6))?;
        let mission_type = reader.read_u8("mission_type")?;
        let max_saves = reader.read_u8("max_saves")?;
        let offset = reader.offset();
        reserved.unknown7 = reader.read_array("unknown7")?;
        validator.check(offset, InvariantCheck::zero_bytes("unknown7", &reserved.unknown7))?;

        let map_zoom = reader.read_f32("map_zoom")?;
        counts.area_triggers = reader.read_i16("area_trigger_count")?;
        counts.loadout_len = reader.read_u16("weapon_loadout_len")?;
        let bonus_expiration = reader.read_u16("bonus_expiration")?;
        let offset = reader.offset();
        reserved.unknown8 = reader.read_u16("unknown8")?;
        validator.check(offset, InvariantCheck::zero("unknown8", reserved.unknown8))?;
        let start_time = reader.read_u16("start_time")?;
        let minutes_per_day = reader.read_u16("minutes_per_day")?;
        let offset = reader.offset();
        reserved.unknown9 = reader.read_array("unknown9")?;
        validator.check(offset, InvariantCheck::zero_bytes("unknown9", &reserved.unknown9))?;

        reader.assert_consumed("mission header", HEADER_SIZE)?;

        let header = Self {
            magic,
            name,
            designer,
            terrain,
            default_str,
            climate,
            attrib_flags,
            water_override,
            fog_override,
            fog_color,
            num_events,
            weather,
            win_conditions,
            lose_conditions,
            environment,
            water_color,
            murk,
            something1,
            wind_speed,
            wind_direction,
            health,
            mana,
            music,
            reverb,
            terrain_tile,
            briefing,
            mission_type,
            max_saves,
            map_zoom,
            bonus_expiration,
            start_time,
            minutes_per_day,
            reserved,
        };
        Ok((header, counts))
    }

    pub fn write(&self, counts: &SectionCounts, out: &mut Vec<u8>) -> ParseResult<()> {
        let reserved = &self.reserved;
        out.extend_from_slice(&self.magic);
        out.extend_from_slice(self.name.raw());
        out.extend_from_slice(self.designer.raw());
        out.extend_from_slice(self.terrain.raw());
        out.extend_from_slice(self.default_str.raw());
        out.write_u32::<LittleEndian>(self.climate)?;
        out.write_u32::<LittleEndian>(self.attrib_flags.bits())?;
        out.extend_from_slice(&reserved.unknown0);
        out.write_u16::<LittleEndian>(self.water_override)?;
        out.write_u32::<LittleEndian>(reserved.unknown1)?;
        out.write_u16::<LittleEndian>(self.fog_override)?;
        out.extend_from_slice(&self.fog_color);
        out.write_u8(reserved.unknown2)?;

        out.write_u32::<LittleEndian>(counts.items)?;
        out.write_u32::<LittleEndian>(counts.buildings)?;
        out.write_u32::<LittleEndian>(counts.markers)?;
        out.write_u32::<LittleEndian>(counts.people)?;
        out.write_u32::<LittleEndian>(self.num_events)?;
        out.write_u32::<LittleEndian>(self.weather)?;
        out.extend_from_slice(&self.win_conditions);
        out.extend_from_slice(&self.lose_conditions);
        out.extend_from_slice(&reserved.unknown3);
        out.extend_from_slice(self.environment.raw());
        out.extend_from_slice(&reserved.unknown4);

        out.extend_from_slice(&self.water_color);
        out.write_u16::<LittleEndian>(self.murk)?;
        out.write_u8(self.something1)?;
        out.write_u32::<LittleEndian>(self.wind_speed)?;
        out.write_u32::<LittleEndian>(self.wind_direction)?;
        out.extend_from_slice(&reserved.unknown5);
        out.write_u32::<LittleEndian>(self.health)?;
        out.write_u32::<LittleEndian>(self.mana)?;
        out.write_u32::<LittleEndian>(self.music)?;
        out.write_u32::<LittleEndian>(self.reverb)?;
        out.extend_from_slice(self.terrain_tile.raw());
        out.extend_from_slice(self.briefing.raw());

        out.write_i16::<LittleEndian>(reserved.unknown6)?;
        out.write_u8(self.mission_type)?;
        out.write_u8(self.max_saves)?;
        out.extend_from_slice(&reserved.unknown7);
        out.write_f32::<LittleEndian>(self.map_zoom)?;
        out.write_i16::<LittleEndian>(counts.area_triggers)?;
        out.write_u16::<LittleEndian>(counts.loadout_len)?;
        out.write_u16::<LittleEndian>(self.bonus_expiration)?;
        out.write_u16::<LittleEndian>(reserved.unknown8)?;
        out.write_u16::<LittleEndian>(self.start_time)?;
        out.write_u16::<LittleEndian>(self.minutes_per_day)?;
        out.extend_from_slice(&reserved.unknown9);
        Ok(())
    }

    pub fn game_mode(&self) -> &'static str {
        self.attrib_flags.game_mode()
    }
}
