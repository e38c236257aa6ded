//! 172-byte entity records
//!
//! Items, buildings, markers and organics share one record layout. The
//! category is not stored in the record; it follows from which of the four
//! header-counted arrays the record was read from.

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use novakit_core::{Fixed32, Vec3};

use super::flags::EntityAttributes;
use super::lookup::ItemLookup;
use crate::io::{ByteReader, FixedString, WriteFieldsExt};
use crate::traits::ParseResult;
use crate::validation::{InvariantCheck, Validator};

pub const ENTITY_SIZE: usize = 0xAC;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Item,
    Building,
    Marker,
    Organic,
}

impl EntityCategory {
    /// File order of the entity arrays
    pub const ALL: [EntityCategory; 4] = [Self::Item, Self::Building, Self::Marker, Self::Organic];

    pub fn label(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Building => "building",
            Self::Marker => "marker",
            Self::Organic => "organic",
        }
    }
}

/// Entity fields that are zero in every known file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityReserved {
    pub unk15a: u8,
    pub unk19: i16,
    pub unk22_26: [i16; 5],
    pub unk30_31: i32,
    pub unk41: i32,
    pub unk42b: i16,
    pub unk43: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionEntity {
    pub category: EntityCategory,
    pub type_id: i32,
    pub name_index: i32,
    pub id: i32,
    pub attributes: EntityAttributes,
    /// x, y, z in 16.16 fixed point
    pub position: [Fixed32; 3],
    pub wp_distance: i32,
    pub perception2: i32,
    pub perfectionist2: i32,
    pub min_engage_distance: i32,
    pub max_engage_distance: i32,
    pub wp_number: i32,
    pub weapon_accuracy2: i16,
    pub weapon_accuracy1: i16,
    pub yaw: i16,
    pub pitch: i16,
    pub roll: i16,
    pub spawns: i16,
    pub crouch_timer: u8,
    pub shoot_timer: i16,
    pub wp_advance_trigger: i16,
    pub attention: i16,
    pub alert_state: u8,
    pub team: u8,
    pub no_more_than: u8,
    pub no_less_than: u8,
    pub group_id: u8,
    pub waypoint_id: u8,
    pub obliqueness: u8,
    pub map_symbol: u8,
    pub fire_timer: i32,
    pub ttool_index: i32,
    pub ai_name: FixedString<8>,
    pub ai_textfile: FixedString<8>,
    pub gen_string: FixedString<36>,
    pub max_attack_distance: i32,
    pub color_override: u8,
    pub team_budget: u8,
    pub reserved: EntityReserved,
}

impl MissionEntity {
    /// A blank record of `category` at the given world position
    pub fn new(category: EntityCategory, type_id: i32, id: i32, position: Vec3) -> Self {
        Self {
            category,
            type_id,
            name_index: 0,
            id,
            attributes: EntityAttributes::empty(),
            position: [
                Fixed32::from_value(f64::from(position.x)),
                Fixed32::from_value(f64::from(position.y)),
                Fixed32::from_value(f64::from(position.z)),
            ],
            wp_distance: 0,
            perception2: 0,
            perfectionist2: 0,
            min_engage_distance: 0,
            max_engage_distance: 0,
            wp_number: 0,
            weapon_accuracy2: 0,
            weapon_accuracy1: 0,
            yaw: 0,
            pitch: 0,
            roll: 0,
            spawns: 0,
            crouch_timer: 0,
            shoot_timer: 0,
            wp_advance_trigger: 0,
            attention: 0,
            alert_state: 0,
            team: 0,
            no_more_than: 0,
            no_less_than: 0,
            group_id: 0,
            waypoint_id: 0,
            obliqueness: 0,
            map_symbol: 0,
            fire_timer: 0,
            ttool_index: 0,
            ai_name: FixedString::default(),
            ai_textfile: FixedString::default(),
            gen_string: FixedString::default(),
            max_attack_distance: 0,
            color_override: 0,
            team_budget: 0,
            reserved: EntityReserved::default(),
        }
    }

    pub fn world_position(&self) -> Vec3 {
        let [x, y, z] = self.position;
        Vec3::new(x.value() as f32, y.value() as f32, z.value() as f32)
    }

    /// Display name from `lookup`, falling back to the numeric type id
    pub fn display_name(&self, lookup: &dyn ItemLookup) -> String {
        lookup
            .item_name(self.type_id)
            .unwrap_or_else(|| format!("{} #{}", self.category.label(), self.type_id))
    }

    pub fn read(reader: &mut ByteReader<'_>, category: EntityCategory, validator: &mut Validator) -> ParseResult<Self> {
        reader.mark();
        let mut reserved = EntityReserved::default();

        let type_id = reader.read_i32("type_id")?;
        let name_index = reader.read_i32("name_index")?;
        let id = reader.read_i32("id")?;
        let attributes = EntityAttributes::from_bits_retain(reader.read_u32("attributes")?);
        let position = [
            reader.read_fixed32("position_x")?,
            reader.read_fixed32("position_y")?,
            reader.read_fixed32("position_z")?,
        ];
        let wp_distance = reader.read_i32("wp_distance")?;
        let perception2 = reader.read_i32("perception2")?;
        let perfectionist2 = reader.read_i32("perfectionist2")?;
        let min_engage_distance = reader.read_i32("min_engage_distance")?;
        let max_engage_distance = reader.read_i32("max_engage_distance")?;
        let wp_number = reader.read_i32("wp_number")?;
        let weapon_accuracy2 = reader.read_i16("weapon_accuracy2")?;
        let weapon_accuracy1 = reader.read_i16("weapon_accuracy1")?;
        let yaw = reader.read_i16("yaw")?;
        let pitch = reader.read_i16("pitch")?;
        let roll = reader.read_i16("roll")?;
        let spawns = reader.read_i16("spawns")?;
        let crouch_timer = reader.read_u8("crouch_timer")?;

        let offset = reader.offset();
        reserved.unk15a = reader.read_u8("unk15a")?;
        validator.check(offset, InvariantCheck::zero("unk15a", reserved.unk15a))?;

        let shoot_timer = reader.read_i16("shoot_timer")?;
        let wp_advance_trigger = reader.read_i16("wp_advance_trigger")?;
        let attention = reader.read_i16("attention")?;
        let alert_state = reader.read_u8("alert_state")?;
        let team = reader.read_u8("team")?;
        let no_more_than = reader.read_u8("no_more_than")?;
        let no_less_than = reader.read_u8("no_less_than")?;

        let offset = reader.offset();
        reserved.unk19 = reader.read_i16("unk19")?;
        validator.check(offset, InvariantCheck::zero("unk19", reserved.unk19))?;

        let group_id = reader.read_u8("group_id")?;
        let waypoint_id = reader.read_u8("waypoint_id")?;
        let obliqueness = reader.read_u8("obliqueness")?;
        let map_symbol = reader.read_u8("map_symbol")?;

        for slot in reserved.unk22_26.iter_mut() {
            let offset = reader.offset();
            *slot = reader.read_i16("unk22_26")?;
            validator.check(offset, InvariantCheck::zero("unk22_26", *slot))?;
        }

        let fire_timer = reader.read_i32("fire_timer")?;
        let ttool_index = reader.read_i32("ttool_index")?;
        let offset = reader.offset();
        reserved.unk30_31 = reader.read_i32("unk30_31")?;
        validator.check(offset, InvariantCheck::zero("unk30_31", reserved.unk30_31))?;

        let ai_name = reader.read_fixed("ai_name")?;
        let ai_textfile = reader.read_fixed("ai_textfile")?;
        let gen_string = reader.read_fixed("gen_string")?;
        let max_attack_distance = reader.read_i32("max_attack_distance")?;

        let offset = reader.offset();
        reserved.unk41 = reader.read_i32("unk41")?;
        validator.check(offset, InvariantCheck::zero("unk41", reserved.unk41))?;
        let color_override = reader.read_u8("color_override")?;
        let team_budget = reader.read_u8("team_budget")?;
        let offset = reader.offset();
        reserved.unk42b = reader.read_i16("unk42b")?;
        validator.check(offset, InvariantCheck::zero("unk42b", reserved.unk42b))?;
        let offset = reader.offset();
        reserved.unk43 = reader.read_i32("unk43")?;
        validator.check(offset, InvariantCheck::zero("unk43", reserved.unk43))?;

        reader.assert_consumed("mission entity", ENTITY_SIZE)?;

        Ok(Self {
            category,
            type_id,
            name_index,
            id,
            attributes,
            position,
            wp_distance,
            perception2,
            perfectionist2,
            min_engage_distance,
            max_engage_distance,
            wp_number,
            weapon_accuracy2,
            weapon_accuracy1,
            yaw,
            pitch,
            roll,
            spawns,
            crouch_timer,
            shoot_timer,
            wp_advance_trigger,
            attention,
            alert_state,
            team,
            no_more_than,
            no_less_than,
            group_id,
            waypoint_id,
            obliqueness,
            map_symbol,
            fire_timer,
            ttool_index,
            ai_name,
            ai_textfile,
            gen_string,
            max_attack_distance,
            color_override,
            team_budget,
            reserved,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        let reserved = &self.reserved;
        out.write_i32::<LittleEndian>(self.type_id)?;
        out.write_i32::<LittleEndian>(self.name_index)?;
        out.write_i32::<LittleEndian>(self.id)?;
        out.write_u32::<LittleEndian>(self.attributes.bits())?;
        for &axis in &self.position {
            out.write_fixed32(axis)?;
        }
        out.write_i32::<LittleEndian>(self.wp_distance)?;
        out.write_i32::<LittleEndian>(self.perception2)?;
        out.write_i32::<LittleEndian>(self.perfectionist2)?;
        out.write_i32::<LittleEndian>(self.min_engage_distance)?;
        out.write_i32::<LittleEndian>(self.max_engage_distance)?;
        out.write_i32::<LittleEndian>(self.wp_number)?;
        out.write_i16::<LittleEndian>(self.weapon_accuracy2)?;
        out.write_i16::<LittleEndian>(self.weapon_accuracy1)?;
        out.write_i16::<LittleEndian>(self.yaw)?;
        out.write_i16::<LittleEndian>(self.pitch)?;
        out.write_i16::<LittleEndian>(self.roll)?;
        out.write_i16::<LittleEndian>(self.spawns)?;
        out.write_u8(self.crouch_timer)?;
        out.write_u8(reserved.unk15a)?;
        out.write_i16::<LittleEndian>(self.shoot_timer)?;
        out.write_i16::<LittleEndian>(self.wp_advance_trigger)?;
        out.write_i16::<LittleEndian>(self.attention)?;
        out.write_u8(self.alert_state)?;
        out.write_u8(self.team)?;
        out.write_u8(self.no_more_than)?;
        out.write_u8(self.no_less_than)?;
        out.write_i16::<LittleEndian>(reserved.unk19)?;
        out.write_u8(self.group_id)?;
        out.write_u8(self.waypoint_id)?;
        out.write_u8(self.obliqueness)?;
        out.write_u8(self.map_symbol)?;
        for &slot in &reserved.unk22_26 {
            out.write_i16::<LittleEndian>(slot)?;
        }
        out.write_i32::<LittleEndian>(self.fire_timer)?;
        out.write_i32::<LittleEndian>(self.ttool_index)?;
        out.write_i32::<LittleEndian>(reserved.unk30_31)?;
        out.extend_from_slice(self.ai_name.raw());
        out.extend_from_slice(self.ai_textfile.raw());
        out.extend_from_slice(self.gen_string.raw());
        out.write_i32::<LittleEndian>(self.max_attack_distance)?;
        out.write_i32::<LittleEndian>(reserved.unk41)?;
        out.write_u8(self.color_override)?;
        out.write_u8(self.team_budget)?;
        out.write_i16::<LittleEndian>(reserved.unk42b)?;
        out.write_i32::<LittleEndian>(reserved.unk43)?;
        Ok(())
    }
}
