//! Binary mission files (`.bms`)
//!
//! # Format Structure
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (616 bytes)             counts for the sections below │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Weapon loadout                 loadout_len raw bytes         │
//! │ Items, buildings, markers,     172 bytes each, header counts │
//! │ organics                                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Waypoints   128 x 136                                        │
//! │ Groups       64 x  32                                        │
//! │ Layers       32 x  20                                        │
//! │ Area triggers  area_trigger_count x 28                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ events:i32 triggers:i32 actions:i32                          │
//! │ Events x 24, Triggers x 32, Actions x 32                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ bbox_count:i32  Bounding boxes x 36                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trigger and action counts in the trailer must equal the sums of the
//! per-event counts. A mismatch means the layout was misread, so it always
//! fails the decode regardless of validation mode.

pub mod entity;
pub mod flags;
pub mod header;
pub mod lookup;
pub mod script;
pub mod tables;

pub use entity::{EntityCategory, MissionEntity};
pub use flags::{AttribFlags, EntityAttributes, EventFlags, WaypointFlags};
pub use header::{MissionHeader, SectionCounts};
pub use lookup::{ItemLookup, NoLookup};
pub use script::{describe_event, LogicOperator, MissionAction, MissionEvent, MissionTrigger, TriggerKind};
pub use tables::{AreaTrigger, BoundingBox, MissionGroup, MissionLayer, Waypoint};

use std::fmt::Write as _;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::io::ByteReader;
use crate::traits::{Decoded, HumanReadable, ParseError, ParseOptions, ParseResult, Parser};
use crate::validation::Validator;

use tables::{GROUP_COUNT, LAYER_COUNT, WAYPOINT_COUNT};

/// A decoded mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionFile {
    pub header: MissionHeader,
    pub loadout: Vec<u8>,
    pub items: Vec<MissionEntity>,
    pub buildings: Vec<MissionEntity>,
    pub markers: Vec<MissionEntity>,
    pub organics: Vec<MissionEntity>,
    pub waypoints: Vec<Waypoint>,
    pub groups: Vec<MissionGroup>,
    pub layers: Vec<MissionLayer>,
    pub area_triggers: Vec<AreaTrigger>,
    pub events: Vec<MissionEvent>,
    pub triggers: Vec<MissionTrigger>,
    pub actions: Vec<MissionAction>,
    pub bounding_boxes: Vec<BoundingBox>,
    /// Bytes after the bounding boxes
    pub trailing: Vec<u8>,
}

impl Default for MissionFile {
    fn default() -> Self {
        Self::new(MissionHeader::default())
    }
}

impl MissionFile {
    /// Empty mission with full-size fixed tables
    pub fn new(header: MissionHeader) -> Self {
        Self {
            header,
            loadout: Vec::new(),
            items: Vec::new(),
            buildings: Vec::new(),
            markers: Vec::new(),
            organics: Vec::new(),
            waypoints: vec![Waypoint::default(); WAYPOINT_COUNT],
            groups: vec![MissionGroup::default(); GROUP_COUNT],
            layers: vec![MissionLayer::default(); LAYER_COUNT],
            area_triggers: Vec::new(),
            events: Vec::new(),
            triggers: Vec::new(),
            actions: Vec::new(),
            bounding_boxes: Vec::new(),
            trailing: Vec::new(),
        }
    }

    pub fn entities_of(&self, category: EntityCategory) -> &[MissionEntity] {
        match category {
            EntityCategory::Item => &self.items,
            EntityCategory::Building => &self.buildings,
            EntityCategory::Marker => &self.markers,
            EntityCategory::Organic => &self.organics,
        }
    }

    pub fn entities_of_mut(&mut self, category: EntityCategory) -> &mut Vec<MissionEntity> {
        match category {
            EntityCategory::Item => &mut self.items,
            EntityCategory::Building => &mut self.buildings,
            EntityCategory::Marker => &mut self.markers,
            EntityCategory::Organic => &mut self.organics,
        }
    }

    /// All entities in file order
    pub fn entities(&self) -> impl Iterator<Item = &MissionEntity> {
        EntityCategory::ALL
            .into_iter()
            .flat_map(move |category| self.entities_of(category).iter())
    }

    pub fn entity_count(&self) -> usize {
        self.items.len() + self.buildings.len() + self.markers.len() + self.organics.len()
    }

    pub fn find_entity(&self, id: i32) -> Option<&MissionEntity> {
        self.entities().find(|entity| entity.id == id)
    }

    /// Header counts as they follow from the collections
    pub fn section_counts(&self) -> ParseResult<SectionCounts> {
        let count = |field: &str, len: usize| {
            u32::try_from(len).map_err(|_| ParseError::overflow(field, len as u64, u64::from(u32::MAX)))
        };
        let area_triggers = self.area_triggers.len();
        let loadout_len = self.loadout.len();
        Ok(SectionCounts {
            items: count("num_items", self.items.len())?,
            buildings: count("num_buildings", self.buildings.len())?,
            markers: count("num_markers", self.markers.len())?,
            people: count("num_people", self.organics.len())?,
            area_triggers: i16::try_from(area_triggers)
                .map_err(|_| ParseError::overflow("area_trigger_count", area_triggers as u64, i16::MAX as u64))?,
            loadout_len: u16::try_from(loadout_len)
                .map_err(|_| ParseError::overflow("weapon_loadout_len", loadout_len as u64, u64::from(u16::MAX)))?,
        })
    }

    /// Check that the per-event counts add up to the trigger and action arrays
    pub fn check_script_counts(&self) -> ParseResult<()> {
        let trigger_sum: usize = self.events.iter().map(|e| usize::from(e.trigger_count)).sum();
        let action_sum: usize = self.events.iter().map(|e| usize::from(e.action_count)).sum();
        if trigger_sum != self.triggers.len() {
            return Err(ParseError::invariant(
                0,
                "trigger_count",
                format!("events reference {trigger_sum} triggers, file holds {}", self.triggers.len()),
            ));
        }
        if action_sum != self.actions.len() {
            return Err(ParseError::invariant(
                0,
                "action_count",
                format!("events reference {action_sum} actions, file holds {}", self.actions.len()),
            ));
        }
        Ok(())
    }

    pub fn event_triggers(&self, event: &MissionEvent) -> Option<&[MissionTrigger]> {
        self.triggers.get(event.trigger_range())
    }

    pub fn event_actions(&self, event: &MissionEvent) -> Option<&[MissionAction]> {
        self.actions.get(event.action_range())
    }

    /// Every event with its triggers and actions, one block per event
    pub fn script_listing(&self, raw: bool) -> String {
        self.events
            .iter()
            .enumerate()
            .map(|(index, event)| describe_event(index, event, &self.triggers, &self.actions, raw))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Entity listing with names resolved through `lookup`
    pub fn entity_listing(&self, lookup: &dyn ItemLookup) -> String {
        let mut out = String::new();
        for entity in self.entities() {
            let position = entity.world_position();
            let _ = writeln!(
                out,
                "{:<8} id={:<5} {:<24} team={} at ({:.2}, {:.2}, {:.2})",
                entity.category.label(),
                entity.id,
                entity.display_name(lookup),
                entity.team,
                position.x,
                position.y,
                position.z
            );
        }
        out
    }

    pub fn active_waypoints(&self) -> impl Iterator<Item = (usize, &Waypoint)> {
        self.waypoints.iter().enumerate().filter(|(_, w)| w.is_active())
    }
}

impl HumanReadable for MissionFile {
    fn to_readable_string(&self) -> String {
        let header = &self.header;
        let mut out = String::new();
        let _ = writeln!(out, "=== {} by {} ===", header.name, header.designer);
        let _ = writeln!(
            out,
            "Terrain: {} | Type: {} | Climate: {}",
            header.terrain,
            header.game_mode(),
            header.climate
        );
        let _ = writeln!(
            out,
            "Entities: {} items, {} buildings, {} markers, {} people",
            self.items.len(),
            self.buildings.len(),
            self.markers.len(),
            self.organics.len()
        );
        let _ = writeln!(
            out,
            "Scripts: {} events, {} triggers, {} actions",
            self.events.len(),
            self.triggers.len(),
            self.actions.len()
        );
        let _ = writeln!(
            out,
            "World: {} area triggers, {} bounding boxes, {} active waypoints",
            self.area_triggers.len(),
            self.bounding_boxes.len(),
            self.active_waypoints().count()
        );
        if !header.briefing.is_blank() {
            let _ = writeln!(out, "Briefing: {}", header.briefing);
        }
        out
    }
}

fn read_count(reader: &mut ByteReader<'_>, field: &str, record_size: usize) -> ParseResult<usize> {
    let offset = reader.offset();
    let raw = reader.read_i32(field)?;
    let count = usize::try_from(raw).map_err(|_| ParseError::malformed(offset, field, format!("negative count {raw}")))?;
    check_fits(reader, field, count, record_size)?;
    Ok(count)
}

fn check_fits(reader: &ByteReader<'_>, field: &str, count: usize, record_size: usize) -> ParseResult<()> {
    let needed = count.saturating_mul(record_size);
    if needed > reader.remaining() {
        return Err(ParseError::truncated(
            reader.offset(),
            field,
            needed as u64,
            reader.remaining() as u64,
        ));
    }
    Ok(())
}

fn read_records<T>(
    reader: &mut ByteReader<'_>,
    count: usize,
    what: &str,
    mut read: impl FnMut(&mut ByteReader<'_>) -> ParseResult<T>,
) -> ParseResult<Vec<T>> {
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        records.push(read(reader).map_err(|e| e.with_context(format!("{what} {index}")))?);
    }
    Ok(records)
}

fn len_i32(field: &str, len: usize) -> ParseResult<i32> {
    i32::try_from(len).map_err(|_| ParseError::overflow(field, len as u64, i32::MAX as u64))
}

/// Mission file codec
pub struct MissionParser;

impl MissionParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MissionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for MissionParser {
    type Output = MissionFile;

    fn extensions(&self) -> &[&str] {
        &["bms"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(header::MAGIC_PREFIX)
    }

    fn name(&self) -> &str {
        "BMS Mission Parser"
    }

    fn decode(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<MissionFile>> {
        let mut reader = ByteReader::new(data).with_length_checks(options.check_record_lengths);
        let mut validator = Validator::new(options);

        let (header, counts) =
            MissionHeader::read(&mut reader, &mut validator).map_err(|e| e.with_context("mission header"))?;
        let loadout = reader.read_bytes("weapon_loadout", usize::from(counts.loadout_len))?.to_vec();

        let mut entities: [Vec<MissionEntity>; 4] = Default::default();
        let per_category = [counts.items, counts.buildings, counts.markers, counts.people];
        for ((category, count), list) in EntityCategory::ALL.into_iter().zip(per_category).zip(entities.iter_mut()) {
            let count = count as usize;
            check_fits(&reader, category.label(), count, entity::ENTITY_SIZE)?;
            *list = read_records(&mut reader, count, category.label(), |r| {
                MissionEntity::read(r, category, &mut validator)
            })?;
        }
        let [items, buildings, markers, organics] = entities;

        let waypoints = read_records(&mut reader, WAYPOINT_COUNT, "waypoint", |r| Waypoint::read(r, &mut validator))?;
        let groups = read_records(&mut reader, GROUP_COUNT, "group", |r| MissionGroup::read(r, &mut validator))?;
        let layers = read_records(&mut reader, LAYER_COUNT, "layer", |r| MissionLayer::read(r, &mut validator))?;

        let area_count = usize::try_from(counts.area_triggers).map_err(|_| {
            ParseError::malformed(0x240, "area_trigger_count", format!("negative count {}", counts.area_triggers))
        })?;
        check_fits(&reader, "area_triggers", area_count, tables::AREA_TRIGGER_SIZE)?;
        let area_triggers = read_records(&mut reader, area_count, "area trigger", AreaTrigger::read)?;

        let counts_offset = reader.offset();
        let event_count = read_count(&mut reader, "event_count", script::EVENT_SIZE)?;
        let trigger_count = reader.read_i32("trigger_count")?;
        let action_count = reader.read_i32("action_count")?;
        let trigger_count = usize::try_from(trigger_count).map_err(|_| {
            ParseError::malformed(counts_offset + 4, "trigger_count", format!("negative count {trigger_count}"))
        })?;
        let action_count = usize::try_from(action_count).map_err(|_| {
            ParseError::malformed(counts_offset + 8, "action_count", format!("negative count {action_count}"))
        })?;

        let events = read_records(&mut reader, event_count, "event", |r| MissionEvent::read(r, &mut validator))?;
        check_fits(&reader, "triggers", trigger_count, script::TRIGGER_SIZE)?;
        let triggers = read_records(&mut reader, trigger_count, "trigger", |r| {
            MissionTrigger::read(r, &mut validator)
        })?;
        check_fits(&reader, "actions", action_count, script::ACTION_SIZE)?;
        let actions = read_records(&mut reader, action_count, "action", |r| MissionAction::read(r, &mut validator))?;

        let bbox_count = read_count(&mut reader, "bounding_box_count", tables::BOUNDING_BOX_SIZE)?;
        let bounding_boxes = read_records(&mut reader, bbox_count, "bounding box", BoundingBox::read)?;

        let trailing = reader.read_bytes("trailing", reader.remaining())?.to_vec();
        if !trailing.is_empty() {
            validator.report(
                (data.len() - trailing.len()) as u64,
                "trailing_bytes",
                format!("{} bytes after the bounding boxes", trailing.len()),
            )?;
        }

        let mission = MissionFile {
            header,
            loadout,
            items,
            buildings,
            markers,
            organics,
            waypoints,
            groups,
            layers,
            area_triggers,
            events,
            triggers,
            actions,
            bounding_boxes,
            trailing,
        };
        mission.check_script_counts().map_err(|e| match e {
            ParseError::InvariantViolated { field, detail, .. } => ParseError::InvariantViolated {
                offset: counts_offset,
                field,
                detail,
            },
            other => other,
        })?;

        if mission.header.num_events as usize != mission.events.len() {
            validator.report(
                0xB4,
                "num_events",
                format!(
                    "header lists {} events, script holds {}",
                    mission.header.num_events,
                    mission.events.len()
                ),
            )?;
        }

        tracing::debug!(
            entities = mission.entity_count(),
            events = mission.events.len(),
            triggers = mission.triggers.len(),
            actions = mission.actions.len(),
            "Decoded mission"
        );
        Ok(Decoded::new(mission, validator.finish()))
    }

    fn serialize(&self, mission: &MissionFile) -> ParseResult<Vec<u8>> {
        mission.check_script_counts()?;
        for (field, len, max) in [
            ("waypoints", mission.waypoints.len(), WAYPOINT_COUNT),
            ("groups", mission.groups.len(), GROUP_COUNT),
            ("layers", mission.layers.len(), LAYER_COUNT),
        ] {
            if len > max {
                return Err(ParseError::overflow(field, len as u64, max as u64));
            }
        }
        let counts = mission.section_counts()?;

        let mut out = Vec::with_capacity(header::HEADER_SIZE + mission.entity_count() * entity::ENTITY_SIZE);
        mission.header.write(&counts, &mut out)?;
        out.extend_from_slice(&mission.loadout);

        for entity in mission.entities() {
            entity.write(&mut out)?;
        }

        let blank_waypoint = Waypoint::default();
        for index in 0..WAYPOINT_COUNT {
            mission.waypoints.get(index).unwrap_or(&blank_waypoint).write(&mut out)?;
        }
        for index in 0..GROUP_COUNT {
            out.extend_from_slice(&mission.groups.get(index).copied().unwrap_or_default().raw);
        }
        for index in 0..LAYER_COUNT {
            out.extend_from_slice(&mission.layers.get(index).copied().unwrap_or_default().raw);
        }
        for trigger in &mission.area_triggers {
            trigger.write(&mut out)?;
        }

        out.write_i32::<LittleEndian>(len_i32("event_count", mission.events.len())?)?;
        out.write_i32::<LittleEndian>(len_i32("trigger_count", mission.triggers.len())?)?;
        out.write_i32::<LittleEndian>(len_i32("action_count", mission.actions.len())?)?;
        for event in &mission.events {
            event.write(&mut out)?;
        }
        for trigger in &mission.triggers {
            trigger.write(&mut out)?;
        }
        for action in &mission.actions {
            action.write(&mut out)?;
        }

        out.write_i32::<LittleEndian>(len_i32("bounding_box_count", mission.bounding_boxes.len())?)?;
        for bbox in &mission.bounding_boxes {
            bbox.write(&mut out)?;
        }
        out.extend_from_slice(&mission.trailing);
        Ok(out)
    }
}
