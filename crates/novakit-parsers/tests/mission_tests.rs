//! Mission file tests built from hand-laid byte fixtures

use std::collections::HashMap;

use novakit_core::Vec3;
use novakit_parsers::mission::{
    EntityCategory, MissionAction, MissionEntity, MissionEvent, MissionTrigger, TriggerKind, Waypoint, WaypointFlags,
};
use novakit_parsers::{ErrorKind, MissionFile, MissionParser, ParseOptions, Parser};
use proptest::prelude::*;

const HEADER: usize = 616;
const ENTITY: usize = 172;
const TABLES: usize = 128 * 136 + 64 * 32 + 32 * 20;

/// Header with only the magic and item count set, followed by zeroed
/// entities and tables and empty trailer counts
fn two_item_fixture() -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER];
    bytes[..4].copy_from_slice(b"BMS1");
    bytes[0xA4..0xA8].copy_from_slice(&2u32.to_le_bytes());

    bytes.extend(std::iter::repeat(0u8).take(2 * ENTITY + TABLES));
    // events, triggers, actions, bounding boxes
    bytes.extend_from_slice(&[0u8; 16]);
    bytes
}

fn one_event_mission() -> MissionFile {
    let mut mission = MissionFile::default();
    mission.events.push(MissionEvent {
        trigger_count: 1,
        action_count: 1,
        ..MissionEvent::default()
    });
    mission.header.num_events = 1;
    mission.triggers.push(MissionTrigger {
        condition: 0,
        kind: TriggerKind::Event,
        sub_type: 0,
        params: [0; 4],
        reserved: 0,
    });
    mission.actions.push(MissionAction {
        action_type: 3,
        ..MissionAction::default()
    });
    mission
}

mod layout_tests {
    use super::*;

    #[test]
    fn test_minimal_two_item_mission() {
        let bytes = two_item_fixture();
        let decoded = MissionParser::new().decode(&bytes, &ParseOptions::default()).unwrap();
        let mission = decoded.value;

        assert_eq!(mission.items.len(), 2);
        assert!(mission.buildings.is_empty());
        assert!(mission.events.is_empty());
        assert!(mission.triggers.is_empty());
        assert_eq!(mission.waypoints.len(), 128);
        assert_eq!(mission.groups.len(), 64);
        assert_eq!(mission.layers.len(), 32);
        assert!(mission.items.iter().all(|e| e.category == EntityCategory::Item));
    }

    #[test]
    fn test_minimal_mission_round_trip() {
        let bytes = two_item_fixture();
        let parser = MissionParser::new();
        let mission = parser.parse(&bytes).unwrap();
        assert_eq!(parser.serialize(&mission).unwrap(), bytes);
    }

    #[test]
    fn test_truncated_tables() {
        let bytes = two_item_fixture();
        let err = MissionParser::new().parse(&bytes[..HEADER + 2 * ENTITY + 100]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
    }

    #[test]
    fn test_wrong_magic() {
        let mut bytes = two_item_fixture();
        bytes[..3].copy_from_slice(b"XMS");
        assert_eq!(MissionParser::new().parse(&bytes).unwrap_err().kind(), ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_reserved_header_bytes_are_soft() {
        let mut bytes = two_item_fixture();
        // inside the first reserved span after the attribute flags
        bytes[0x8C] = 0x55;

        let decoded = MissionParser::new().decode(&bytes, &ParseOptions::default()).unwrap();
        assert_eq!(decoded.report.for_field("unknown0").count(), 1);

        let err = MissionParser::new().decode(&bytes, &ParseOptions::strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);
    }

    #[test]
    fn test_unexpected_group_and_layer_bytes() {
        let groups = HEADER + 2 * ENTITY + 128 * 136;
        let layers = groups + 64 * 32;

        let mut bytes = two_item_fixture();
        bytes[groups + 3 * 32 + 5] = 0x55;
        bytes[layers + 7 * 20 + 19] = 0x01;

        let parser = MissionParser::new();
        let decoded = parser.decode(&bytes, &ParseOptions::default()).unwrap();
        assert_eq!(decoded.report.for_field("group").count(), 1);
        assert_eq!(decoded.report.for_field("layer").count(), 1);
        assert_eq!(decoded.value.groups[3].raw[5], 0x55);
        assert_eq!(decoded.value.layers[7].raw[19], 0x01);
        assert_eq!(parser.serialize(&decoded.value).unwrap(), bytes);

        let err = parser.decode(&bytes, &ParseOptions::strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);

        // 0x0A is a known group byte
        let mut bytes = two_item_fixture();
        bytes[groups + 1] = 0x0A;
        let decoded = parser.decode(&bytes, &ParseOptions::default()).unwrap();
        assert_eq!(decoded.report.for_field("group").count(), 0);
    }
}

mod script_tests {
    use super::*;

    /// Offset of the event/trigger/action counts in a mission with no
    /// loadout, entities or area triggers
    const COUNTS_OFFSET: usize = HEADER + TABLES;

    #[test]
    fn test_script_round_trip() {
        let parser = MissionParser::new();
        let bytes = parser.serialize(&one_event_mission()).unwrap();
        assert_eq!(&bytes[COUNTS_OFFSET..COUNTS_OFFSET + 4], &1i32.to_le_bytes());

        let back = parser.parse(&bytes).unwrap();
        assert_eq!(back, one_event_mission());
        assert!(back.script_listing(false).contains("Event 0"));
    }

    #[test]
    fn test_trigger_count_mismatch_is_fatal() {
        let parser = MissionParser::new();
        let mut bytes = parser.serialize(&one_event_mission()).unwrap();
        bytes[COUNTS_OFFSET + 4..COUNTS_OFFSET + 8].copy_from_slice(&2i32.to_le_bytes());
        // room for the extra trigger record
        bytes.extend_from_slice(&[0u8; 32]);

        let err = parser.parse(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);
        assert!(parser.decode(&bytes, &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_serialize_rejects_inconsistent_counts() {
        let mut mission = one_event_mission();
        mission.actions.push(MissionAction::default());
        let err = MissionParser::new().serialize(&mission).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);
    }
}

mod entity_tests {
    use super::*;

    #[test]
    fn test_positions_and_lookup() {
        let mut mission = MissionFile::default();
        mission
            .buildings
            .push(MissionEntity::new(EntityCategory::Building, 12, 7, Vec3::new(100.5, 2.0, -30.25)));
        mission
            .items
            .push(MissionEntity::new(EntityCategory::Item, 3, 1, Vec3::new(1.0, 0.0, 1.0)));

        let parser = MissionParser::new();
        let back = parser.parse(&parser.serialize(&mission).unwrap()).unwrap();

        let building = back.find_entity(7).unwrap();
        assert_eq!(building.world_position(), Vec3::new(100.5, 2.0, -30.25));

        let names: HashMap<i32, String> = [(12, "Guard Tower".to_string())].into_iter().collect();
        assert_eq!(building.display_name(&names), "Guard Tower");

        // file order is items before buildings
        let ids: Vec<i32> = back.entities().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 7]);
    }

    #[test]
    fn test_waypoint_markers() {
        let mut mission = MissionFile::default();
        mission.waypoints[5] = Waypoint {
            flags: WaypointFlags::BLUE_TEAM,
            markers: [4u32, 9, 11].into_iter().collect(),
            ..Waypoint::default()
        };

        let parser = MissionParser::new();
        let back = parser.parse(&parser.serialize(&mission).unwrap()).unwrap();
        let active: Vec<usize> = back.active_waypoints().map(|(i, _)| i).collect();
        assert_eq!(active, vec![5]);
        assert_eq!(back.waypoints[5].markers.as_slice(), &[4, 9, 11]);
    }
}

mod encoding_props {
    use super::*;

    /// Coordinates on a quarter-unit grid, exact in 16.16 fixed point
    fn any_position() -> impl Strategy<Value = Vec3> {
        let coord = (-20_000i32..20_000, 0i32..4).prop_map(|(whole, quarter)| whole as f32 + quarter as f32 * 0.25);
        (coord.clone(), coord.clone(), coord).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn any_entity() -> impl Strategy<Value = MissionEntity> {
        (0usize..4, any::<i32>(), any::<i32>(), any_position(), any::<i16>()).prop_map(
            |(category, type_id, id, position, yaw)| {
                let mut entity = MissionEntity::new(EntityCategory::ALL[category], type_id, id, position);
                entity.yaw = yaw;
                entity
            },
        )
    }

    fn any_trigger() -> impl Strategy<Value = MissionTrigger> {
        (any::<i32>(), 1i32..10, any::<i32>(), any::<[i32; 4]>()).prop_map(|(condition, kind, sub_type, params)| {
            MissionTrigger {
                condition,
                kind: TriggerKind::from_raw(kind),
                sub_type,
                params,
                reserved: 0,
            }
        })
    }

    fn any_action() -> impl Strategy<Value = MissionAction> {
        (any::<i32>(), any::<i32>(), any::<[i32; 4]>()).prop_map(|(action_type, sub_type, params)| MissionAction {
            action_type,
            sub_type,
            params,
            ..MissionAction::default()
        })
    }

    /// Events with the trigger and action records their counts call for
    fn any_script() -> impl Strategy<Value = (Vec<MissionEvent>, Vec<MissionTrigger>, Vec<MissionAction>)> {
        proptest::collection::vec((0u8..3, 0u8..3, 0i32..1024), 0..5).prop_flat_map(|shapes| {
            let triggers: usize = shapes.iter().map(|s| usize::from(s.0)).sum();
            let actions: usize = shapes.iter().map(|s| usize::from(s.1)).sum();

            let mut events = Vec::with_capacity(shapes.len());
            let (mut trigger_index, mut action_index) = (0, 0);
            for (trigger_count, action_count, delay) in shapes {
                let mut event = MissionEvent {
                    trigger_index,
                    action_index,
                    trigger_count,
                    action_count,
                    ..MissionEvent::default()
                };
                event.set_delay(delay);
                trigger_index += i32::from(trigger_count);
                action_index += i32::from(action_count);
                events.push(event);
            }

            (
                Just(events),
                proptest::collection::vec(any_trigger(), triggers),
                proptest::collection::vec(any_action(), actions),
            )
        })
    }

    proptest! {
        #[test]
        fn missions_survive_encoding(
            entities in proptest::collection::vec(any_entity(), 0..12),
            (events, triggers, actions) in any_script(),
        ) {
            let mut mission = MissionFile::default();
            for entity in entities {
                match entity.category {
                    EntityCategory::Item => mission.items.push(entity),
                    EntityCategory::Building => mission.buildings.push(entity),
                    EntityCategory::Marker => mission.markers.push(entity),
                    EntityCategory::Organic => mission.organics.push(entity),
                }
            }
            mission.header.num_events = events.len() as _;
            mission.events = events;
            mission.triggers = triggers;
            mission.actions = actions;

            let parser = MissionParser::new();
            let bytes = parser.serialize(&mission).unwrap();
            let decoded = parser.decode(&bytes, &ParseOptions::default()).unwrap();

            prop_assert!(decoded.report.is_clean(), "{:?}", decoded.report);
            prop_assert_eq!(&decoded.value, &mission);
            prop_assert_eq!(parser.serialize(&decoded.value).unwrap(), bytes);
        }
    }
}
