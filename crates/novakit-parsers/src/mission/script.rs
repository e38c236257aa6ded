//! Mission script: events, their triggers and their actions
//!
//! An event owns a contiguous run of triggers and a contiguous run of
//! actions, addressed by start index and count into the file-wide arrays.
//!
//! ```text
//! event   (24)  flags:u32 trigger_index:i32 action_index:i32
//!               reset_after:i32 delay:i32     (value << 22, low bits zero)
//!               unknown:u8 trigger_count:u8 action_count:u8 unknown:u8
//! trigger (32)  condition:i32 main_type:i32 sub_type:i32 param[4]:i32 reserved:i32
//! action  (32)  reserved:i32 action_type:i32 sub_type:i32 param[4]:i32 reserved:i32
//! ```

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::flags::{describe_flags, EventFlags};
use crate::io::ByteReader;
use crate::traits::ParseResult;
use crate::validation::{InvariantCheck, Validator};

pub const EVENT_SIZE: usize = 24;
pub const TRIGGER_SIZE: usize = 32;
pub const ACTION_SIZE: usize = 32;

/// Delay and reset values live in the top 10 bits of their words
pub const TIMER_SHIFT: u32 = 22;
const TIMER_LOW_MASK: i32 = (1 << TIMER_SHIFT) - 1;
const TIMER_MAX: i64 = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionEvent {
    pub flags: EventFlags,
    pub trigger_index: i32,
    pub action_index: i32,
    /// Stored word; see `reset_after()`
    pub reset_after_raw: i32,
    /// Stored word; see `delay()`
    pub delay_raw: i32,
    pub unknown5: u8,
    pub trigger_count: u8,
    pub action_count: u8,
    pub unknown6: u8,
}

impl MissionEvent {
    pub fn reset_after(&self) -> i32 {
        self.reset_after_raw >> TIMER_SHIFT
    }

    pub fn delay(&self) -> i32 {
        self.delay_raw >> TIMER_SHIFT
    }

    pub fn set_reset_after(&mut self, value: i32) {
        self.reset_after_raw = value << TIMER_SHIFT;
    }

    pub fn set_delay(&mut self, value: i32) {
        self.delay_raw = value << TIMER_SHIFT;
    }

    pub fn trigger_range(&self) -> std::ops::Range<usize> {
        let start = self.trigger_index.max(0) as usize;
        start..start + usize::from(self.trigger_count)
    }

    pub fn action_range(&self) -> std::ops::Range<usize> {
        let start = self.action_index.max(0) as usize;
        start..start + usize::from(self.action_count)
    }

    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        reader.mark();
        let flags_offset = reader.offset();
        let flags = EventFlags::from_bits_retain(reader.read_u32("event_flags")?);
        let trigger_index = reader.read_i32("trigger_index")?;
        let action_index = reader.read_i32("action_index")?;

        let timer_offset = reader.offset();
        let reset_after_raw = reader.read_i32("reset_after")?;
        let delay_raw = reader.read_i32("delay")?;
        validator.check(timer_offset, InvariantCheck::zero("reset_after", reset_after_raw & TIMER_LOW_MASK))?;
        validator.check(
            timer_offset,
            InvariantCheck::in_range("reset_after", reset_after_raw >> TIMER_SHIFT, 0, TIMER_MAX),
        )?;
        validator.check(timer_offset + 4, InvariantCheck::zero("delay", delay_raw & TIMER_LOW_MASK))?;
        validator.check(
            timer_offset + 4,
            InvariantCheck::in_range("delay", delay_raw >> TIMER_SHIFT, 0, TIMER_MAX),
        )?;

        let tail_offset = reader.offset();
        let unknown5 = reader.read_u8("event_unknown5")?;
        let trigger_count = reader.read_u8("trigger_count")?;
        let action_count = reader.read_u8("action_count")?;
        let unknown6 = reader.read_u8("event_unknown6")?;
        validator.check(tail_offset, InvariantCheck::zero("event_unknown5", unknown5))?;
        validator.check(tail_offset + 3, InvariantCheck::zero("event_unknown6", unknown6))?;
        validator.check(
            flags_offset,
            InvariantCheck::known_bits("event_flags", u64::from(flags.bits()), u64::from(EventFlags::all().bits())),
        )?;

        reader.assert_consumed("event", EVENT_SIZE)?;
        Ok(Self {
            flags,
            trigger_index,
            action_index,
            reset_after_raw,
            delay_raw,
            unknown5,
            trigger_count,
            action_count,
            unknown6,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_u32::<LittleEndian>(self.flags.bits())?;
        out.write_i32::<LittleEndian>(self.trigger_index)?;
        out.write_i32::<LittleEndian>(self.action_index)?;
        out.write_i32::<LittleEndian>(self.reset_after_raw)?;
        out.write_i32::<LittleEndian>(self.delay_raw)?;
        out.write_u8(self.unknown5)?;
        out.write_u8(self.trigger_count)?;
        out.write_u8(self.action_count)?;
        out.write_u8(self.unknown6)?;
        Ok(())
    }
}

/// Trigger main type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Group,
    Single,
    Event,
    MissionVariable,
    SecondTimeThrough,
    Teammate,
    Player,
    Other(i32),
}

impl TriggerKind {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Group,
            2 => Self::Single,
            3 => Self::Event,
            4 => Self::MissionVariable,
            5 => Self::SecondTimeThrough,
            6 => Self::Teammate,
            7 => Self::Player,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Group => 1,
            Self::Single => 2,
            Self::Event => 3,
            Self::MissionVariable => 4,
            Self::SecondTimeThrough => 5,
            Self::Teammate => 6,
            Self::Player => 7,
            Self::Other(raw) => raw,
        }
    }
}

/// How a trigger combines with the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOperator {
    And,
    Or,
    Xor,
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        })
    }
}

const CONDITION_NEGATE: i32 = 0x1;
const CONDITION_OR: i32 = 0x2;
const CONDITION_XOR: i32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionTrigger {
    pub condition: i32,
    pub kind: TriggerKind,
    pub sub_type: i32,
    pub params: [i32; 4],
    pub reserved: i32,
}

/// Group and single triggers share sub types 1..=17 with a different subject
fn unit_condition(subject: &str, sub_type: i32, negated: bool, p: [i32; 4]) -> Option<String> {
    let [a, b, c, _] = p;
    let pick = |yes: String, no: String| if negated { no } else { yes };
    let text = match sub_type {
        0 => format!("{subject}-NULL"),
        1 => pick(format!("{subject} {a} sees Group {b}"), format!("{subject} {a} does not see Group {b}")),
        2 => pick(
            format!("{subject} {a} has targeted Group {b}"),
            format!("{subject} {a} has not targeted Group {b}"),
        ),
        3 => pick(format!("{subject} {a} at red alert"), format!("{subject} {a} not at red alert")),
        4 if subject == "SSN" => pick(format!("SSN {a} is dead"), format!("SSN {a} is not dead")),
        4 => pick(
            format!("{subject} {a} has been destroyed"),
            format!("{subject} {a} has not been destroyed"),
        ),
        5 => pick(format!("{subject} {a} alive"), format!("{subject} {a} not alive")),
        6 => pick(
            format!("{subject} {a} has lost {b} or more units"),
            format!("{subject} {a} has not lost {b} or more units"),
        ),
        7 => pick(
            format!("{subject} {a} reaches waypoint {b}, {c}"),
            format!("{subject} {a} has not reached waypoint {b}, {c}"),
        ),
        9 => pick(format!("{subject} {a} intact"), format!("{subject} {a} not intact")),
        10 => pick(
            format!("{subject} {a} is within area {b}"),
            format!("{subject} {a} is not within area {b}"),
        ),
        11 => pick(format!("{subject} {a} holding Group {b}"), format!("{subject} {a} not holding Group {b}")),
        12 => pick(
            format!("{subject} {a} has more than {b} units"),
            format!("{subject} {a} has less than {b} units"),
        ),
        13 => pick(format!("{subject} {a} has shot Group {b}"), format!("{subject} {a} has not shot Group {b}")),
        14 => pick(format!("{subject} {a} at yellow alert"), format!("{subject} {a} not at yellow alert")),
        15 => pick(
            format!("{subject} {a} has targeted SSN {b}"),
            format!("{subject} {a} has not targeted SSN {b}"),
        ),
        16 => pick(format!("{subject} {a} sees SSN {b}"), format!("{subject} {a} does not see SSN {b}")),
        17 => pick(format!("{subject} {a} has shot SSN {b}"), format!("{subject} {a} has not shot SSN {b}")),
        _ => return None,
    };
    Some(text)
}

fn single_only_condition(sub_type: i32, negated: bool, p: [i32; 4]) -> Option<String> {
    let [a, b, c, _] = p;
    let text = match (sub_type, negated) {
        (42, false) => format!("SSN {a} on top of SSN {b}"),
        (42, true) => format!("SSN {a} not on top of SSN {b}"),
        (43, false) => format!("SSN {a} is within {c}m from SSN {b}"),
        (43, true) => format!("SSN {a} is farther than {c}m from SSN {b}"),
        (44, false) => format!("SSN {a} has LOS to SSN {b} and is within {c}m"),
        (44, true) => format!("SSN {a} has no LOS to SSN {b} or is farther than {c}m"),
        (45, false) => format!("SSN {a} sees SSN {b} and is within {c}m"),
        (45, true) => format!("SSN {a} doesn't see SSN {b} or is farther than {c}m"),
        _ => return None,
    };
    Some(text)
}

fn mission_variable_condition(sub_type: i32, negated: bool, p: [i32; 4]) -> Option<String> {
    let [var, value, _, _] = p;
    let relation = match (sub_type, negated) {
        (1, false) => "is equal to",
        (1, true) => "is not equal to",
        (2, false) | (5, true) => "is less than",
        (2, true) | (5, false) => "is greater than or equal to",
        (3, false) | (4, true) => "is less than or equal to",
        (3, true) | (4, false) => "is greater than",
        _ => return None,
    };
    Some(format!("Mission Var#{var} {relation} {value}"))
}

fn player_condition(sub_type: i32, negated: bool, p: [i32; 4]) -> Option<String> {
    let a = p[0];
    let not = if negated { " not" } else { "" };
    let text = match sub_type {
        18 => format!("Player{not} berserk"),
        19 => format!("Player{not} in first person"),
        20 => format!("Player{not} in third person"),
        21 => format!("Player{not} in cockpit view"),
        34 => format!("Player dialog {a}{not} done"),
        35 => format!("Player dialog {a}{not} finished"),
        36 if negated => format!("Player has not been outside of mission area for {a} seconds"),
        36 => format!("Player has been outside of mission area for {a} seconds"),
        37 => format!("Player{not} using satchel {a}"),
        38 => format!("Player{not} attached to SSN {a}"),
        39 => format!("Player{not} on SSN {a}"),
        40 => format!("Player{not} driving SSN {a}"),
        41 => format!("Player{not} on gun (SSN {a})"),
        _ => return None,
    };
    Some(text)
}

impl MissionTrigger {
    pub fn is_negated(&self) -> bool {
        self.condition & CONDITION_NEGATE != 0
    }

    pub fn operator(&self) -> LogicOperator {
        if self.condition & CONDITION_OR != 0 {
            LogicOperator::Or
        } else if self.condition & CONDITION_XOR != 0 {
            LogicOperator::Xor
        } else {
            LogicOperator::And
        }
    }

    fn generic(&self, label: &str) -> String {
        let [a, b, c, d] = self.params;
        format!("{label} subtype {} params({a},{b},{c},{d})", self.sub_type)
    }

    /// Readable condition text
    pub fn describe(&self) -> String {
        let negated = self.is_negated();
        let params = self.params;
        match self.kind {
            TriggerKind::Group => unit_condition("Group", self.sub_type, negated, params)
                .unwrap_or_else(|| self.generic("Group trigger")),
            TriggerKind::Single => unit_condition("SSN", self.sub_type, negated, params)
                .or_else(|| single_only_condition(self.sub_type, negated, params))
                .unwrap_or_else(|| self.generic("Single trigger")),
            TriggerKind::Event if negated => format!("Event {} has not been triggered", params[0]),
            TriggerKind::Event => format!("Event {} has been triggered", params[0]),
            TriggerKind::MissionVariable => mission_variable_condition(self.sub_type, negated, params)
                .unwrap_or_else(|| self.generic("Mission Variable trigger")),
            TriggerKind::SecondTimeThrough if negated => "Not second time through".to_string(),
            TriggerKind::SecondTimeThrough => "Second time through".to_string(),
            TriggerKind::Teammate => self.generic("Teammate trigger"),
            TriggerKind::Player => {
                player_condition(self.sub_type, negated, params).unwrap_or_else(|| self.generic("Player trigger"))
            }
            TriggerKind::Other(raw) => {
                let [a, b, c, d] = params;
                format!("Type {raw} SubType {} params({a},{b},{c},{d})", self.sub_type)
            }
        }
    }

    pub fn raw_hex(&self) -> String {
        let [a, b, c, d] = self.params;
        format!(
            "{:08X} {:08X} {:08X} {a:08X} {b:08X} {c:08X} {d:08X} {:08X}",
            self.condition,
            self.kind.raw(),
            self.sub_type,
            self.reserved
        )
    }

    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        reader.mark();
        let condition = reader.read_i32("condition")?;
        let kind = TriggerKind::from_raw(reader.read_i32("trigger_type")?);
        let sub_type = reader.read_i32("trigger_sub_type")?;
        let mut params = [0; 4];
        for param in params.iter_mut() {
            *param = reader.read_i32("trigger_param")?;
        }
        let offset = reader.offset();
        let reserved = reader.read_i32("trigger_reserved")?;
        validator.check(offset, InvariantCheck::zero("trigger_reserved", reserved))?;
        reader.assert_consumed("trigger", TRIGGER_SIZE)?;
        Ok(Self {
            condition,
            kind,
            sub_type,
            params,
            reserved,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(self.condition)?;
        out.write_i32::<LittleEndian>(self.kind.raw())?;
        out.write_i32::<LittleEndian>(self.sub_type)?;
        for &param in &self.params {
            out.write_i32::<LittleEndian>(param)?;
        }
        out.write_i32::<LittleEndian>(self.reserved)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionAction {
    pub reserved0: i32,
    pub action_type: i32,
    pub sub_type: i32,
    pub params: [i32; 4],
    pub reserved1: i32,
}

impl MissionAction {
    /// Readable action text
    ///
    /// Action type numbers are not catalogued, so this names the raw codes.
    pub fn describe(&self) -> String {
        if self.action_type == 0 {
            return "No action".to_string();
        }
        let [a, b, c, d] = self.params;
        format!(
            "Action type {} SubType {} params({a},{b},{c},{d})",
            self.action_type, self.sub_type
        )
    }

    pub fn raw_hex(&self) -> String {
        let [a, b, c, d] = self.params;
        format!(
            "{:08X} {:08X} {:08X} {a:08X} {b:08X} {c:08X} {d:08X} {:08X}",
            self.reserved0, self.action_type, self.sub_type, self.reserved1
        )
    }

    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        reader.mark();
        let offset = reader.offset();
        let reserved0 = reader.read_i32("action_reserved0")?;
        validator.check(offset, InvariantCheck::zero("action_reserved0", reserved0))?;
        let action_type = reader.read_i32("action_type")?;
        let sub_type = reader.read_i32("action_sub_type")?;
        let mut params = [0; 4];
        for param in params.iter_mut() {
            *param = reader.read_i32("action_param")?;
        }
        let offset = reader.offset();
        let reserved1 = reader.read_i32("action_reserved1")?;
        validator.check(offset, InvariantCheck::zero("action_reserved1", reserved1))?;
        reader.assert_consumed("action", ACTION_SIZE)?;
        Ok(Self {
            reserved0,
            action_type,
            sub_type,
            params,
            reserved1,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(self.reserved0)?;
        out.write_i32::<LittleEndian>(self.action_type)?;
        out.write_i32::<LittleEndian>(self.sub_type)?;
        for &param in &self.params {
            out.write_i32::<LittleEndian>(param)?;
        }
        out.write_i32::<LittleEndian>(self.reserved1)?;
        Ok(())
    }
}

/// Render one event with its triggers and actions as an indented listing
///
/// Triggers or actions outside the given slices are shown as missing
/// rather than failing the whole listing.
pub fn describe_event(
    index: usize,
    event: &MissionEvent,
    triggers: &[MissionTrigger],
    actions: &[MissionAction],
    raw: bool,
) -> String {
    let mut out = format!(
        "Event {index}: Delay={}, ResetAfter={}, Flags={}\n",
        event.delay(),
        event.reset_after(),
        describe_flags(&event.flags)
    );

    if event.trigger_count > 0 {
        out.push_str("  Triggers:\n");
        for (n, slot) in event.trigger_range().enumerate() {
            let line = match triggers.get(slot) {
                Some(trigger) if n > 0 => format!("    {} {}", trigger.operator(), trigger.describe()),
                Some(trigger) => format!("    {}", trigger.describe()),
                None => format!("    <missing trigger {slot}>"),
            };
            out.push_str(&line);
            out.push('\n');
        }
    }

    if event.action_count > 0 {
        out.push_str("  Actions:\n");
        for slot in event.action_range() {
            match actions.get(slot) {
                Some(action) => {
                    out.push_str(&format!("    {}\n", action.describe()));
                    if raw {
                        out.push_str(&format!("        Raw: {}\n", action.raw_hex()));
                    }
                }
                None => out.push_str(&format!("    <missing action {slot}>\n")),
            }
        }
    }
    out
}
