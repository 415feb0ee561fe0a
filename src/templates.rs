// MIT License - Copyright (c) 2026 Peter Wright

//! The static message catalog.
//!
//! One [`MessageTemplate`] per wire operation. Offsets are relative to the
//! message-id byte; the header byte is accounted for by the engine. Ids
//! fixed by the protocol: batch `EE E0 EE EE`, status queries/responses
//! 0x31 with the entity type byte, change bitmaps 0x30, log entries 0x0D,
//! login status 0x00. The remaining command ids follow one scheme:
//! handshake 0x00–0x07, event log 0x0B–0x0E, queries 0x30–0x35, control
//! 0x40–0x5B.

use crate::message::{Field, FieldEntry, FieldType, MessageTemplate};

macro_rules! field {
    ($name:literal, [$(($byte:literal, $mask:literal)),+]) => {
        Field {
            name: $name,
            entries: &[$(FieldEntry { byte: $byte, mask: $mask }),+],
            length: None,
            ftype: None,
        }
    };
    ($name:literal, [$(($byte:literal, $mask:literal)),+], len $len:literal) => {
        Field {
            name: $name,
            entries: &[$(FieldEntry { byte: $byte, mask: $mask }),+],
            length: Some($len),
            ftype: None,
        }
    };
    ($name:literal, [$(($byte:literal, $mask:literal)),+], $ty:ident) => {
        Field {
            name: $name,
            entries: &[$(FieldEntry { byte: $byte, mask: $mask }),+],
            length: None,
            ftype: Some(FieldType::$ty),
        }
    };
    ($name:literal, [$(($byte:literal, $mask:literal)),+], $ty:ident, len $len:literal) => {
        Field {
            name: $name,
            entries: &[$(FieldEntry { byte: $byte, mask: $mask }),+],
            length: Some($len),
            ftype: Some(FieldType::$ty),
        }
    };
}

/// Entity type bytes shared by status queries, name pages, change bitmaps
/// and COS notifications.
pub const TYPE_ZONE: u8 = 0x01;
pub const TYPE_AREA: u8 = 0x02;
pub const TYPE_OUTPUT: u8 = 0x07;
pub const TYPE_FILTER: u8 = 0x08;
pub const TYPE_DOOR: u8 = 0x0B;
pub const TYPE_TRIGGER: u8 = 0x14;

/// Offset of the entity id within any status response body.
pub const OBJECT_ID_OFFSET: usize = 3;

// ---------------------------------------------------------------------------
// Session handshake
// ---------------------------------------------------------------------------

pub static DEVICE_INFO: MessageTemplate = MessageTemplate {
    name: "getDeviceInfo",
    msg_id: &[0x01],
    template: &[],
    fields: &[],
    response_len: None,
};

/// Device-info reply: encryption mode, firmware string, product name and
/// the base64 serial at fixed offsets.
pub static DEVICE_INFO_RESPONSE: MessageTemplate = MessageTemplate {
    name: "deviceInfo",
    msg_id: &[0x01],
    template: &[],
    fields: &[
        field!("encryptionMode", [(1, 0xFF)], Byte),
        field!("firmware", [(2, 0xFF)], len 20),
        field!("product", [(22, 0xFF)], len 32),
        field!("serial", [(54, 0xFF)], len 16),
    ],
    response_len: None,
};

/// Session-key exchange: 8 client bytes (zero by design) and 8 pad bytes.
pub static CREATE_SESSION: MessageTemplate = MessageTemplate {
    name: "createSession",
    msg_id: &[0x02],
    template: &[0; 17],
    fields: &[field!("clientKey", [(2, 0xFF)], len 8)],
    response_len: None,
};

pub static CREATE_SESSION_RESPONSE: MessageTemplate = MessageTemplate {
    name: "sessionKey",
    msg_id: &[0x02],
    template: &[],
    fields: &[field!("panelKey", [(3, 0xFF)], len 8)],
    response_len: None,
};

pub static ENABLE_ENCRYPTION: MessageTemplate = MessageTemplate {
    name: "enableEncryptionKey",
    msg_id: &[0x03],
    template: &[0x01],
    fields: &[],
    response_len: None,
};

/// PIN login: permission flags, ten PIN bytes, connection-method marker.
/// The template default already carries the marker (0x03, mobile app).
pub static LOGIN_PIN: MessageTemplate = MessageTemplate {
    name: "login",
    msg_id: &[0x00],
    template: &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03],
    fields: &[
        field!("permissions", [(1, 0xFF)], Byte),
        field!("pin", [(2, 0xFF)], len 10),
    ],
    response_len: None,
};

/// Account login for the extended family: flags, 32-byte username,
/// 32-byte password, connection-method marker.
pub static LOGIN_ACCOUNT: MessageTemplate = MessageTemplate {
    name: "loginAccount",
    msg_id: &[0x04],
    template: &[
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03,
    ],
    fields: &[
        field!("permissions", [(1, 0xFF)], Byte),
        field!("username", [(2, 0xFF)], len 32),
        field!("password", [(34, 0xFF)], len 32),
    ],
    response_len: None,
};

/// Login status reply (`A0 00 00` on success).
pub static LOGIN_RESPONSE: MessageTemplate = MessageTemplate {
    name: "loginStatus",
    msg_id: &[0x00],
    template: &[],
    fields: &[field!("status", [(1, 0xFF)], Byte)],
    response_len: None,
};

pub static GET_USER_INFO: MessageTemplate = MessageTemplate {
    name: "getUserInfo",
    msg_id: &[0x05],
    template: &[0x00],
    fields: &[],
    response_len: None,
};

pub static USER_INFO_RESPONSE: MessageTemplate = MessageTemplate {
    name: "userInfo",
    msg_id: &[0x05],
    template: &[],
    fields: &[field!("userName", [(2, 0xFF)], Str, len 32)],
    response_len: None,
};

pub static PING: MessageTemplate = MessageTemplate {
    name: "ping",
    msg_id: &[0x06],
    template: &[],
    fields: &[],
    response_len: None,
};

pub static LOGOUT: MessageTemplate = MessageTemplate {
    name: "logout",
    msg_id: &[0x07],
    template: &[],
    fields: &[],
    response_len: None,
};

// ---------------------------------------------------------------------------
// Status, names, change bitmaps
// ---------------------------------------------------------------------------

/// Change-bitmap query after a COS notification. The reply is
/// `A0 30 <type> <bitmap…>`.
pub static GET_CHANGES: MessageTemplate = MessageTemplate {
    name: "getChanges",
    msg_id: &[0x30],
    template: &[0x00],
    fields: &[field!("kind", [(1, 0xFF)], Byte)],
    response_len: None,
};

/// Single-entity status query; six bytes with the header stripped, which
/// is also the embedded size inside a batch request.
pub static GET_STATUS: MessageTemplate = MessageTemplate {
    name: "getStatus",
    msg_id: &[0x31],
    template: &[0x00, 0x00, 0x00, 0x00, 0x00],
    fields: &[
        field!("kind", [(1, 0xFF)], Byte),
        field!("objectId", [(3, 0xFF)], Byte),
    ],
    response_len: None,
};

pub static AREA_STATUS: MessageTemplate = MessageTemplate {
    name: "areaStatus",
    msg_id: &[0x31],
    template: &[TYPE_AREA, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("armed", [(4, 0x01)]),
        field!("part1Set", [(4, 0x02)]),
        field!("part2Set", [(4, 0x04)]),
        field!("exitDelay", [(4, 0x08)]),
        field!("entryDelay", [(4, 0x10)]),
        field!("ready", [(4, 0x20)]),
        field!("forced", [(4, 0x40)]),
        field!("alarm", [(5, 0x01)]),
        field!("fireAlarm", [(5, 0x02)]),
        field!("panicAlarm", [(5, 0x04)]),
        field!("tamper", [(5, 0x08)]),
        field!("alarmMemory", [(5, 0x10)]),
        field!("fault", [(6, 0x01)]),
        field!("mainsFault", [(6, 0x02)]),
        field!("batteryFault", [(6, 0x04)]),
        field!("zoneInhibited", [(6, 0x08)]),
        field!("zoneActive", [(6, 0x10)]),
    ],
    response_len: Some(17),
};

pub static ZONE_STATUS: MessageTemplate = MessageTemplate {
    name: "zoneStatus",
    msg_id: &[0x31],
    template: &[TYPE_ZONE, 0, 0, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("active", [(4, 0x01)]),
        field!("inhibited", [(4, 0x02)]),
        field!("tamper", [(4, 0x04)]),
        field!("fault", [(4, 0x08)]),
        field!("masked", [(4, 0x10)]),
        field!("alarm", [(4, 0x20)]),
        field!("lowBattery", [(5, 0x01)]),
        field!("supervisionFault", [(5, 0x02)]),
        field!("onSoakTest", [(5, 0x04)]),
        field!("auxiliaryFault", [(6, 0x01)]),
    ],
    response_len: Some(7),
};

pub static OUTPUT_STATUS: MessageTemplate = MessageTemplate {
    name: "outputStatus",
    msg_id: &[0x31],
    template: &[TYPE_OUTPUT, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("active", [(4, 0x01)]),
        field!("fault", [(4, 0x02)]),
    ],
    response_len: Some(5),
};

pub static TRIGGER_STATUS: MessageTemplate = MessageTemplate {
    name: "triggerStatus",
    msg_id: &[0x31],
    template: &[TYPE_TRIGGER, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("active", [(4, 0x01)]),
    ],
    response_len: Some(5),
};

pub static DOOR_STATUS: MessageTemplate = MessageTemplate {
    name: "doorStatus",
    msg_id: &[0x31],
    template: &[TYPE_DOOR, 0, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("unlocked", [(4, 0x01)]),
        field!("unlockedPeriod", [(4, 0x02)]),
        field!("timeUnlocked", [(4, 0x04)]),
        field!("standardTimeUnlocked", [(4, 0x08)]),
        field!("open", [(4, 0x10)]),
        field!("forced", [(4, 0x20)]),
        field!("disabled", [(5, 0x01)]),
        field!("tamper", [(5, 0x02)]),
    ],
    response_len: Some(6),
};

pub static FILTER_STATUS: MessageTemplate = MessageTemplate {
    name: "filterStatus",
    msg_id: &[0x31],
    template: &[TYPE_FILTER, 0, 0, 0],
    fields: &[
        field!("objectId", [(3, 0xFF)], Byte),
        field!("active", [(4, 0x01)]),
    ],
    response_len: Some(5),
};

/// Name-page request. Standard panels answer 16 names of 16 bytes per
/// page; the extended format (set through `extendedFormat`) answers 4
/// names of 30 bytes.
pub static GET_NAMES: MessageTemplate = MessageTemplate {
    name: "getNames",
    msg_id: &[0x32],
    template: &[0x00, 0x00, 0x00, 0x10, 0x00],
    fields: &[
        field!("kind", [(1, 0xFF)], Byte),
        field!("startIndex", [(2, 0xFF), (3, 0xFF)]),
        field!("count", [(4, 0xFF)], Byte),
        field!("extendedFormat", [(5, 0x01)]),
    ],
    response_len: None,
};

pub static NAME_PAGE: MessageTemplate = MessageTemplate {
    name: "namePage",
    msg_id: &[0x32],
    template: &[],
    fields: &[
        field!("kind", [(1, 0xFF)], Byte),
        field!("count", [(2, 0xFF)], Byte),
    ],
    response_len: None,
};

pub static GET_VALID_AREAS: MessageTemplate = MessageTemplate {
    name: "getValidAreas",
    msg_id: &[0x35],
    template: &[0x00],
    fields: &[],
    response_len: None,
};

/// Reply: an area bitset from body offset 1 on.
pub static VALID_AREAS: MessageTemplate = MessageTemplate {
    name: "validAreas",
    msg_id: &[0x35],
    template: &[],
    fields: &[],
    response_len: None,
};

/// Zones-assigned-to-area query; twelve bytes embedded in a batch.
pub static GET_ZONES_ASSIGNED: MessageTemplate = MessageTemplate {
    name: "getZonesAssignedToAreas",
    msg_id: &[0x34],
    template: &[0; 11],
    fields: &[field!("area", [(2, 0xFF)], Byte)],
    response_len: None,
};

/// Reply: area id then a 30-byte zone bitset (240 zones).
pub static ZONES_ASSIGNED: MessageTemplate = MessageTemplate {
    name: "zonesAssignedToAreas",
    msg_id: &[0x34],
    template: &[],
    fields: &[field!("area", [(1, 0xFF)], Byte)],
    response_len: Some(32),
};

// ---------------------------------------------------------------------------
// Control sessions
// ---------------------------------------------------------------------------

pub static CREATE_ARM_SESSION: MessageTemplate = MessageTemplate {
    name: "createArmSession",
    msg_id: &[0x40],
    template: &[0; 5],
    fields: &[field!("areas", [(1, 0xFF)], len 4)],
    response_len: None,
};

pub static CREATE_DISARM_SESSION: MessageTemplate = MessageTemplate {
    name: "createDisarmSession",
    msg_id: &[0x41],
    template: &[0; 5],
    fields: &[field!("areas", [(1, 0xFF)], len 4)],
    response_len: None,
};

pub static CREATE_CONTROL_SESSION: MessageTemplate = MessageTemplate {
    name: "createControlSession",
    msg_id: &[0x42],
    template: &[0; 5],
    fields: &[field!("areas", [(1, 0xFF)], len 4)],
    response_len: None,
};

pub static DESTROY_CONTROL_SESSION: MessageTemplate = MessageTemplate {
    name: "destroyControlSession",
    msg_id: &[0x43],
    template: &[0; 2],
    fields: &[field!("session", [(1, 0xFF), (2, 0xFF)])],
    response_len: None,
};

pub static ARM_AREAS: MessageTemplate = MessageTemplate {
    name: "armAreas",
    msg_id: &[0x44],
    template: &[0; 7],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("setType", [(3, 0xFF)], Byte),
        field!("areas", [(4, 0xFF)], len 4),
    ],
    response_len: None,
};

pub static DISARM_AREAS: MessageTemplate = MessageTemplate {
    name: "disarmAreas",
    msg_id: &[0x45],
    template: &[0; 6],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("areas", [(3, 0xFF)], len 4),
    ],
    response_len: None,
};

pub static SESSION_STATUS: MessageTemplate = MessageTemplate {
    name: "controlSessionStatus",
    msg_id: &[0x46],
    template: &[0; 2],
    fields: &[field!("session", [(1, 0xFF), (2, 0xFF)])],
    response_len: None,
};

/// Status reply: the 16-bit state id is big-endian on the wire, hence the
/// reversed entry order.
pub static SESSION_STATUS_RESPONSE: MessageTemplate = MessageTemplate {
    name: "controlSessionState",
    msg_id: &[0x46],
    template: &[],
    fields: &[field!("stateId", [(2, 0xFF), (1, 0xFF)])],
    response_len: None,
};

pub static SET_AREA_FORCED: MessageTemplate = MessageTemplate {
    name: "setAreaForced",
    msg_id: &[0x47],
    template: &[0; 3],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("setType", [(3, 0xFF)], Byte),
    ],
    response_len: None,
};

pub static GET_FAULT_ZONES: MessageTemplate = MessageTemplate {
    name: "getFaultZones",
    msg_id: &[0x48],
    template: &[0; 3],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("next", [(3, 0xFF)], Byte),
    ],
    response_len: None,
};

pub static GET_ACTIVE_ZONES: MessageTemplate = MessageTemplate {
    name: "getActiveZones",
    msg_id: &[0x49],
    template: &[0; 3],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("next", [(3, 0xFF)], Byte),
    ],
    response_len: None,
};

pub static GET_INHIBITED_ZONES: MessageTemplate = MessageTemplate {
    name: "getInhibitedZones",
    msg_id: &[0x4A],
    template: &[0; 3],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("next", [(3, 0xFF)], Byte),
    ],
    response_len: None,
};

macro_rules! control_verb {
    ($static_name:ident, $name:literal, $id:literal) => {
        pub static $static_name: MessageTemplate = MessageTemplate {
            name: $name,
            msg_id: &[$id],
            template: &[0; 4],
            fields: &[
                field!("session", [(1, 0xFF), (2, 0xFF)]),
                field!("objectId", [(3, 0xFF), (4, 0xFF)]),
            ],
            response_len: None,
        };
    };
}

control_verb!(INHIBIT_ZONE, "inhibitZone", 0x50);
control_verb!(UNINHIBIT_ZONE, "uninhibitZone", 0x51);
control_verb!(ACTIVATE_OUTPUT, "activateOutput", 0x52);
control_verb!(DEACTIVATE_OUTPUT, "deactivateOutput", 0x53);
control_verb!(ACTIVATE_TRIGGER, "activateTrigger", 0x54);
control_verb!(DEACTIVATE_TRIGGER, "deactivateTrigger", 0x55);
control_verb!(LOCK_DOOR, "lockDoor", 0x56);
control_verb!(UNLOCK_DOOR, "unlockDoor", 0x57);
control_verb!(UNLOCK_DOOR_STANDARD, "unlockDoorStandard", 0x58);
control_verb!(DISABLE_DOOR, "disableDoor", 0x5A);
control_verb!(ENABLE_DOOR, "enableDoor", 0x5B);

pub static UNLOCK_DOOR_TIME: MessageTemplate = MessageTemplate {
    name: "unlockDoorTime",
    msg_id: &[0x59],
    template: &[0; 6],
    fields: &[
        field!("session", [(1, 0xFF), (2, 0xFF)]),
        field!("objectId", [(3, 0xFF), (4, 0xFF)]),
        field!("seconds", [(5, 0xFF), (6, 0xFF)]),
    ],
    response_len: None,
};

// ---------------------------------------------------------------------------
// Generic responses, batch, event log
// ---------------------------------------------------------------------------

/// Any short reply carrying a 16-bit value after the echoed command id
/// (control-session handles among them).
pub static SHORT_RESPONSE: MessageTemplate = MessageTemplate {
    name: "shortResponse",
    msg_id: &[],
    template: &[],
    fields: &[field!("value", [(1, 0xFF), (2, 0xFF)])],
    response_len: None,
};

/// Any reply carrying a single success/failure byte.
pub static BOOLEAN_RESPONSE: MessageTemplate = MessageTemplate {
    name: "booleanResponse",
    msg_id: &[],
    template: &[],
    fields: &[field!("value", [(1, 0xFF)], Bool)],
    response_len: None,
};

pub static BATCH: MessageTemplate = MessageTemplate {
    name: "batch",
    msg_id: &[0xEE, 0xE0, 0xEE, 0xEE],
    template: &[],
    fields: &[],
    response_len: None,
};

pub static OPEN_LOG: MessageTemplate = MessageTemplate {
    name: "openLog",
    msg_id: &[0x0B],
    template: &[0x00],
    fields: &[],
    response_len: None,
};

pub static SELECT_LOG_ENTRY: MessageTemplate = MessageTemplate {
    name: "selectLogEntry",
    msg_id: &[0x0C],
    template: &[0x00],
    fields: &[field!("direction", [(1, 0xFF)], Byte)],
    response_len: None,
};

/// A log record: five header bytes, BCD timestamp, then the fixed id
/// fields and seven opaque detail bytes. The trailing description is 32
/// bytes in 60-byte records and 42 in 70-byte records; the reader slices
/// it by record size.
pub static LOG_ENTRY: MessageTemplate = MessageTemplate {
    name: "logEntry",
    msg_id: &[0x0D],
    template: &[],
    fields: &[
        field!("timestamp", [(6, 0xFF)], len 6),
        field!("sequence", [(12, 0xFF)], Byte),
        field!("logType", [(13, 0xFF)], Byte),
        field!("eventId", [(14, 0xFF), (15, 0xFF)]),
        field!("classId", [(16, 0xFF)], Byte),
        field!("subId", [(17, 0xFF)], Byte),
        field!("entityId", [(18, 0xFF), (19, 0xFF)]),
        field!("area", [(20, 0xFF)], Byte),
        field!("details", [(21, 0xFF)], len 7),
    ],
    response_len: None,
};

pub static START_MONITOR: MessageTemplate = MessageTemplate {
    name: "startMonitor",
    msg_id: &[0x0E],
    template: &[0x01],
    fields: &[],
    response_len: None,
};

/// Offset of the description string within a log-entry body.
pub const LOG_DESCRIPTION_OFFSET: usize = 28;

/// The status-response templates a batch reply can embed.
static STATUS_RESPONSES: &[&MessageTemplate] = &[
    &AREA_STATUS,
    &ZONE_STATUS,
    &OUTPUT_STATUS,
    &TRIGGER_STATUS,
    &DOOR_STATUS,
    &FILTER_STATUS,
    &ZONES_ASSIGNED,
];

/// Identify which embeddable response type starts at `offset`.
pub fn identify_embedded(buf: &[u8], offset: usize) -> Option<&'static MessageTemplate> {
    STATUS_RESPONSES
        .iter()
        .copied()
        .find(|t| t.matches_at(buf, offset))
}

/// Build the 4-byte area bitmap used by control-session requests.
/// Area 1 is byte 0 bit 0.
pub fn area_bitmap(areas: &[u16]) -> [u8; 4] {
    let mut out = [0u8; 4];
    for &area in areas {
        if area >= 1 {
            let idx = (area - 1) as usize;
            if idx / 8 < out.len() {
                out[idx / 8] |= 1 << (idx % 8);
            }
        }
    }
    out
}

/// Decode a bitset into entity numbers, starting at 1.
pub fn decode_bitset(bytes: &[u8]) -> Vec<u16> {
    let mut out = Vec::new();
    for (byte_idx, &byte) in bytes.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                out.push((byte_idx * 8 + bit) as u16 + 1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Property, Value};

    #[test]
    fn test_status_request_is_six_bytes_embedded() {
        let frame = GET_STATUS.construct(&[
            ("kind", Value::Int(TYPE_ZONE as u64)),
            ("objectId", Value::Int(5)),
        ]);
        // Header byte plus six embedded bytes
        assert_eq!(frame.len(), 7);
        assert_eq!(&frame[1..], &[0x31, 0x01, 0x00, 0x05, 0x00, 0x00]);
    }

    #[test]
    fn test_zones_assigned_request_is_twelve_bytes_embedded() {
        let frame = GET_ZONES_ASSIGNED.construct(&[("area", Value::Int(2))]);
        assert_eq!(frame.len(), 13);
        assert_eq!(frame[1], 0x34);
        assert_eq!(frame[3], 0x02);
    }

    #[test]
    fn test_batch_message_id() {
        let frame = BATCH.construct(&[]);
        assert_eq!(frame, vec![0xC0, 0xEE, 0xE0, 0xEE, 0xEE]);
    }

    #[test]
    fn test_login_defaults_carry_connection_method() {
        let frame = LOGIN_PIN.construct(&[("pin", Value::Str("1234"))]);
        // Body: id, permissions, 10 pin bytes, connection method
        assert_eq!(frame.len(), 14);
        assert_eq!(*frame.last().unwrap(), 0x03);
        assert_eq!(&frame[3..7], b"1234");
        assert_eq!(&frame[7..13], &[0u8; 6]);
    }

    #[test]
    fn test_account_login_layout() {
        let frame = LOGIN_ACCOUNT.construct(&[
            ("permissions", Value::Int(0x95)),
            ("username", Value::Str("installer")),
            ("password", Value::Str("secret")),
        ]);
        assert_eq!(frame.len(), 1 + 67);
        assert_eq!(frame[2], 0x95);
        assert_eq!(&frame[3..12], b"installer");
        assert_eq!(&frame[35..41], b"secret");
        assert_eq!(*frame.last().unwrap(), 0x03);
    }

    #[test]
    fn test_create_session_body_is_eighteen_bytes() {
        let frame = CREATE_SESSION.construct(&[("clientKey", Value::Bytes(&[0u8; 8]))]);
        assert_eq!(frame.len(), 1 + 18);
    }

    #[test]
    fn test_session_state_big_endian() {
        // A0-stripped body: id, state hi, state lo
        assert_eq!(
            SESSION_STATUS_RESPONSE.get(&[0x46, 0x05, 0x04], "stateId"),
            Some(Property::Int(0x0504))
        );
        assert_eq!(
            SESSION_STATUS_RESPONSE.get(&[0x46, 0x10, 0x03], "stateId"),
            Some(Property::Int(0x1003))
        );
    }

    #[test]
    fn test_arm_areas_layout() {
        let frame = ARM_AREAS.construct(&[
            ("session", Value::Int(0x1234)),
            ("setType", Value::Int(0x05)),
            ("areas", Value::Bytes(&area_bitmap(&[1, 3]))),
        ]);
        assert_eq!(&frame[1..], &[0x44, 0x34, 0x12, 0x05, 0x05, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_identify_embedded() {
        let zone = [0x31u8, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00];
        let t = identify_embedded(&zone, 0).unwrap();
        assert_eq!(t.name, "zoneStatus");
        assert_eq!(t.response_len, Some(7));

        let area = [0x31u8, 0x02, 0x00, 0x01, 0x00];
        assert_eq!(identify_embedded(&area, 0).unwrap().name, "areaStatus");

        assert!(identify_embedded(&[0x32, 0x01], 0).is_none());
    }

    #[test]
    fn test_area_bitmap() {
        assert_eq!(area_bitmap(&[]), [0, 0, 0, 0]);
        assert_eq!(area_bitmap(&[1]), [0x01, 0, 0, 0]);
        assert_eq!(area_bitmap(&[1, 2, 8]), [0x83, 0, 0, 0]);
        assert_eq!(area_bitmap(&[9, 16]), [0, 0x81, 0, 0]);
        // Out-of-range areas are dropped
        assert_eq!(area_bitmap(&[33, 0]), [0, 0, 0, 0]);
    }

    #[test]
    fn test_bitset_roundtrip() {
        let bitmap = area_bitmap(&[1, 5, 12, 32]);
        assert_eq!(decode_bitset(&bitmap), vec![1, 5, 12, 32]);
    }

    #[test]
    fn test_decode_bitset_offsets() {
        // Byte 1 bit 0 is entity 9
        assert_eq!(decode_bitset(&[0x00, 0x01]), vec![9]);
        assert_eq!(decode_bitset(&[0x80, 0x00]), vec![8]);
        assert_eq!(decode_bitset(&[]), Vec::<u16>::new());
    }

    #[test]
    fn test_object_id_offset_convention() {
        // Every status response carries the entity id at offset 3
        for t in [
            &AREA_STATUS,
            &ZONE_STATUS,
            &OUTPUT_STATUS,
            &TRIGGER_STATUS,
            &DOOR_STATUS,
            &FILTER_STATUS,
        ] {
            let field = t.fields.iter().find(|f| f.name == "objectId").unwrap();
            assert_eq!(field.entries[0].byte, OBJECT_ID_OFFSET, "{}", t.name);
        }
    }
}
