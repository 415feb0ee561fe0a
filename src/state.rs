// MIT License - Copyright (c) 2026 Peter Wright

//! Entity model: the panel descriptor built from the device-info reply,
//! the inventory of named entities, and the per-entity status cache.
//!
//! There is one state representation for every entity kind: the raw
//! status bytes plus a flag map decoded through the kind's status
//! template. Derived predicates (such as a door being locked) are pure
//! functions over the flag map.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::codec::{decode_serial, looks_like_serial, protocol_version};
use crate::constants::{is_extended_family, model_limits};
use crate::message::{MessageTemplate, Property};
use crate::templates::{
    AREA_STATUS, DOOR_STATUS, FILTER_STATUS, OUTPUT_STATUS, TRIGGER_STATUS, TYPE_AREA, TYPE_DOOR,
    TYPE_FILTER, TYPE_OUTPUT, TYPE_TRIGGER, TYPE_ZONE, ZONE_STATUS,
};

/// The controllable and observable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Area,
    Zone,
    Output,
    Trigger,
    Door,
    Filter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Area,
        EntityKind::Zone,
        EntityKind::Output,
        EntityKind::Trigger,
        EntityKind::Door,
        EntityKind::Filter,
    ];

    /// The entity type byte shared by status queries, name pages, change
    /// bitmaps and COS notifications.
    pub fn type_byte(&self) -> u8 {
        match self {
            EntityKind::Area => TYPE_AREA,
            EntityKind::Zone => TYPE_ZONE,
            EntityKind::Output => TYPE_OUTPUT,
            EntityKind::Trigger => TYPE_TRIGGER,
            EntityKind::Door => TYPE_DOOR,
            EntityKind::Filter => TYPE_FILTER,
        }
    }

    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            TYPE_AREA => Some(EntityKind::Area),
            TYPE_ZONE => Some(EntityKind::Zone),
            TYPE_OUTPUT => Some(EntityKind::Output),
            TYPE_TRIGGER => Some(EntityKind::Trigger),
            TYPE_DOOR => Some(EntityKind::Door),
            TYPE_FILTER => Some(EntityKind::Filter),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Area => "area",
            EntityKind::Zone => "zone",
            EntityKind::Output => "output",
            EntityKind::Trigger => "trigger",
            EntityKind::Door => "door",
            EntityKind::Filter => "filter",
        }
    }

    /// The status-response template for this kind.
    pub fn status_template(&self) -> &'static MessageTemplate {
        match self {
            EntityKind::Area => &AREA_STATUS,
            EntityKind::Zone => &ZONE_STATUS,
            EntityKind::Output => &OUTPUT_STATUS,
            EntityKind::Trigger => &TRIGGER_STATUS,
            EntityKind::Door => &DOOR_STATUS,
            EntityKind::Filter => &FILTER_STATUS,
        }
    }
}

/// Immutable facts about the connected panel, built once from the plain
/// device-info exchange.
#[derive(Debug, Clone)]
pub struct PanelDescriptor {
    /// Model tag extracted from the product name (e.g. "ATS1500")
    pub model: String,
    pub product: String,
    pub firmware: String,
    /// Derived protocol version, when the firmware string parses
    pub protocol: Option<u32>,
    /// The 16-character serial as reported
    pub serial_text: String,
    /// The decoded 6-byte serial used in the crypto IV
    pub serial: [u8; 6],
    pub encryption_mode: u8,
    pub max_areas: u16,
    pub max_zones: u16,
}

impl PanelDescriptor {
    pub fn new(product: String, firmware: String, serial_text: String, encryption_mode: u8) -> Self {
        let model = extract_model_tag(&product).unwrap_or_default();
        let (max_areas, max_zones) = model_limits(&model);
        let serial = if looks_like_serial(&serial_text) {
            decode_serial(&serial_text).unwrap_or_default()
        } else {
            [0u8; 6]
        };
        let protocol = protocol_version(&firmware);
        Self {
            model,
            product,
            firmware,
            protocol,
            serial_text,
            serial,
            encryption_mode,
            max_areas,
            max_zones,
        }
    }

    /// Whether this panel belongs to the extended (x700) family.
    pub fn is_extended(&self) -> bool {
        is_extended_family(&self.model)
    }

    /// Whether name pages use the extended 30-byte format: every x700
    /// panel, and x500 panels from protocol 4004 on.
    pub fn uses_extended_names(&self) -> bool {
        if self.is_extended() {
            return true;
        }
        let b = self.model.as_bytes();
        let is_x500 = b.len() == 7 && b.starts_with(b"ATS") && &b[4..7] == b"500";
        is_x500 && self.protocol.is_some_and(|p| p >= 4004)
    }

    /// Event-log record size for this panel.
    pub fn log_record_len(&self) -> usize {
        if self.is_extended() || self.protocol.is_some_and(|p| p >= 4004) {
            60
        } else {
            70
        }
    }
}

/// Find the `ATS<digits>` tag in a product name.
fn extract_model_tag(product: &str) -> Option<String> {
    let bytes = product.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start..].starts_with(b"ATS") {
            let digits: Vec<u8> = bytes[start + 3..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .copied()
                .collect();
            if !digits.is_empty() {
                let mut tag = b"ATS".to_vec();
                tag.extend_from_slice(&digits);
                return String::from_utf8(tag).ok();
            }
        }
    }
    None
}

/// Cached status of one entity: the raw status bytes and the decoded
/// flag map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    pub raw: Vec<u8>,
    pub flags: BTreeMap<&'static str, bool>,
}

impl EntityState {
    /// Decode a status-response body (header stripped) for the given kind.
    /// The raw bytes are everything after the object id.
    pub fn from_status_body(kind: EntityKind, body: &[u8]) -> Self {
        let template = kind.status_template();
        let mut flags = BTreeMap::new();
        for (name, value) in template.get_all(body) {
            if let Property::Bool(b) = value {
                flags.insert(name, b);
            }
        }
        Self {
            raw: body.get(4..).unwrap_or_default().to_vec(),
            flags,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// A door counts as locked when none of the unlock flavours is active.
pub fn door_is_locked(state: &EntityState) -> bool {
    !state.flag("unlocked")
        && !state.flag("unlockedPeriod")
        && !state.flag("timeUnlocked")
        && !state.flag("standardTimeUnlocked")
}

/// The discovered inventory and the latest known status per entity.
#[derive(Debug, Default)]
pub struct PanelState {
    pub names: HashMap<EntityKind, BTreeMap<u16, String>>,
    pub valid: HashMap<EntityKind, BTreeSet<u16>>,
    pub zone_areas: BTreeMap<u16, BTreeSet<u16>>,
    pub status: HashMap<EntityKind, BTreeMap<u16, EntityState>>,
}

impl PanelState {
    pub fn name_of(&self, kind: EntityKind, id: u16) -> String {
        self.names
            .get(&kind)
            .and_then(|m| m.get(&id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn valid_ids(&self, kind: EntityKind) -> Vec<u16> {
        self.valid
            .get(&kind)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_valid(&self, kind: EntityKind, id: u16) -> bool {
        self.valid.get(&kind).is_some_and(|s| s.contains(&id))
    }

    /// All ids worth refreshing for a kind: the valid set when known,
    /// otherwise every named entity.
    pub fn known_ids(&self, kind: EntityKind) -> Vec<u16> {
        let valid = self.valid_ids(kind);
        if !valid.is_empty() {
            return valid;
        }
        self.names
            .get(&kind)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn status_of(&self, kind: EntityKind, id: u16) -> Option<&EntityState> {
        self.status.get(&kind).and_then(|m| m.get(&id))
    }

    /// Store a fresh status, returning the previous entry.
    pub fn update_status(
        &mut self,
        kind: EntityKind,
        id: u16,
        state: EntityState,
    ) -> Option<EntityState> {
        self.status.entry(kind).or_default().insert(id, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_type_byte_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_type_byte(kind.type_byte()), Some(kind));
        }
        assert_eq!(EntityKind::from_type_byte(0x99), None);
    }

    #[test]
    fn test_descriptor_from_product() {
        let d = PanelDescriptor::new(
            "Advisor Advanced ATS1500A-IP".to_string(),
            "MR_4.1.38741".to_string(),
            "ABCDEFGHIJKLMNOP".to_string(),
            2,
        );
        assert_eq!(d.model, "ATS1500");
        assert_eq!(d.protocol, Some(4001));
        assert_eq!(d.max_areas, 4);
        assert_eq!(d.max_zones, 64);
        assert_eq!(d.serial, [0x20, 0x82, 0x08, 0x20, 0x82, 0x08]);
        assert!(!d.is_extended());
    }

    #[test]
    fn test_descriptor_unknown_model() {
        let d = PanelDescriptor::new(
            "Some Panel".to_string(),
            "GARBAGE".to_string(),
            "not-a-serial".to_string(),
            0,
        );
        assert_eq!(d.model, "");
        assert_eq!(d.protocol, None);
        assert_eq!(d.max_areas, 4);
        assert_eq!(d.max_zones, 240);
        assert_eq!(d.serial, [0u8; 6]);
    }

    #[test]
    fn test_extended_names_selection() {
        let x700 = PanelDescriptor::new(
            "ATS1700".to_string(),
            "MR_3.0.1".to_string(),
            String::new(),
            2,
        );
        assert!(x700.uses_extended_names());

        let x500_new = PanelDescriptor::new(
            "ATS1500".to_string(),
            "MR_4.4.100".to_string(),
            String::new(),
            2,
        );
        assert_eq!(x500_new.protocol, Some(4004));
        assert!(x500_new.uses_extended_names());

        let x500_old = PanelDescriptor::new(
            "ATS1500".to_string(),
            "MR_4.1.38741".to_string(),
            String::new(),
            2,
        );
        assert!(!x500_old.uses_extended_names());
    }

    #[test]
    fn test_log_record_len() {
        let old = PanelDescriptor::new(
            "ATS1500".to_string(),
            "MR_4.1.38741".to_string(),
            String::new(),
            2,
        );
        assert_eq!(old.log_record_len(), 70);

        let extended = PanelDescriptor::new(
            "ATS4700".to_string(),
            "MR_4.1.0".to_string(),
            String::new(),
            2,
        );
        assert_eq!(extended.log_record_len(), 60);
    }

    #[test]
    fn test_entity_state_decode() {
        // Zone 5 with the tamper flag set
        let body = [0x31, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00];
        let state = EntityState::from_status_body(EntityKind::Zone, &body);
        assert!(state.flag("tamper"));
        assert!(!state.flag("active"));
        assert!(!state.flag("alarm"));
        assert_eq!(state.raw, vec![0x04, 0x00, 0x00]);
    }

    #[test]
    fn test_door_is_locked() {
        let locked = EntityState::from_status_body(
            EntityKind::Door,
            &[0x31, 0x0B, 0x00, 0x02, 0x00, 0x00],
        );
        assert!(door_is_locked(&locked));

        let unlocked = EntityState::from_status_body(
            EntityKind::Door,
            &[0x31, 0x0B, 0x00, 0x02, 0x01, 0x00],
        );
        assert!(!door_is_locked(&unlocked));

        let time_unlocked = EntityState::from_status_body(
            EntityKind::Door,
            &[0x31, 0x0B, 0x00, 0x02, 0x04, 0x00],
        );
        assert!(!door_is_locked(&time_unlocked));
    }

    #[test]
    fn test_panel_state_update_returns_old() {
        let mut state = PanelState::default();
        let a = EntityState::from_status_body(EntityKind::Zone, &[0x31, 1, 0, 1, 0x01, 0, 0]);
        let b = EntityState::from_status_body(EntityKind::Zone, &[0x31, 1, 0, 1, 0x00, 0, 0]);
        assert!(state.update_status(EntityKind::Zone, 1, a.clone()).is_none());
        let old = state.update_status(EntityKind::Zone, 1, b).unwrap();
        assert_eq!(old, a);
    }

    #[test]
    fn test_known_ids_prefers_valid_set() {
        let mut state = PanelState::default();
        state
            .names
            .entry(EntityKind::Zone)
            .or_default()
            .extend([(1, "Front".to_string()), (2, "Back".to_string())]);
        assert_eq!(state.known_ids(EntityKind::Zone), vec![1, 2]);
        state
            .valid
            .entry(EntityKind::Zone)
            .or_default()
            .extend([2u16, 7]);
        assert_eq!(state.known_ids(EntityKind::Zone), vec![2, 7]);
    }
}
