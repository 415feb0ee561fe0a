// MIT License - Copyright (c) 2026 Peter Wright

//! Inventory and status queries: name pagination, valid-entity sets, the
//! zone-to-areas map, and batched status refreshes feeding the cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::batch::{build_batch, object_id, split_batch, EMBEDDED_STATUS_LEN, EMBEDDED_ZONE_AREA_LEN};
use crate::constants::NAME_SCAN_CAP;
use crate::error::{AceError, Result};
use crate::event::{EventSender, PanelEvent};
use crate::message::Value;
use crate::state::{EntityKind, EntityState, PanelDescriptor, PanelState};
use crate::templates::{
    decode_bitset, GET_CHANGES, GET_NAMES, GET_STATUS, GET_VALID_AREAS, GET_ZONES_ASSIGNED,
    NAME_PAGE, VALID_AREAS, ZONES_ASSIGNED,
};
use crate::transport::CommandEngine;

/// Entries per name page and name width for the two page formats.
const STANDARD_PAGE: (u16, usize) = (16, 16);
const EXTENDED_PAGE: (u16, usize) = (4, 30);

/// Shared query layer of one connection. Cheap to clone; the monitor,
/// control sessions and the event-log reader all work through it.
#[derive(Clone)]
pub struct AceComm {
    engine: Arc<CommandEngine>,
    descriptor: Arc<PanelDescriptor>,
    state: Arc<RwLock<PanelState>>,
    event_tx: EventSender,
}

impl AceComm {
    pub fn new(
        engine: Arc<CommandEngine>,
        descriptor: Arc<PanelDescriptor>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            engine,
            descriptor,
            state: Arc::new(RwLock::new(PanelState::default())),
            event_tx,
        }
    }

    pub fn engine(&self) -> &Arc<CommandEngine> {
        &self.engine
    }

    pub fn descriptor(&self) -> &PanelDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &Arc<RwLock<PanelState>> {
        &self.state
    }

    pub fn event_tx(&self) -> &EventSender {
        &self.event_tx
    }

    async fn call(&self, op: &str, payload: &[u8]) -> Result<Vec<u8>> {
        self.engine.call_encrypted(op, payload, true).await
    }

    /// Populate the full inventory: valid areas, names, the zone map and
    /// an initial status sweep. No change events fire for the initial
    /// population.
    pub async fn discover(&self) -> Result<()> {
        debug!("Starting inventory discovery");
        self.fetch_valid_areas().await?;
        self.fetch_zone_map().await?;
        for kind in EntityKind::ALL {
            if let Err(e) = self.fetch_names(kind).await {
                warn!("Name discovery for {}s failed: {}", kind.label(), e);
            }
        }
        for kind in EntityKind::ALL {
            if let Err(e) = self.refresh_all(kind, false).await {
                warn!("Initial {} status sweep failed: {}", kind.label(), e);
            }
        }
        let _ = self.event_tx.send(PanelEvent::DiscoveryComplete);
        debug!("Inventory discovery complete");
        Ok(())
    }

    /// Valid areas: extended panels do not answer the query and get the
    /// full 1..=max range instead.
    pub async fn fetch_valid_areas(&self) -> Result<Vec<u16>> {
        let areas: Vec<u16> = if self.descriptor.is_extended() {
            (1..=self.descriptor.max_areas).collect()
        } else {
            let reply = self
                .call("getValidAreas", &GET_VALID_AREAS.construct(&[]))
                .await?;
            let body = &reply[1..];
            if !VALID_AREAS.matches(body) {
                return Err(AceError::Protocol {
                    details: "unexpected reply to getValidAreas".to_string(),
                });
            }
            decode_bitset(body.get(1..).unwrap_or_default())
        };
        let mut state = self.state.write().await;
        state.valid.insert(EntityKind::Area, areas.iter().copied().collect());
        debug!("{} valid areas", areas.len());
        Ok(areas)
    }

    /// Zone map: one zones-assigned query per valid area, batched, with a
    /// per-area fallback when the batch reply does not parse. Unions the
    /// valid zone set and builds zone→areas.
    pub async fn fetch_zone_map(&self) -> Result<()> {
        let areas = self.state.read().await.valid_ids(EntityKind::Area);
        let mut assignments: Vec<(u16, Vec<u16>)> = Vec::new();

        for chunk in areas.chunks(8) {
            match self.fetch_zone_map_batch(chunk).await {
                Ok(mut batch) => assignments.append(&mut batch),
                Err(e) => {
                    debug!("Zones-assigned batch failed ({}), falling back per area", e);
                    for &area in chunk {
                        let request = GET_ZONES_ASSIGNED
                            .construct(&[("area", Value::Int(area as u64))]);
                        let reply = self.call("getZonesAssignedToAreas", &request).await?;
                        if let Some(parsed) = parse_zones_assigned(&reply[1..]) {
                            assignments.push(parsed);
                        }
                    }
                }
            }
        }

        let mut valid_zones: BTreeSet<u16> = BTreeSet::new();
        let mut state = self.state.write().await;
        state.zone_areas.clear();
        for (area, zones) in assignments {
            for zone in zones {
                valid_zones.insert(zone);
                state.zone_areas.entry(zone).or_default().insert(area);
            }
        }
        debug!("{} valid zones across {} areas", valid_zones.len(), areas.len());
        state.valid.insert(EntityKind::Zone, valid_zones);
        Ok(())
    }

    async fn fetch_zone_map_batch(&self, areas: &[u16]) -> Result<Vec<(u16, Vec<u16>)>> {
        let requests: Vec<Vec<u8>> = areas
            .iter()
            .map(|&a| GET_ZONES_ASSIGNED.construct(&[("area", Value::Int(a as u64))]))
            .collect();
        let batch = build_batch(&requests, EMBEDDED_ZONE_AREA_LEN)?;
        let reply = self.call("getZonesAssignedToAreas", &batch).await?;
        let parts = split_batch(&reply)?;
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            let parsed = parse_zones_assigned(&part).ok_or_else(|| AceError::Protocol {
                details: "malformed zones-assigned reply".to_string(),
            })?;
            out.push(parsed);
        }
        Ok(out)
    }

    /// Fetch names for one kind, paging in the format the panel speaks.
    pub async fn fetch_names(&self, kind: EntityKind) -> Result<()> {
        let extended = self.descriptor.uses_extended_names();
        let (per_page, name_len) = if extended { EXTENDED_PAGE } else { STANDARD_PAGE };

        let valid = self.state.read().await.valid_ids(kind);
        let starts: Vec<u16> = if !valid.is_empty() {
            page_starts(&valid, per_page)
        } else {
            match kind {
                EntityKind::Area => count_pages(self.descriptor.max_areas, per_page),
                EntityKind::Zone => count_pages(self.descriptor.max_zones, per_page),
                // Open-ended kinds scan until names dry up
                _ => count_pages(NAME_SCAN_CAP, per_page),
            }
        };
        let open_ended =
            valid.is_empty() && !matches!(kind, EntityKind::Area | EntityKind::Zone);

        let mut names = Vec::new();
        for start in starts {
            let request = GET_NAMES.construct(&[
                ("kind", Value::Int(kind.type_byte() as u64)),
                ("startIndex", Value::Int(start as u64)),
                ("count", Value::Int(per_page as u64)),
                ("extendedFormat", Value::Bool(extended)),
            ]);
            let reply = self.call("getNames", &request).await?;
            let entries =
                parse_name_page(&reply[1..], name_len).ok_or_else(|| AceError::Protocol {
                    details: "malformed name page".to_string(),
                })?;
            let empty_page = entries.is_empty();
            names.extend(entries);
            if open_ended && empty_page {
                break;
            }
        }

        if !valid.is_empty() {
            names.retain(|(id, _)| valid.contains(id));
        }

        let mut state = self.state.write().await;
        let map = state.names.entry(kind).or_default();
        map.clear();
        let count = names.len();
        map.extend(names);
        debug!("{} {} names", count, kind.label());
        Ok(())
    }

    /// Change bitmap for one kind after a COS notification. Bits outside
    /// the valid set are ignored.
    pub async fn get_changes(&self, kind: EntityKind) -> Result<Vec<u16>> {
        let request = GET_CHANGES.construct(&[("kind", Value::Int(kind.type_byte() as u64))]);
        let reply = self.call("getChanges", &request).await?;
        let body = &reply[1..];
        if body.first() != Some(&GET_CHANGES.msg_id[0]) || body.get(1) != Some(&kind.type_byte()) {
            return Err(AceError::Protocol {
                details: format!("unexpected reply to getChanges for {}", kind.label()),
            });
        }
        let mut changed = decode_bitset(body.get(2..).unwrap_or_default());
        let state = self.state.read().await;
        if let Some(valid) = state.valid.get(&kind) {
            if !valid.is_empty() {
                changed.retain(|id| valid.contains(id));
            }
        }
        Ok(changed)
    }

    /// Refresh every known entity of a kind.
    pub async fn refresh_all(&self, kind: EntityKind, emit: bool) -> Result<()> {
        let ids = self.state.read().await.known_ids(kind);
        self.refresh_status(kind, &ids, emit).await
    }

    /// Refresh specific entities, batched eight at a time. The cache is
    /// only touched after a successful read; with `emit` set, a change in
    /// the raw status bytes produces a [`PanelEvent::StateChanged`].
    pub async fn refresh_status(&self, kind: EntityKind, ids: &[u16], emit: bool) -> Result<()> {
        for chunk in ids.chunks(8) {
            let parts = if chunk.len() == 1 {
                let request = self.status_request(kind, chunk[0]);
                let reply = self.call("getStatus", &request).await?;
                split_batch(&reply)?
            } else {
                let requests: Vec<Vec<u8>> =
                    chunk.iter().map(|&id| self.status_request(kind, id)).collect();
                let batch = build_batch(&requests, EMBEDDED_STATUS_LEN)?;
                let reply = self.call("getStatus", &batch).await?;
                split_batch(&reply)?
            };

            for part in parts {
                if !kind.status_template().matches(&part) {
                    debug!("Skipping embedded reply of unexpected type");
                    continue;
                }
                let Some(id) = object_id(&part).map(u16::from) else {
                    continue;
                };
                self.apply_status(kind, id, &part, emit).await;
            }
        }
        Ok(())
    }

    fn status_request(&self, kind: EntityKind, id: u16) -> Vec<u8> {
        GET_STATUS.construct(&[
            ("kind", Value::Int(kind.type_byte() as u64)),
            ("objectId", Value::Int(id as u64)),
        ])
    }

    /// Store a freshly read status and emit a change event when the raw
    /// bytes differ from the cached ones.
    pub async fn apply_status(&self, kind: EntityKind, id: u16, body: &[u8], emit: bool) {
        let new_state = EntityState::from_status_body(kind, body);
        let mut state = self.state.write().await;
        let old = state.status_of(kind, id).cloned();
        if old.as_ref().is_some_and(|o| o.raw == new_state.raw) {
            return;
        }
        let name = state.name_of(kind, id);
        let new_raw = new_state.raw.clone();
        state.update_status(kind, id, new_state);
        if emit {
            let _ = self.event_tx.send(PanelEvent::StateChanged {
                kind,
                id,
                name,
                old: old.map(|o| o.raw),
                new: new_raw,
            });
        }
    }
}

/// First indices of the pages covering the given entity numbers.
fn page_starts(ids: &[u16], per_page: u16) -> Vec<u16> {
    let mut starts: BTreeSet<u16> = BTreeSet::new();
    for &id in ids {
        if id >= 1 {
            starts.insert(((id - 1) / per_page) * per_page + 1);
        }
    }
    starts.into_iter().collect()
}

/// Page starts covering 1..=max.
fn count_pages(max: u16, per_page: u16) -> Vec<u16> {
    (1..=max).step_by(per_page as usize).collect()
}

/// Parse a name page body: kind, entry count, then `count` entries of a
/// 16-bit entity number and a fixed-width name. Empty names are skipped.
fn parse_name_page(body: &[u8], name_len: usize) -> Option<Vec<(u16, String)>> {
    if !NAME_PAGE.matches(body) {
        return None;
    }
    let count = *body.get(2)? as usize;
    let entry_len = 2 + name_len;
    let mut out = Vec::new();
    for i in 0..count {
        let offset = 3 + i * entry_len;
        let entry = body.get(offset..offset + entry_len)?;
        let id = u16::from_le_bytes([entry[0], entry[1]]);
        let name: String = entry[2..]
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>()
            .trim()
            .to_string();
        if !name.is_empty() {
            out.push((id, name));
        }
    }
    Some(out)
}

/// Parse a zones-assigned reply: the area id then a 30-byte zone bitset.
fn parse_zones_assigned(body: &[u8]) -> Option<(u16, Vec<u16>)> {
    if !ZONES_ASSIGNED.matches(body) {
        return None;
    }
    let area = *body.get(1)? as u16;
    let bitset = body.get(2..32)?;
    Some((area, decode_bitset(bitset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_starts_standard() {
        assert_eq!(page_starts(&[1, 2, 3], 16), vec![1]);
        assert_eq!(page_starts(&[1, 17], 16), vec![1, 17]);
        assert_eq!(page_starts(&[16, 17, 40], 16), vec![1, 17, 33]);
        assert_eq!(page_starts(&[], 16), Vec::<u16>::new());
    }

    #[test]
    fn test_page_starts_extended() {
        assert_eq!(page_starts(&[1, 4], 4), vec![1]);
        assert_eq!(page_starts(&[5], 4), vec![5]);
        assert_eq!(page_starts(&[3, 9, 10], 4), vec![1, 9]);
    }

    #[test]
    fn test_count_pages() {
        assert_eq!(count_pages(4, 4), vec![1]);
        assert_eq!(count_pages(64, 16), vec![1, 17, 33, 49]);
        assert_eq!(count_pages(5, 4), vec![1, 5]);
    }

    fn name_entry(id: u16, name: &str, name_len: usize) -> Vec<u8> {
        let mut entry = id.to_le_bytes().to_vec();
        let mut bytes = name.as_bytes().to_vec();
        bytes.resize(name_len, 0);
        entry.extend_from_slice(&bytes);
        entry
    }

    #[test]
    fn test_parse_name_page() {
        let mut body = vec![0x32, 0x01, 3];
        body.extend(name_entry(1, "Front door", 16));
        body.extend(name_entry(2, "", 16));
        body.extend(name_entry(3, "Garage", 16));
        let entries = parse_name_page(&body, 16).unwrap();
        assert_eq!(
            entries,
            vec![(1, "Front door".to_string()), (3, "Garage".to_string())]
        );
    }

    #[test]
    fn test_parse_name_page_extended_width() {
        let mut body = vec![0x32, 0x02, 1];
        body.extend(name_entry(2, "Perimeter and outbuildings", 30));
        let entries = parse_name_page(&body, 30).unwrap();
        assert_eq!(entries, vec![(2, "Perimeter and outbuildings".to_string())]);
    }

    #[test]
    fn test_parse_name_page_truncated() {
        let mut body = vec![0x32, 0x01, 2];
        body.extend(name_entry(1, "Front", 16));
        // Second promised entry missing
        assert!(parse_name_page(&body, 16).is_none());
    }

    #[test]
    fn test_parse_name_page_wrong_id() {
        assert!(parse_name_page(&[0x33, 0x01, 0], 16).is_none());
    }

    #[test]
    fn test_parse_zones_assigned() {
        let mut body = vec![0x34, 0x02];
        let mut bitset = vec![0u8; 30];
        bitset[0] = 0b0000_0101; // zones 1 and 3
        bitset[1] = 0b0000_0001; // zone 9
        body.extend_from_slice(&bitset);
        let (area, zones) = parse_zones_assigned(&body).unwrap();
        assert_eq!(area, 2);
        assert_eq!(zones, vec![1, 3, 9]);
    }

    #[test]
    fn test_parse_zones_assigned_short() {
        assert!(parse_zones_assigned(&[0x34, 0x02, 0x00]).is_none());
    }
}
