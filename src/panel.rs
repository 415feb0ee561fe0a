// MIT License - Copyright (c) 2026 Peter Wright

//! The public panel API.
//!
//! `AtsPanel::connect` dials the panel, runs the handshake, discovers the
//! inventory and hands back a handle exposing queries, supervised control
//! operations, the change monitor and the event log.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::comm::AceComm;
use crate::config::{ArmType, PanelConfig};
use crate::control::{self, ControlOutcome};
use crate::error::{AceError, Result};
use crate::event::{event_channel, EventReceiver, EventSender};
use crate::eventlog::{EventLogReader, LogRecord};
use crate::monitor::Monitor;
use crate::state::{door_is_locked, EntityKind, EntityState, PanelDescriptor};
use crate::templates::{
    ACTIVATE_OUTPUT, ACTIVATE_TRIGGER, DEACTIVATE_OUTPUT, DEACTIVATE_TRIGGER, DISABLE_DOOR,
    ENABLE_DOOR, INHIBIT_ZONE, LOCK_DOOR, UNINHIBIT_ZONE, UNLOCK_DOOR, UNLOCK_DOOR_STANDARD,
    UNLOCK_DOOR_TIME,
};
use crate::transport::DirectTransport;

pub struct AtsPanel {
    transport: DirectTransport,
    comm: AceComm,
    event_tx: EventSender,
    monitor_handle: Option<tokio::task::JoinHandle<()>>,
}

impl AtsPanel {
    /// Connect with retries on transient errors, exponential backoff from
    /// the configured base delay.
    pub async fn connect(config: PanelConfig) -> Result<Self> {
        let max_retries = config.max_connect_retries;
        let base_delay_ms = config.reconnect_delay_ms;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = base_delay_ms * (1 << (attempt - 1).min(4));
                warn!(
                    "Connection attempt {} failed, retrying in {:.1}s",
                    attempt,
                    delay_ms as f64 / 1000.0
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
            match Self::try_connect(config.clone()).await {
                Ok(panel) => return Ok(panel),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!("Connection error (attempt {}): {}", attempt + 1, e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(AceError::Disconnected)
    }

    async fn try_connect(config: PanelConfig) -> Result<Self> {
        let (event_tx, _keepalive_rx) = event_channel(256);
        let transport = DirectTransport::connect(&config, event_tx.clone()).await?;
        let comm = AceComm::new(
            transport.engine().clone(),
            Arc::new(transport.descriptor().clone()),
            event_tx.clone(),
        );
        comm.discover().await?;
        info!("Panel ready");
        Ok(Self {
            transport,
            comm,
            event_tx,
            monitor_handle: None,
        })
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn descriptor(&self) -> &PanelDescriptor {
        self.comm.descriptor()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.transport.user_name()
    }

    /// Start the change-of-state monitor loop in the background.
    pub fn start_monitor(&mut self) -> Result<()> {
        let cos_rx = self
            .transport
            .take_cos_receiver()
            .ok_or_else(|| AceError::Protocol {
                details: "monitor already started".to_string(),
            })?;
        let monitor = Monitor::new(self.comm.clone(), cos_rx);
        self.monitor_handle = Some(tokio::spawn(async move {
            if let Err(e) = monitor.run().await {
                warn!("Monitor loop ended with error: {}", e);
            }
        }));
        Ok(())
    }

    // --- Inventory and status accessors ---

    pub async fn names(&self, kind: EntityKind) -> BTreeMap<u16, String> {
        self.comm
            .state()
            .read()
            .await
            .names
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn zone_areas(&self) -> BTreeMap<u16, BTreeSet<u16>> {
        self.comm.state().read().await.zone_areas.clone()
    }

    /// Refresh a kind and return `(id, name, state)` rows for every known
    /// entity.
    pub async fn snapshot(&self, kind: EntityKind) -> Result<Vec<(u16, String, Option<EntityState>)>> {
        self.comm.refresh_all(kind, false).await?;
        let state = self.comm.state().read().await;
        let mut ids: BTreeSet<u16> = state.known_ids(kind).into_iter().collect();
        if let Some(names) = state.names.get(&kind) {
            ids.extend(names.keys().copied());
        }
        Ok(ids
            .into_iter()
            .map(|id| {
                (
                    id,
                    state.name_of(kind, id),
                    state.status_of(kind, id).cloned(),
                )
            })
            .collect())
    }

    async fn check_valid(&self, kind: EntityKind, id: u16) -> Result<()> {
        let state = self.comm.state().read().await;
        let valid = state.valid_ids(kind);
        if !valid.is_empty() && !valid.contains(&id) {
            return Err(AceError::InvalidObjectId {
                kind: kind.label(),
                id,
                max: valid.iter().max().copied().unwrap_or(0),
            });
        }
        Ok(())
    }

    /// Current cached flag state after a targeted refresh.
    async fn fresh_state(&self, kind: EntityKind, id: u16) -> Result<Option<EntityState>> {
        self.comm.refresh_status(kind, &[id], false).await?;
        Ok(self.comm.state().read().await.status_of(kind, id).cloned())
    }

    // --- Supervised operations ---

    /// Arm areas (all valid areas when `areas` is empty).
    pub async fn arm(&self, areas: &[u16], arm_type: ArmType, force: bool) -> Result<()> {
        let areas = self.resolve_areas(areas).await?;
        debug!("Arming areas {:?} ({:?}, force={})", areas, arm_type, force);
        control::arm_areas(&self.comm, &areas, arm_type, force).await
    }

    /// Disarm areas (all valid areas when `areas` is empty).
    pub async fn disarm(&self, areas: &[u16]) -> Result<()> {
        let areas = self.resolve_areas(areas).await?;
        debug!("Disarming areas {:?}", areas);
        control::disarm_areas(&self.comm, &areas).await
    }

    async fn resolve_areas(&self, areas: &[u16]) -> Result<Vec<u16>> {
        if areas.is_empty() {
            let all = self.comm.state().read().await.valid_ids(EntityKind::Area);
            return Ok(all);
        }
        for &area in areas {
            self.check_valid(EntityKind::Area, area).await?;
        }
        Ok(areas.to_vec())
    }

    pub async fn inhibit_zone(&self, zone: u16) -> Result<()> {
        self.check_valid(EntityKind::Zone, zone).await?;
        control::run_verb(&self.comm, &INHIBIT_ZONE, zone, None, true).await
    }

    pub async fn uninhibit_zone(&self, zone: u16) -> Result<()> {
        self.check_valid(EntityKind::Zone, zone).await?;
        control::run_verb(&self.comm, &UNINHIBIT_ZONE, zone, None, true).await
    }

    pub async fn set_output(&self, output: u16, active: bool) -> Result<()> {
        self.check_valid(EntityKind::Output, output).await?;
        let verb = if active { &ACTIVATE_OUTPUT } else { &DEACTIVATE_OUTPUT };
        control::run_verb(&self.comm, verb, output, None, true).await
    }

    /// Activate or deactivate a trigger, skipping the session entirely
    /// when it is already in the requested state.
    pub async fn set_trigger(&self, trigger: u16, active: bool) -> Result<ControlOutcome> {
        self.check_valid(EntityKind::Trigger, trigger).await?;
        if let Some(state) = self.fresh_state(EntityKind::Trigger, trigger).await? {
            if state.flag("active") == active {
                return Ok(ControlOutcome::Skipped {
                    reason: format!(
                        "trigger {} already {}",
                        trigger,
                        if active { "active" } else { "inactive" }
                    ),
                });
            }
        }
        let verb = if active { &ACTIVATE_TRIGGER } else { &DEACTIVATE_TRIGGER };
        control::run_verb(&self.comm, verb, trigger, None, true).await?;
        Ok(ControlOutcome::Done)
    }

    pub async fn lock_door(&self, door: u16) -> Result<ControlOutcome> {
        self.door_verb(door, &LOCK_DOOR, None, |s| door_is_locked(s), "already locked")
            .await
    }

    pub async fn unlock_door(&self, door: u16) -> Result<ControlOutcome> {
        self.door_verb(door, &UNLOCK_DOOR, None, |s| s.flag("unlocked"), "already unlocked")
            .await
    }

    pub async fn unlock_door_standard(&self, door: u16) -> Result<ControlOutcome> {
        self.door_verb(
            door,
            &UNLOCK_DOOR_STANDARD,
            None,
            |s| s.flag("standardTimeUnlocked"),
            "already on standard time unlock",
        )
        .await
    }

    pub async fn unlock_door_timed(&self, door: u16, seconds: u16) -> Result<ControlOutcome> {
        self.door_verb(
            door,
            &UNLOCK_DOOR_TIME,
            Some(seconds),
            |s| s.flag("timeUnlocked"),
            "already time-unlocked",
        )
        .await
    }

    pub async fn set_door_enabled(&self, door: u16, enabled: bool) -> Result<ControlOutcome> {
        if enabled {
            self.door_verb(door, &ENABLE_DOOR, None, |s| !s.flag("disabled"), "already enabled")
                .await
        } else {
            self.door_verb(door, &DISABLE_DOOR, None, |s| s.flag("disabled"), "already disabled")
                .await
        }
    }

    async fn door_verb(
        &self,
        door: u16,
        verb: &'static crate::message::MessageTemplate,
        seconds: Option<u16>,
        already: impl Fn(&EntityState) -> bool,
        reason: &str,
    ) -> Result<ControlOutcome> {
        self.check_valid(EntityKind::Door, door).await?;
        if let Some(state) = self.fresh_state(EntityKind::Door, door).await? {
            if already(&state) {
                return Ok(ControlOutcome::Skipped {
                    reason: format!("door {} {}", door, reason),
                });
            }
        }
        // Door verbs answer with the plain ok/error header, no boolean
        control::run_verb(&self.comm, verb, door, seconds, false).await?;
        Ok(ControlOutcome::Done)
    }

    // --- Event log ---

    pub async fn event_log(&self, max_events: usize) -> Result<Vec<LogRecord>> {
        let reader = EventLogReader::open(self.comm.clone(), max_events).await?;
        reader.collect().await
    }

    /// Tear down the connection.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
        }
        self.transport.disconnect(&self.event_tx).await;
    }
}
