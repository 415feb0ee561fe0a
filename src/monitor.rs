// MIT License - Copyright (c) 2026 Peter Wright

//! The change-of-state loop.
//!
//! The reader task drops decrypted unsolicited frames into a one-slot
//! mailbox; this loop drains it. For each notification: classify the
//! affected entity type, acknowledge, let the panel settle, query the
//! change bitmap, refresh exactly the changed entities (or all of them
//! when the bitmap is empty), and emit change events for every real diff.
//! At most one handler runs at a time; notifications arriving meanwhile
//! are dropped, and the next bitmap query picks up whatever they carried.

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::comm::AceComm;
use crate::constants::{CHANGE_ALL, COS_ACK, COS_SETTLE_MS};
use crate::error::Result;
use crate::event::PanelEvent;
use crate::state::EntityKind;
use crate::templates::GET_USER_INFO;
use crate::transport::CosFrame;

pub struct Monitor {
    comm: AceComm,
    cos_rx: mpsc::Receiver<CosFrame>,
}

impl Monitor {
    pub fn new(comm: AceComm, cos_rx: mpsc::Receiver<CosFrame>) -> Self {
        Self { comm, cos_rx }
    }

    /// Run until the connection is cancelled or the mailbox closes.
    ///
    /// Panel-side event notifications are activated by a one-off
    /// user-info query before the loop starts.
    pub async fn run(mut self) -> Result<()> {
        self.comm
            .engine()
            .call_encrypted("getUserInfo", &GET_USER_INFO.construct(&[]), true)
            .await?;
        let _ = self.comm.event_tx().send(PanelEvent::MonitorStarted);
        debug!("Change-of-state monitor running");

        let cancel = self.comm.engine().cancel_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.cos_rx.recv() => match frame {
                    Some(frame) => self.handle_notification(&frame).await,
                    None => break,
                }
            }
        }
        debug!("Change-of-state monitor stopped");
        Ok(())
    }

    async fn handle_notification(&self, frame: &[u8]) {
        // Frame layout: header, COS marker, status byte, payload
        let status = frame.get(2).copied().unwrap_or(0);
        let payload = frame.get(3..).unwrap_or_default();
        let tag = payload.get(2).copied().unwrap_or(CHANGE_ALL);
        let kinds: Vec<EntityKind> = match EntityKind::from_type_byte(tag) {
            Some(kind) => vec![kind],
            // 0xFF and anything unknown mean "refresh everything"
            None => EntityKind::ALL.to_vec(),
        };
        debug!(
            "COS notification (status {:#04x}, tag {:#04x}, {} kind(s))",
            status,
            tag,
            kinds.len()
        );

        // Acknowledge without waiting; the panel expects no round trip
        if let Err(e) = self.comm.engine().send_fire_and_forget("cosAck", &COS_ACK).await {
            warn!("COS ack failed: {}", e);
        }

        // Give the panel a moment to update its change bitmaps
        sleep(Duration::from_millis(COS_SETTLE_MS)).await;

        for kind in kinds {
            match self.comm.get_changes(kind).await {
                Ok(changed) if changed.is_empty() => {
                    // The notification named this type but the bitmap is
                    // already clear; refresh everything we know instead
                    if let Err(e) = self.comm.refresh_all(kind, true).await {
                        warn!("Full {} refresh failed: {}", kind.label(), e);
                    }
                }
                Ok(changed) => {
                    debug!("{} changed {}(s)", changed.len(), kind.label());
                    if let Err(e) = self.comm.refresh_status(kind, &changed, true).await {
                        warn!("Targeted {} refresh failed: {}", kind.label(), e);
                    }
                }
                Err(e) => warn!("Change bitmap query for {}s failed: {}", kind.label(), e),
            }
        }
    }
}
