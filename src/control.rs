// MIT License - Copyright (c) 2026 Peter Wright

//! Supervised control operations.
//!
//! Every mutating operation runs inside a short-lived control session on
//! the panel: create the session, issue the verb, optionally poll the
//! session status, and destroy the session on every exit path. Arming is
//! the involved case, with fault/active/inhibited handling and the
//! optional force step.

use std::time::Duration;

use tracing::{debug, warn};

use crate::comm::AceComm;
use crate::config::ArmType;
use crate::constants::{
    ARM_POLL_INTERVAL_MS, ARM_POLL_TICKS, FORCE_EXTRA_TICKS, STATE_ACTIVE, STATE_FAULT,
    STATE_INHIBITED, STATE_SET, STATE_SETTING,
};
use crate::error::{AceError, Result};
use crate::message::{MessageTemplate, Property, Value};
use crate::templates::{
    area_bitmap, ARM_AREAS, CREATE_ARM_SESSION, CREATE_CONTROL_SESSION, CREATE_DISARM_SESSION,
    DESTROY_CONTROL_SESSION, DISARM_AREAS, GET_ACTIVE_ZONES, GET_FAULT_ZONES,
    GET_INHIBITED_ZONES, SESSION_STATUS, SESSION_STATUS_RESPONSE, SET_AREA_FORCED,
    SHORT_RESPONSE,
};

/// Result of a control verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Done,
    /// The entity was already in the requested state; no session was
    /// opened.
    Skipped { reason: String },
}

/// Open a control session and return its 16-bit handle.
async fn create_session(
    comm: &AceComm,
    template: &'static MessageTemplate,
    areas: &[u16],
) -> Result<u16> {
    let request = template.construct(&[("areas", Value::Bytes(&area_bitmap(areas)))]);
    let reply = comm
        .engine()
        .call_encrypted(template.name, &request, true)
        .await?;
    let body = &reply[1..];
    if body.first() != Some(&template.msg_id[0]) {
        return Err(AceError::Protocol {
            details: format!("unexpected reply to {}", template.name),
        });
    }
    let session = SHORT_RESPONSE
        .get(body, "value")
        .map(|p| p.as_int() as u16)
        .ok_or_else(|| AceError::Protocol {
            details: format!("{} reply carries no session id", template.name),
        })?;
    debug!("Control session {:#06x} created via {}", session, template.name);
    Ok(session)
}

/// Destroy a control session. Runs on every exit path; its own failure is
/// logged, never propagated. After cancellation the reply can no longer
/// be awaited, so the destroy goes out fire-and-forget.
async fn destroy_session(comm: &AceComm, session: u16) {
    let request =
        DESTROY_CONTROL_SESSION.construct(&[("session", Value::Int(session as u64))]);
    let engine = comm.engine();
    if engine.cancel_token().is_cancelled() {
        if let Err(e) = engine.send_fire_and_forget("destroyControlSession", &request).await {
            warn!("Failed to destroy control session {:#06x}: {}", session, e);
        }
        return;
    }
    match engine
        .call_encrypted("destroyControlSession", &request, true)
        .await
    {
        Ok(_) => debug!("Control session {:#06x} destroyed", session),
        Err(e) => warn!("Failed to destroy control session {:#06x}: {}", session, e),
    }
}

/// Arm areas with the given set type, polling the session until the
/// panel reports Setting/Set or a blocking condition.
pub async fn arm_areas(
    comm: &AceComm,
    areas: &[u16],
    arm_type: ArmType,
    force: bool,
) -> Result<()> {
    let session = create_session(comm, &CREATE_ARM_SESSION, areas).await?;
    let result = arm_inner(comm, session, areas, arm_type, force).await;
    destroy_session(comm, session).await;
    result
}

async fn arm_inner(
    comm: &AceComm,
    session: u16,
    areas: &[u16],
    arm_type: ArmType,
    force: bool,
) -> Result<()> {
    let engine = comm.engine();
    let cancel = engine.cancel_token();
    let arm_request = ARM_AREAS.construct(&[
        ("session", Value::Int(session as u64)),
        ("setType", Value::Int(arm_type.set_code() as u64)),
        ("areas", Value::Bytes(&area_bitmap(areas))),
    ]);
    engine.call_encrypted("armAreas", &arm_request, true).await?;

    let mut remaining = ARM_POLL_TICKS;
    let mut forced = false;
    let mut last_state: u16 = 0;

    while remaining > 0 {
        remaining -= 1;
        tokio::select! {
            _ = cancel.cancelled() => return Err(AceError::Aborted),
            _ = tokio::time::sleep(Duration::from_millis(ARM_POLL_INTERVAL_MS)) => {}
        }

        let request = SESSION_STATUS.construct(&[("session", Value::Int(session as u64))]);
        let reply = engine
            .call_encrypted("controlSessionStatus", &request, true)
            .await?;
        let body = &reply[1..];
        if !SESSION_STATUS_RESPONSE.matches(body) {
            // Unrelated reply slipped in; just poll again
            continue;
        }
        let Some(Property::Int(state)) = SESSION_STATUS_RESPONSE.get(body, "stateId") else {
            continue;
        };
        let state = state as u16;
        last_state = state;

        if state == arm_type.state_id(STATE_SETTING) || state == arm_type.state_id(STATE_SET) {
            debug!("Areas {:?} arming reported state {:#06x}", areas, state);
            return Ok(());
        }

        if state == arm_type.state_id(STATE_FAULT) || state == arm_type.state_id(STATE_ACTIVE) {
            if !force {
                return Err(blocking_error(comm, session, state, arm_type).await);
            }
            if !forced {
                debug!("Blocking state {:#06x}, forcing", state);
                let request = SET_AREA_FORCED.construct(&[
                    ("session", Value::Int(session as u64)),
                    ("setType", Value::Int(arm_type.set_code() as u64)),
                ]);
                engine.call_encrypted("setAreaForced", &request, true).await?;
                forced = true;
                remaining = FORCE_EXTRA_TICKS;
            }
        } else if state == arm_type.state_id(STATE_INHIBITED) {
            if !force {
                return Err(blocking_error(comm, session, state, arm_type).await);
            }
            if !forced {
                // Inhibited zones are overridden by re-issuing the arm
                // request, not by setAreaForced
                debug!("Inhibited zones, re-sending armAreas");
                engine.call_encrypted("armAreas", &arm_request, true).await?;
                forced = true;
                remaining = FORCE_EXTRA_TICKS;
            }
        }
    }

    if forced {
        Err(AceError::ForceArmFailed { state: last_state })
    } else {
        Err(AceError::ArmTimeout)
    }
}

/// Build the typed error for a blocking arm state, reading the relevant
/// issue list first.
async fn blocking_error(comm: &AceComm, session: u16, state: u16, arm_type: ArmType) -> AceError {
    if state == arm_type.state_id(STATE_FAULT) {
        let zones = read_arm_issues(comm, session, &GET_FAULT_ZONES).await;
        AceError::ArmFaults { zones }
    } else if state == arm_type.state_id(STATE_ACTIVE) {
        let zones = read_arm_issues(comm, session, &GET_ACTIVE_ZONES).await;
        AceError::ArmActiveZones { zones }
    } else {
        let zones = read_arm_issues(comm, session, &GET_INHIBITED_ZONES).await;
        AceError::ArmInhibited { zones }
    }
}

/// Read an issue list (faults, active or inhibited zones), iterating with
/// next=0 then next=1 until a boolean reply or an error ends it. The
/// result is best-effort: an error mid-read just terminates the list.
async fn read_arm_issues(
    comm: &AceComm,
    session: u16,
    template: &'static MessageTemplate,
) -> Vec<u16> {
    let mut zones = Vec::new();
    let mut next = 0u64;
    loop {
        let request = template.construct(&[
            ("session", Value::Int(session as u64)),
            ("next", Value::Int(next)),
        ]);
        let reply = match comm.engine().call_encrypted(template.name, &request, true).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!("{} read ended with {}", template.name, e);
                break;
            }
        };
        match parse_issue_list(&reply[1..], template.msg_id[0]) {
            Some(chunk) if !chunk.is_empty() => {
                zones.extend(chunk);
                next = 1;
            }
            _ => break,
        }
    }
    zones
}

/// Parse an issue-list body: the echoed command id, a count byte, then
/// `count` 16-bit zone numbers. A short (boolean) reply returns `None`.
fn parse_issue_list(body: &[u8], expected_id: u8) -> Option<Vec<u16>> {
    if body.first() != Some(&expected_id) || body.len() <= 2 {
        return None;
    }
    let count = *body.get(1)? as usize;
    let mut zones = Vec::with_capacity(count);
    for i in 0..count {
        let entry = body.get(2 + i * 2..4 + i * 2)?;
        zones.push(u16::from_le_bytes([entry[0], entry[1]]));
    }
    Some(zones)
}

/// Disarm areas. No polling: the verb either succeeds or the panel says
/// why not.
pub async fn disarm_areas(comm: &AceComm, areas: &[u16]) -> Result<()> {
    let session = create_session(comm, &CREATE_DISARM_SESSION, areas).await?;
    let request = DISARM_AREAS.construct(&[
        ("session", Value::Int(session as u64)),
        ("areas", Value::Bytes(&area_bitmap(areas))),
    ]);
    let result = comm
        .engine()
        .call_encrypted("disarmAreas", &request, true)
        .await
        .map(|_| ());
    destroy_session(comm, session).await;
    result
}

/// Run a simple control verb against one entity inside a throwaway
/// session. Zone/output/trigger verbs answer with a boolean; door verbs
/// only signal through the response/error header.
pub async fn run_verb(
    comm: &AceComm,
    verb: &'static MessageTemplate,
    object_id: u16,
    seconds: Option<u16>,
    expects_boolean: bool,
) -> Result<()> {
    let session = create_session(comm, &CREATE_CONTROL_SESSION, &[]).await?;
    let result = run_verb_inner(comm, verb, session, object_id, seconds, expects_boolean).await;
    destroy_session(comm, session).await;
    result
}

async fn run_verb_inner(
    comm: &AceComm,
    verb: &'static MessageTemplate,
    session: u16,
    object_id: u16,
    seconds: Option<u16>,
    expects_boolean: bool,
) -> Result<()> {
    let mut props = vec![
        ("session", Value::Int(session as u64)),
        ("objectId", Value::Int(object_id as u64)),
    ];
    if let Some(seconds) = seconds {
        props.push(("seconds", Value::Int(seconds as u64)));
    }
    let request = verb.construct(&props);
    let reply = comm.engine().call_encrypted(verb.name, &request, true).await?;

    if expects_boolean && !boolean_ok(&reply[1..]) {
        return Err(AceError::ControlRejected { op: verb.name });
    }
    Ok(())
}

fn boolean_ok(body: &[u8]) -> bool {
    crate::templates::BOOLEAN_RESPONSE
        .get(body, "value")
        .map(|p| p.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issue_list() {
        // id, count=3, zones 5, 7, 300
        let body = [0x48, 3, 5, 0, 7, 0, 0x2C, 0x01];
        assert_eq!(parse_issue_list(&body, 0x48), Some(vec![5, 7, 300]));
    }

    #[test]
    fn test_parse_issue_list_boolean_reply_is_none() {
        assert_eq!(parse_issue_list(&[0x48, 0x01], 0x48), None);
        assert_eq!(parse_issue_list(&[0x48], 0x48), None);
    }

    #[test]
    fn test_parse_issue_list_wrong_id() {
        assert_eq!(parse_issue_list(&[0x49, 1, 5, 0], 0x48), None);
    }

    #[test]
    fn test_parse_issue_list_truncated() {
        // Promises 2 zones but carries one
        assert_eq!(parse_issue_list(&[0x48, 2, 5, 0], 0x48), None);
    }

    #[test]
    fn test_empty_issue_list_terminates() {
        // count=0 parses to an empty list, which ends the read loop
        let body = [0x48, 0, 0];
        assert_eq!(parse_issue_list(&body, 0x48), Some(vec![]));
    }
}
