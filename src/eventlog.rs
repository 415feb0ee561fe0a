// MIT License - Copyright (c) 2026 Peter Wright

//! Event-log iteration.
//!
//! The log is opened once, then read record by record with FIRST/NEXT
//! selectors. Records are 60 bytes on newer panels and 70 on older ones;
//! the only difference is the description width. The end of the log shows
//! up as two consecutive records with sequence zero.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::codec::decode_bcd_timestamp;
use crate::comm::AceComm;
use crate::constants::log_category;
use crate::error::Result;
use crate::message::Value;
use crate::templates::{
    LOG_DESCRIPTION_OFFSET, LOG_ENTRY, OPEN_LOG, SELECT_LOG_ENTRY, START_MONITOR,
};

const DIRECTION_FIRST: u64 = 0x00;
const DIRECTION_NEXT: u64 = 0x03;
/// Consecutive unusable replies tolerated before the stream ends.
const ERROR_BUDGET: u32 = 3;

/// One decoded log record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub sequence: u8,
    pub log_type: u8,
    pub category: &'static str,
    pub event_id: u16,
    pub class_id: u8,
    pub sub_id: u8,
    pub entity_id: u16,
    pub area: u8,
    pub details: [u8; 7],
    pub description: String,
}

/// Lazy reader over the panel's event log.
pub struct EventLogReader {
    comm: AceComm,
    record_len: usize,
    max_events: usize,
    produced: usize,
    started: bool,
    last_sequence: Option<u8>,
    finished: bool,
}

impl EventLogReader {
    /// Open the log. Extended panels need the monitor started first.
    pub async fn open(comm: AceComm, max_events: usize) -> Result<Self> {
        let record_len = comm.descriptor().log_record_len();
        if comm.descriptor().is_extended() {
            comm.engine()
                .call_encrypted("startMonitor", &START_MONITOR.construct(&[]), true)
                .await?;
        }
        comm.engine()
            .call_encrypted("openLog", &OPEN_LOG.construct(&[]), true)
            .await?;
        debug!("Event log opened ({}-byte records)", record_len);
        Ok(Self {
            comm,
            record_len,
            max_events,
            produced: 0,
            started: false,
            last_sequence: None,
            finished: false,
        })
    }

    /// The next record, or `None` once the log is exhausted.
    pub async fn next(&mut self) -> Result<Option<LogRecord>> {
        if self.finished || self.produced >= self.max_events {
            return Ok(None);
        }
        let cancel = self.comm.engine().cancel_token();
        let mut errors = 0u32;

        loop {
            if cancel.is_cancelled() {
                self.finished = true;
                return Ok(None);
            }
            let direction = if self.started { DIRECTION_NEXT } else { DIRECTION_FIRST };
            let request = SELECT_LOG_ENTRY.construct(&[("direction", Value::Int(direction))]);
            let reply = self
                .comm
                .engine()
                .call_encrypted("selectLogEntry", &request, true)
                .await?;
            self.started = true;

            let body = &reply[1..];
            let Some(record) = parse_log_record(body, self.record_len) else {
                // An unrelated reply (a stray ack, a short frame): tolerate
                // a few in a row, then end the stream
                errors += 1;
                if errors >= ERROR_BUDGET {
                    debug!("Event log ended after {} unusable replies", errors);
                    self.finished = true;
                    return Ok(None);
                }
                continue;
            };

            // Termination: two consecutive zero sequence numbers
            if record.sequence == 0 && self.last_sequence == Some(0) {
                self.finished = true;
                return Ok(None);
            }
            self.last_sequence = Some(record.sequence);
            self.produced += 1;
            return Ok(Some(record));
        }
    }

    /// Collect the remaining records (bounded by `max_events`).
    pub async fn collect(mut self) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Decode one log record body (header stripped) of the given size.
fn parse_log_record(body: &[u8], record_len: usize) -> Option<LogRecord> {
    if !LOG_ENTRY.matches(body) || body.len() < record_len {
        return None;
    }
    let get_int = |name: &str| LOG_ENTRY.get(body, name).map(|p| p.as_int());

    let timestamp = LOG_ENTRY
        .get_raw(body, "timestamp")
        .and_then(|raw| decode_bcd_timestamp(&raw));
    let mut details = [0u8; 7];
    details.copy_from_slice(&LOG_ENTRY.get_raw(body, "details")?);
    let description: String = body[LOG_DESCRIPTION_OFFSET..record_len]
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string();
    let log_type = get_int("logType")? as u8;

    Some(LogRecord {
        timestamp,
        sequence: get_int("sequence")? as u8,
        log_type,
        category: log_category(log_type),
        event_id: get_int("eventId")? as u16,
        class_id: get_int("classId")? as u8,
        sub_id: get_int("subId")? as u8,
        entity_id: get_int("entityId")? as u16,
        area: get_int("area")? as u8,
        details,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_body(sequence: u8, record_len: usize, description: &str) -> Vec<u8> {
        let mut body = vec![0u8; record_len];
        body[0] = 0x0D;
        // Timestamp 2025-07-14 09:30:59 in BCD
        body[6..12].copy_from_slice(&[0x25, 0x07, 0x14, 0x09, 0x30, 0x59]);
        body[12] = sequence;
        body[13] = 0x02; // Arm
        body[14..16].copy_from_slice(&0x0142u16.to_le_bytes());
        body[16] = 7; // class
        body[17] = 1; // sub
        body[18..20].copy_from_slice(&5u16.to_le_bytes());
        body[20] = 2; // area
        body[21..28].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        let desc = description.as_bytes();
        body[LOG_DESCRIPTION_OFFSET..LOG_DESCRIPTION_OFFSET + desc.len()]
            .copy_from_slice(desc);
        body
    }

    #[test]
    fn test_parse_log_record_60() {
        let body = record_body(9, 60, "Area 2 set by user");
        let record = parse_log_record(&body, 60).unwrap();
        assert_eq!(record.sequence, 9);
        assert_eq!(record.log_type, 0x02);
        assert_eq!(record.category, "Arm");
        assert_eq!(record.event_id, 0x0142);
        assert_eq!(record.class_id, 7);
        assert_eq!(record.sub_id, 1);
        assert_eq!(record.entity_id, 5);
        assert_eq!(record.area, 2);
        assert_eq!(record.details, [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(record.description, "Area 2 set by user");
        assert_eq!(
            record.timestamp.unwrap().to_string(),
            "2025-07-14 09:30:59"
        );
    }

    #[test]
    fn test_parse_log_record_70_wider_description() {
        let long = "A description that only fits the forty-two";
        assert!(long.len() <= 42);
        let body = record_body(1, 70, long);
        let record = parse_log_record(&body, 70).unwrap();
        assert_eq!(record.description, long);
    }

    #[test]
    fn test_parse_log_record_rejects_wrong_id() {
        let mut body = record_body(1, 60, "x");
        body[0] = 0x0C;
        assert!(parse_log_record(&body, 60).is_none());
    }

    #[test]
    fn test_parse_log_record_rejects_short_body() {
        let body = record_body(1, 60, "x");
        assert!(parse_log_record(&body[..40], 60).is_none());
    }

    #[test]
    fn test_parse_log_record_bad_timestamp_is_none_field() {
        let mut body = record_body(1, 60, "x");
        body[7] = 0x45; // month 45
        let record = parse_log_record(&body, 60).unwrap();
        assert!(record.timestamp.is_none());
    }
}
