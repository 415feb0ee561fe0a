// MIT License - Copyright (c) 2026 Peter Wright

//! Bulk request/response handling.
//!
//! Several status queries can travel in one frame: the batch request
//! carries each inner request with its header byte stripped, prefixed by
//! the fixed embedded length and separated by that same length byte. The
//! reply interleaves fixed-size embedded responses the same way, with the
//! type indicator doubling as separator.

use crate::constants::HDR_RESPONSE;
use crate::error::{AceError, Result};
use crate::templates::{identify_embedded, BATCH, OBJECT_ID_OFFSET};

/// Fixed embedded size of a status query inside a batch request.
pub const EMBEDDED_STATUS_LEN: u8 = 6;
/// Fixed embedded size of a zones-assigned-to-areas query.
pub const EMBEDDED_ZONE_AREA_LEN: u8 = 12;

/// Build a batch request from fully constructed inner requests.
///
/// Each inner request still carries its header byte; it is stripped here.
/// All embedded requests in one batch must share the same fixed length.
pub fn build_batch(requests: &[Vec<u8>], embedded_len: u8) -> Result<Vec<u8>> {
    let mut out = BATCH.construct(&[]);
    out.push(embedded_len);
    for (i, request) in requests.iter().enumerate() {
        let body = request
            .get(1..)
            .filter(|b| b.len() == embedded_len as usize)
            .ok_or_else(|| AceError::Protocol {
                details: format!(
                    "embedded request {} is {} bytes, expected {}",
                    i,
                    request.len().saturating_sub(1),
                    embedded_len
                ),
            })?;
        if i > 0 {
            out.push(embedded_len);
        }
        out.extend_from_slice(body);
    }
    Ok(out)
}

/// Split a batch reply into its embedded responses.
///
/// `frame` is the decrypted plaintext including the header byte. A reply
/// without the `EE EE` batch marker is a plain single response and is
/// passed through as a one-element list (header stripped, like the
/// embedded responses).
pub fn split_batch(frame: &[u8]) -> Result<Vec<Vec<u8>>> {
    if frame.len() < 2 {
        return Err(AceError::Protocol {
            details: "batch reply too short".to_string(),
        });
    }
    if frame.len() < 4 || frame[0] != HDR_RESPONSE || frame[1] != 0xEE || frame[2] != 0xEE {
        return Ok(vec![frame[1..].to_vec()]);
    }

    let type_indicator = frame[3];
    let template = identify_embedded(frame, 4).ok_or_else(|| AceError::Protocol {
        details: "unknown embedded response type in batch".to_string(),
    })?;
    let len = template.response_len.ok_or_else(|| AceError::Protocol {
        details: format!("{} has no registered response length", template.name),
    })?;

    let mut out = Vec::new();
    let mut pos = 4;
    loop {
        let chunk = frame.get(pos..pos + len).ok_or_else(|| AceError::Protocol {
            details: format!("truncated embedded response at offset {}", pos),
        })?;
        if !template.matches_at(frame, pos) {
            return Err(AceError::Protocol {
                details: format!("embedded response type changed at offset {}", pos),
            });
        }
        out.push(chunk.to_vec());
        pos += len;
        match frame.get(pos) {
            Some(&sep) if sep == type_indicator => pos += 1,
            // Buffer exhausted or separator missing: the batch is complete
            _ => break,
        }
    }
    Ok(out)
}

/// The entity id an embedded status response applies to.
pub fn object_id(embedded: &[u8]) -> Option<u8> {
    embedded.get(OBJECT_ID_OFFSET).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;
    use crate::templates::{GET_STATUS, GET_ZONES_ASSIGNED, TYPE_ZONE};

    fn status_request(id: u64) -> Vec<u8> {
        GET_STATUS.construct(&[
            ("kind", Value::Int(TYPE_ZONE as u64)),
            ("objectId", Value::Int(id)),
        ])
    }

    #[test]
    fn test_build_batch_layout() {
        let batch = build_batch(&[status_request(1), status_request(2)], EMBEDDED_STATUS_LEN)
            .unwrap();
        // Header + batch id, then len byte, 6 bytes, separator, 6 bytes
        assert_eq!(batch[..5], [0xC0, 0xEE, 0xE0, 0xEE, 0xEE]);
        assert_eq!(batch[5], 6);
        assert_eq!(&batch[6..12], &[0x31, 0x01, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(batch[12], 6);
        assert_eq!(&batch[13..19], &[0x31, 0x01, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(batch.len(), 19);
    }

    #[test]
    fn test_build_batch_zone_area_len() {
        let req = GET_ZONES_ASSIGNED.construct(&[("area", Value::Int(1))]);
        let batch = build_batch(&[req], EMBEDDED_ZONE_AREA_LEN).unwrap();
        assert_eq!(batch[5], 12);
        assert_eq!(batch.len(), 5 + 1 + 12);
    }

    #[test]
    fn test_build_batch_rejects_wrong_size() {
        let req = GET_ZONES_ASSIGNED.construct(&[("area", Value::Int(1))]);
        assert!(build_batch(&[req], EMBEDDED_STATUS_LEN).is_err());
    }

    #[test]
    fn test_split_two_zone_statuses() {
        // The documented wire example: two zone statuses for objects 5 and 6
        let frame = [
            0xA0, 0xEE, 0xEE, 0x07, //
            0x31, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00, //
            0x07, //
            0x31, 0x01, 0x00, 0x06, 0x00, 0x00, 0x00,
        ];
        let parts = split_batch(&frame).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 7);
        assert_eq!(parts[1].len(), 7);
        assert_eq!(object_id(&parts[0]), Some(5));
        assert_eq!(object_id(&parts[1]), Some(6));
    }

    #[test]
    fn test_split_single_response_passthrough() {
        let frame = [0xA0, 0x31, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00];
        let parts = split_batch(&frame).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], &frame[1..]);
    }

    #[test]
    fn test_split_many_same_type() {
        let mut frame = vec![0xA0, 0xEE, 0xEE, 0x05];
        for id in 1..=8u8 {
            if id > 1 {
                frame.push(0x05);
            }
            frame.extend_from_slice(&[0x31, 0x07, 0x00, id, 0x01]);
        }
        let parts = split_batch(&frame).unwrap();
        assert_eq!(parts.len(), 8);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.len(), 5);
            assert_eq!(object_id(part), Some(i as u8 + 1));
        }
    }

    #[test]
    fn test_split_truncated_embedded_fails() {
        let frame = [0xA0, 0xEE, 0xEE, 0x07, 0x31, 0x01, 0x00];
        assert!(split_batch(&frame).is_err());
    }

    #[test]
    fn test_split_unknown_type_fails() {
        let frame = [0xA0, 0xEE, 0xEE, 0x07, 0x99, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00];
        assert!(split_batch(&frame).is_err());
    }

    #[test]
    fn test_split_stops_without_separator() {
        // Trailing garbage that is not the separator ends the batch
        let frame = [
            0xA0, 0xEE, 0xEE, 0x07, //
            0x31, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00, //
            0x42,
        ];
        let parts = split_batch(&frame).unwrap();
        assert_eq!(parts.len(), 1);
    }
}
