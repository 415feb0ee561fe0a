// MIT License - Copyright (c) 2026 Peter Wright

//! Wire-protocol scenarios exercised across layers: framing, CRC, key
//! derivation, record crypto, templates and the batch container.

use ats_ace_client::batch::{build_batch, object_id, split_batch, EMBEDDED_STATUS_LEN};
use ats_ace_client::codec::{
    append_crc, crc16, decode_serial, make_encryption_key, protocol_version, slip_decode,
    slip_encode, verify_crc,
};
use ats_ace_client::config::ArmType;
use ats_ace_client::crypto::{aes_ctr, AceCrypt};
use ats_ace_client::message::{Property, Value};
use ats_ace_client::templates::{
    GET_STATUS, SESSION_STATUS_RESPONSE, TYPE_OUTPUT, TYPE_ZONE,
};

const SERIAL: [u8; 6] = [0x20, 0x82, 0x08, 0x20, 0x82, 0x08];

#[test]
fn crc_empty_input_is_initial_value() {
    assert_eq!(crc16(&[]), 0xFFFF);
}

#[test]
fn crc_append_then_verify_holds_and_bit_flips_fail() {
    let payload = [0xC0, 0x01, 0x00, 0x05, 0x00, 0x05];
    let framed = append_crc(&payload);
    assert!(verify_crc(&framed));
    for i in 0..framed.len() {
        let mut corrupted = framed.clone();
        corrupted[i] ^= 0x40;
        assert!(!verify_crc(&corrupted));
    }
}

#[test]
fn slip_escapes_delimiters() {
    assert_eq!(
        slip_encode(&[0xC0, 0xDB, 0x00]),
        vec![0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0x00, 0xC0]
    );
}

#[test]
fn slip_roundtrip_every_byte_value() {
    let all: Vec<u8> = (0u8..=255).collect();
    assert_eq!(slip_decode(&slip_encode(&all)), all);
}

#[test]
fn key_derivation_of_uniform_password() {
    // Twelve 'A's then twelve 'B's: each block contributes one pair of
    // packed values repeated four times
    let key = make_encryption_key("AAAAAAAAAAAABBBBBBBBBBBB");
    assert_eq!(key.len(), 16);
    for i in (0..8).step_by(2) {
        assert_eq!(key[i], key[0]);
        assert_eq!(key[i + 1], key[1]);
    }
    for i in (8..16).step_by(2) {
        assert_eq!(key[i], key[8]);
        assert_eq!(key[i + 1], key[9]);
    }
    // Prefix property: the first password blocks fix the first key bytes
    let longer = make_encryption_key(&("AAAAAAAAAAAABBBBBBBBBBBB".to_string() + "CCCCCCCCCCCC"));
    assert_eq!(longer.len(), 24);
    assert_eq!(&longer[..16], &key[..]);
}

#[test]
fn key_derivation_output_sizes() {
    assert_eq!(make_encryption_key(&"x".repeat(24)).len(), 16);
    assert_eq!(make_encryption_key(&"x".repeat(36)).len(), 24);
    assert_eq!(make_encryption_key(&"x".repeat(48)).len(), 32);
}

#[test]
fn serial_decode_is_xor_of_halves() {
    let serial = decode_serial("ABCDEFGHIJKLMNOP").unwrap();
    // Base64 payload: 00 10 83 10 51 87 ‖ 20 92 8b 30 d3 8f
    assert_eq!(serial, SERIAL);
}

#[test]
fn protocol_version_encoding() {
    assert_eq!(protocol_version("MR_4.1.38741"), Some(4001));
    assert_eq!(protocol_version("MR_22.3.0"), Some(22));
    assert_eq!(protocol_version("GARBAGE"), None);
}

#[test]
fn aes_ctr_involution_across_key_sizes() {
    let nonce = [9u8; 8];
    let data: Vec<u8> = (0u8..64).collect();
    for len in [16usize, 24, 32] {
        let key = vec![0x5Au8; len];
        let once = aes_ctr(&data, &key, &nonce, &SERIAL).unwrap();
        let twice = aes_ctr(&once, &key, &nonce, &SERIAL).unwrap();
        assert_eq!(twice, data);
    }
}

#[test]
fn record_roundtrip_through_slip() {
    let crypt = AceCrypt::new(make_encryption_key("AAAAAAAAAAAABBBBBBBBBBBB"), SERIAL);
    let request = GET_STATUS.construct(&[
        ("kind", Value::Int(TYPE_ZONE as u64)),
        ("objectId", Value::Int(5)),
    ]);
    let wire = slip_encode(&crypt.encrypt_message(&request));
    assert_eq!(crypt.decrypt_message(&wire), Some(request));
}

#[test]
fn control_session_state_table() {
    // The stateId contract: high byte by set type, low byte by condition
    assert_eq!(ArmType::Full.state_id(0x04), 0x0504);
    assert_eq!(ArmType::Full.state_id(0x05), 0x0505);
    assert_eq!(ArmType::Full.state_id(0x01), 0x0501);
    assert_eq!(ArmType::Full.state_id(0x02), 0x0502);
    assert_eq!(ArmType::Full.state_id(0x03), 0x0503);
    assert_eq!(ArmType::Part1.state_id(0x04), 0x0404);
    assert_eq!(ArmType::Part2.state_id(0x04), 0x1004);

    // The wire carries the stateId big-endian after the echoed command id
    assert_eq!(
        SESSION_STATUS_RESPONSE.get(&[0x46, 0x05, 0x04], "stateId"),
        Some(Property::Int(0x0504))
    );
    assert_eq!(
        SESSION_STATUS_RESPONSE.get(&[0x46, 0x04, 0x02], "stateId"),
        Some(Property::Int(0x0402))
    );
}

#[test]
fn batch_split_documented_example() {
    let frame = [
        0xA0, 0xEE, 0xEE, 0x07, //
        0x31, 0x01, 0x00, 0x05, 0x04, 0x00, 0x00, //
        0x07, //
        0x31, 0x01, 0x00, 0x06, 0x00, 0x00, 0x00,
    ];
    let parts = split_batch(&frame).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(object_id(&parts[0]), Some(5));
    assert_eq!(object_id(&parts[1]), Some(6));
}

#[test]
fn batch_split_n_messages_of_registered_length() {
    // Build a well-formed batch of N output statuses and split it back
    for n in [1usize, 3, 8, 16] {
        let mut frame = vec![0xA0, 0xEE, 0xEE, 0x05];
        for id in 1..=n as u8 {
            if id > 1 {
                frame.push(0x05);
            }
            frame.extend_from_slice(&[0x31, TYPE_OUTPUT, 0x00, id, 0x00]);
        }
        let parts = split_batch(&frame).unwrap();
        assert_eq!(parts.len(), n);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.len(), 5);
            assert_eq!(object_id(part), Some(i as u8 + 1));
        }
    }
}

#[test]
fn batch_request_roundtrip_shape() {
    let requests: Vec<Vec<u8>> = (1..=4)
        .map(|id| {
            GET_STATUS.construct(&[
                ("kind", Value::Int(TYPE_ZONE as u64)),
                ("objectId", Value::Int(id)),
            ])
        })
        .collect();
    let batch = build_batch(&requests, EMBEDDED_STATUS_LEN).unwrap();
    // Batch id, length byte, then 4 embedded requests with 3 separators
    assert_eq!(&batch[1..5], &[0xEE, 0xE0, 0xEE, 0xEE]);
    assert_eq!(batch.len(), 5 + 1 + 4 * 6 + 3);
    // Separators equal the length byte
    assert_eq!(batch[5], 6);
    assert_eq!(batch[12], 6);
}
