// MIT License - Copyright (c) 2026 Peter Wright

//! Direct TCP transport and the session handshake.
//!
//! Connect sequence: TCP connect → plain `getDeviceInfo` → derive the
//! initial key from the password → `createSession` key exchange →
//! `enableEncryptionKey` → switch to the session key → login (PIN or
//! account) → keep-alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::make_encryption_key;
use crate::config::{AuthMethod, PanelConfig};
use crate::constants::{COS_MARKER, HDR_ERROR, HDR_REQUEST, HDR_RESPONSE, SLIP_END};
use crate::crypto::AceCrypt;
use crate::error::{AceError, Result};
use crate::event::{EventSender, PanelEvent};
use crate::message::{Property, Value};
use crate::state::PanelDescriptor;
use crate::templates::{
    CREATE_SESSION, CREATE_SESSION_RESPONSE, DEVICE_INFO, DEVICE_INFO_RESPONSE, ENABLE_ENCRYPTION,
    GET_USER_INFO, LOGIN_ACCOUNT, LOGIN_PIN, LOGIN_RESPONSE, LOGOUT, USER_INFO_RESPONSE,
};
use crate::transport::command::CommandEngine;

/// An unsolicited change-of-state frame, decrypted, header included.
pub type CosFrame = Vec<u8>;

/// Direct TCP transport: owns the socket halves, the reader task and the
/// keep-alive, and performs the handshake on connect.
pub struct DirectTransport {
    engine: Arc<CommandEngine>,
    descriptor: PanelDescriptor,
    user_name: Option<String>,
    cancel: CancellationToken,
    reader_handle: Option<tokio::task::JoinHandle<()>>,
    keep_alive_handle: Option<tokio::task::JoinHandle<()>>,
    cos_rx: Option<mpsc::Receiver<CosFrame>>,
}

impl DirectTransport {
    /// Connect, handshake and log in.
    pub async fn connect(config: &PanelConfig, event_tx: EventSender) -> Result<Self> {
        info!("Connecting to panel at {}:{}", config.host, config.port);

        let stream = tokio::time::timeout(
            Duration::from_secs(10),
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| AceError::ConnectionTimeout)?
        .map_err(AceError::Io)?;

        let (reader, writer) = stream.into_split();
        let cancel = CancellationToken::new();
        let engine = Arc::new(CommandEngine::new(
            writer,
            Duration::from_millis(config.call_timeout_ms),
            cancel.clone(),
        ));

        // One slot: while a COS handler is busy, further notifications are
        // dropped and subsumed by its refresh.
        let (cos_tx, cos_rx) = mpsc::channel(1);
        let reader_handle = spawn_reader_task(reader, engine.clone(), cos_tx, event_tx.clone());

        // Plain device info first: everything about the panel (serial,
        // model limits, name format) hangs off this reply.
        let reply = engine
            .call_plain("getDeviceInfo", &DEVICE_INFO.construct(&[]), true)
            .await?;
        let descriptor = parse_device_info(&reply[1..])?;
        info!(
            "Panel {} ({}, firmware {}, protocol {:?})",
            descriptor.model, descriptor.product, descriptor.firmware, descriptor.protocol
        );

        let mut transport = Self {
            engine: engine.clone(),
            descriptor: descriptor.clone(),
            user_name: None,
            cancel,
            reader_handle: Some(reader_handle),
            keep_alive_handle: None,
            cos_rx: Some(cos_rx),
        };

        // Key exchange under the password-derived initial key
        let initial_key = make_encryption_key(&config.encryption_key);
        if initial_key.iter().all(|&b| b == 0) {
            warn!("Encryption password shorter than 24 characters, using the null key");
        }
        engine
            .set_crypt(Some(AceCrypt::new(initial_key, descriptor.serial)))
            .await;

        let reply = engine
            .call_encrypted("createSession", &CREATE_SESSION.construct(&[]), true)
            .await?;
        let panel_half = CREATE_SESSION_RESPONSE
            .get_raw(&reply[1..], "panelKey")
            .ok_or_else(|| AceError::KeyExchangeFailed {
                details: "createSession reply too short".to_string(),
            })?;

        // Session key: 8 client bytes (zero by design) then the panel's 8
        let mut session_key = vec![0u8; 8];
        session_key.extend_from_slice(&panel_half);

        // The enable call itself still runs under the initial key; only
        // traffic after its response uses the session key
        engine
            .call_encrypted("enableEncryptionKey", &ENABLE_ENCRYPTION.construct(&[]), true)
            .await?;
        engine
            .set_crypt(Some(AceCrypt::new(session_key, descriptor.serial)))
            .await;
        debug!("Session key established");

        transport.login(config).await?;

        transport.keep_alive_handle = Some(
            engine.start_keep_alive(Duration::from_millis(config.keep_alive_interval_ms)),
        );

        let _ = event_tx.send(PanelEvent::Connected);
        info!("Panel session established");
        Ok(transport)
    }

    async fn login(&mut self, config: &PanelConfig) -> Result<()> {
        let permissions = config.permissions.bits() as u64;
        let (op, request) = match &config.auth {
            AuthMethod::Pin(pin) => (
                "login",
                LOGIN_PIN.construct(&[
                    ("permissions", Value::Int(permissions)),
                    ("pin", Value::Str(pin)),
                ]),
            ),
            AuthMethod::Account { username, password } => (
                "loginAccount",
                LOGIN_ACCOUNT.construct(&[
                    ("permissions", Value::Int(permissions)),
                    ("username", Value::Str(username)),
                    ("password", Value::Str(password)),
                ]),
            ),
        };

        let reply = self.engine.call_encrypted(op, &request, true).await?;
        let body = &reply[1..];
        let status = match LOGIN_RESPONSE.get(body, "status") {
            Some(Property::Int(v)) if LOGIN_RESPONSE.matches(body) => v as u8,
            _ => 0xFF,
        };
        if status != 0 {
            return Err(AceError::LoginRejected { status });
        }
        debug!("Login accepted");

        // Account sessions additionally activate their permissions with a
        // user-info query; the name only serves diagnostics
        if matches!(config.auth, AuthMethod::Account { .. }) {
            let reply = self
                .engine
                .call_encrypted("getUserInfo", &GET_USER_INFO.construct(&[]), true)
                .await?;
            if let Some(Property::Str(name)) = USER_INFO_RESPONSE.get(&reply[1..], "userName") {
                info!("Logged in as {}", name);
                self.user_name = Some(name);
            }
        }
        Ok(())
    }

    pub fn engine(&self) -> &Arc<CommandEngine> {
        &self.engine
    }

    pub fn descriptor(&self) -> &PanelDescriptor {
        &self.descriptor
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Hand out the COS mailbox; the monitor loop drains it.
    pub fn take_cos_receiver(&mut self) -> Option<mpsc::Receiver<CosFrame>> {
        self.cos_rx.take()
    }

    /// Tear the connection down: stop the background tasks, attempt a
    /// best-effort logout, close the socket and drop the session key.
    pub async fn disconnect(&mut self, event_tx: &EventSender) {
        info!("Disconnecting from panel");
        self.cancel.cancel();
        if let Err(e) = self
            .engine
            .send_fire_and_forget("logout", &LOGOUT.construct(&[]))
            .await
        {
            debug!("Best-effort logout failed: {}", e);
        }
        self.engine.shutdown().await;
        self.engine.set_crypt(None).await;
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.keep_alive_handle.take() {
            handle.abort();
        }
        let _ = event_tx.send(PanelEvent::Disconnected);
    }
}

impl Drop for DirectTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.keep_alive_handle.take() {
            handle.abort();
        }
    }
}

/// Build the descriptor from a device-info body (header stripped).
fn parse_device_info(body: &[u8]) -> Result<PanelDescriptor> {
    if !DEVICE_INFO_RESPONSE.matches(body) {
        return Err(AceError::Protocol {
            details: "unexpected reply to getDeviceInfo".to_string(),
        });
    }
    let field_str = |name: &str| {
        DEVICE_INFO_RESPONSE
            .get_raw(body, name)
            .map(|raw| fixed_str(&raw))
            .unwrap_or_default()
    };
    let encryption_mode = DEVICE_INFO_RESPONSE
        .get(body, "encryptionMode")
        .map(|p| p.as_int() as u8)
        .unwrap_or(0);
    Ok(PanelDescriptor::new(
        field_str("product"),
        field_str("firmware"),
        field_str("serial"),
        encryption_mode,
    ))
}

/// Decode a fixed-length ASCII field: strip NULs, trim whitespace.
fn fixed_str(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Spawn the reader task: frame extraction, decryption and classification.
fn spawn_reader_task(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    engine: Arc<CommandEngine>,
    cos_tx: mpsc::Sender<CosFrame>,
    event_tx: EventSender,
) -> tokio::task::JoinHandle<()> {
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut pending = Vec::new();

        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("Reader: connection closed by panel");
                        engine.set_connected(false).await;
                        let _ = event_tx.send(PanelEvent::Disconnected);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Reader: read error: {}", e);
                        engine.set_connected(false).await;
                        let _ = event_tx.send(PanelEvent::Disconnected);
                        break;
                    }
                },
            };

            pending.extend_from_slice(&buf[..n]);
            for frame in extract_frames(&mut pending) {
                process_frame(frame, &engine, &cos_tx).await;
            }
        }
    })
}

/// Pull complete frames out of the rolling buffer. A frame runs from one
/// END byte to the next, both included; bytes outside any frame are
/// dropped, an unterminated tail is kept for the next read.
fn extract_frames(pending: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        let Some(start_rel) = pending[pos..].iter().position(|&b| b == SLIP_END) else {
            // No frame start at all: everything so far is garbage
            pending.clear();
            return frames;
        };
        let start = pos + start_rel;
        let Some(end_rel) = pending[start + 1..].iter().position(|&b| b == SLIP_END) else {
            // Unterminated frame: keep from its start
            pending.drain(..start);
            return frames;
        };
        let end = start + 1 + end_rel;
        if end > start + 1 {
            frames.push(pending[start..=end].to_vec());
        }
        // The closing END may double as the next frame's opener
        pos = end;
    }
}

/// Classify one extracted frame.
///
/// With a key installed the frame is decrypted first: a request-headed
/// plaintext is panel-originated (change-of-state) and goes to the COS
/// mailbox, response and error headers go to the pending waiter, and
/// anything that fails to decrypt is discarded without poisoning the
/// stream. Before the key exists, raw frames go straight to the waiter.
async fn process_frame(
    frame: Vec<u8>,
    engine: &Arc<CommandEngine>,
    cos_tx: &mpsc::Sender<CosFrame>,
) {
    if !engine.has_crypt().await {
        engine.deliver_response(frame).await;
        return;
    }

    let Some(plaintext) = engine.try_decrypt(&frame).await else {
        debug!("Discarding undecryptable frame ({} bytes)", frame.len());
        return;
    };

    match plaintext.first() {
        Some(&HDR_REQUEST) => {
            if plaintext.get(1) == Some(&COS_MARKER) {
                if cos_tx.try_send(plaintext).is_err() {
                    // A handler is already in flight; its refresh subsumes
                    // this notification
                    debug!("COS handler busy, dropping notification");
                }
            } else {
                debug!("Ignoring unsolicited frame without COS marker");
            }
        }
        Some(&HDR_RESPONSE) | Some(&HDR_ERROR) => {
            engine.deliver_response(plaintext).await;
        }
        _ => debug!("Discarding frame with unknown header"),
    }
}
