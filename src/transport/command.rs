// MIT License - Copyright (c) 2026 Peter Wright

//! The request/response engine shared by one connection.
//!
//! Exactly one request is in flight at a time: a FIFO mutex chains
//! callers, and a single pending-response slot holds the current waiter.
//! Responses that arrive while nobody waits are queued and handed to the
//! next waiter in order, so a response can never be lost between a send
//! and the registration that follows it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{append_crc, slip_decode, slip_encode, verify_crc};
use crate::constants::HDR_ERROR;
use crate::crypto::AceCrypt;
use crate::error::{AceError, Result};
use crate::templates::PING;

/// The single pending-response slot plus the early-response queue.
#[derive(Default)]
struct PendingState {
    waiter: Option<oneshot::Sender<Vec<u8>>>,
    queue: VecDeque<Vec<u8>>,
}

pub struct CommandEngine {
    /// Serialization lock: a new request cannot start sending until the
    /// previous one has fully resolved. tokio's Mutex queues fairly, so
    /// ordering across callers is FIFO.
    cmd_lock: Mutex<()>,
    pending: Mutex<PendingState>,
    writer: Mutex<OwnedWriteHalf>,
    crypt: RwLock<Option<AceCrypt>>,
    connected: RwLock<bool>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl CommandEngine {
    pub fn new(writer: OwnedWriteHalf, call_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            cmd_lock: Mutex::new(()),
            pending: Mutex::new(PendingState::default()),
            writer: Mutex::new(writer),
            crypt: RwLock::new(None),
            connected: RwLock::new(true),
            call_timeout,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    pub async fn set_connected(&self, connected: bool) {
        *self.connected.write().await = connected;
    }

    /// Install (or clear) the record crypto. Installing the session key
    /// switches every subsequent frame to encrypted operation.
    pub async fn set_crypt(&self, crypt: Option<AceCrypt>) {
        *self.crypt.write().await = crypt;
    }

    pub async fn has_crypt(&self) -> bool {
        self.crypt.read().await.is_some()
    }

    /// Decrypt a raw frame with the active key, if any. `None` either
    /// means no key is installed or the frame did not decrypt cleanly.
    pub async fn try_decrypt(&self, frame: &[u8]) -> Option<Vec<u8>> {
        self.crypt.read().await.as_ref()?.decrypt_message(frame)
    }

    /// Hand a classified response to the waiter, or queue it.
    pub async fn deliver_response(&self, response: Vec<u8>) {
        let mut pending = self.pending.lock().await;
        if let Some(waiter) = pending.waiter.take() {
            match waiter.send(response) {
                Ok(()) => return,
                // Waiter already timed out; keep the response for the next one
                Err(response) => {
                    debug!("Waiter gone, queueing response");
                    pending.queue.push_back(response);
                    return;
                }
            }
        }
        debug!("Queueing response with no waiter");
        pending.queue.push_back(response);
    }

    /// Register as the pending waiter, draining the queue head first.
    async fn register_waiter(&self) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        if let Some(queued) = pending.queue.pop_front() {
            let _ = tx.send(queued);
        } else {
            pending.waiter = Some(tx);
        }
        rx
    }

    async fn clear_waiter(&self) {
        self.pending.lock().await.waiter = None;
    }

    async fn send_wire(&self, wire: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(wire).await.map_err(AceError::Io)
    }

    async fn await_response(&self, op: &str, rx: oneshot::Receiver<Vec<u8>>) -> Result<Vec<u8>> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.clear_waiter().await;
                Err(AceError::Aborted)
            }
            outcome = timeout(self.call_timeout, rx) => match outcome {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(AceError::ChannelClosed),
                Err(_) => {
                    self.clear_waiter().await;
                    debug!("{} timed out after {:?}", op, self.call_timeout);
                    Err(AceError::CommandTimeout {
                        op: op.to_string(),
                        timeout_ms: self.call_timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    fn check_ready(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AceError::Aborted);
        }
        Ok(())
    }

    /// Send an unencrypted message and await the raw reply. Only used
    /// before the session is keyed (device info).
    pub async fn call_plain(
        &self,
        op: &str,
        payload: &[u8],
        throw_on_error: bool,
    ) -> Result<Vec<u8>> {
        let _guard = self.cmd_lock.lock().await;
        self.check_ready()?;
        if !self.is_connected().await {
            return Err(AceError::Disconnected);
        }

        debug!("Sending {} (plain)", op);
        let rx = self.register_waiter().await;
        self.send_wire(&slip_encode(&append_crc(payload))).await?;
        let frame = self.await_response(op, rx).await?;

        let decoded = slip_decode(&frame);
        if !verify_crc(&decoded) {
            return Err(AceError::InvalidFrame {
                reason: format!("CRC check failed on {} reply", op),
            });
        }
        let plaintext = decoded[..decoded.len() - 2].to_vec();
        if plaintext.is_empty() {
            return Err(AceError::InvalidFrame {
                reason: format!("empty {} reply", op),
            });
        }
        if throw_on_error && plaintext.first() == Some(&HDR_ERROR) {
            return Err(AceError::panel(&plaintext));
        }
        Ok(plaintext)
    }

    /// Send an encrypted message and await the decrypted reply.
    ///
    /// The reader task has already decrypted and classified the frame; an
    /// error-headed reply is raised as a panel error unless the caller
    /// opted out.
    pub async fn call_encrypted(
        &self,
        op: &str,
        payload: &[u8],
        throw_on_error: bool,
    ) -> Result<Vec<u8>> {
        let _guard = self.cmd_lock.lock().await;
        self.check_ready()?;
        if !self.is_connected().await {
            return Err(AceError::Disconnected);
        }

        let record = {
            let crypt = self.crypt.read().await;
            let crypt = crypt.as_ref().ok_or_else(|| AceError::Protocol {
                details: format!("{} requires an encrypted session", op),
            })?;
            crypt.encrypt_message(payload)
        };

        debug!("Sending {}", op);
        let rx = self.register_waiter().await;
        self.send_wire(&slip_encode(&record)).await?;
        let plaintext = self.await_response(op, rx).await?;

        if throw_on_error && plaintext.first() == Some(&HDR_ERROR) {
            return Err(AceError::panel(&plaintext));
        }
        Ok(plaintext)
    }

    /// Encrypt and send without waiting for any reply (COS acks, the
    /// best-effort logout on disconnect).
    pub async fn send_fire_and_forget(&self, op: &str, payload: &[u8]) -> Result<()> {
        let record = {
            let crypt = self.crypt.read().await;
            let crypt = crypt.as_ref().ok_or_else(|| AceError::Protocol {
                details: format!("{} requires an encrypted session", op),
            })?;
            crypt.encrypt_message(payload)
        };
        debug!("Sending {} (no reply expected)", op);
        self.send_wire(&slip_encode(&record)).await
    }

    /// Start the keep-alive pinger. Failures are logged and the
    /// connection is left alone: the next real command surfaces them.
    pub fn start_keep_alive(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if engine.cancel.is_cancelled() || !engine.is_connected().await {
                    break;
                }
                let ping = PING.construct(&[]);
                if let Err(e) = engine.call_encrypted("ping", &ping, true).await {
                    warn!("Keep-alive ping failed: {}", e);
                }
            }
            debug!("Keep-alive stopped");
        })
    }

    /// Close down the write side: mark disconnected and shut the socket.
    pub async fn shutdown(&self) {
        self.set_connected(false).await;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn engine_pair(timeout_ms: u64) -> (Arc<CommandEngine>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_read_half, write_half) = client.into_split();
        let engine = Arc::new(CommandEngine::new(
            write_half,
            Duration::from_millis(timeout_ms),
            CancellationToken::new(),
        ));
        (engine, server)
    }

    #[tokio::test]
    async fn test_queued_responses_drained_in_order() {
        let (engine, _server) = engine_pair(100).await;
        engine.deliver_response(vec![0xA0, 0x01]).await;
        engine.deliver_response(vec![0xA0, 0x02]).await;

        let rx = engine.register_waiter().await;
        assert_eq!(rx.await.unwrap(), vec![0xA0, 0x01]);
        let rx = engine.register_waiter().await;
        assert_eq!(rx.await.unwrap(), vec![0xA0, 0x02]);
    }

    #[tokio::test]
    async fn test_waiter_receives_direct_delivery() {
        let (engine, _server) = engine_pair(100).await;
        let rx = engine.register_waiter().await;
        engine.deliver_response(vec![0xA0, 0x07]).await;
        assert_eq!(rx.await.unwrap(), vec![0xA0, 0x07]);
    }

    #[tokio::test]
    async fn test_call_plain_roundtrip() {
        let (engine, mut server) = engine_pair(1000).await;

        // Stub panel: consume the request, then deliver a valid reply
        let engine2 = engine.clone();
        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(buf[0], 0xC0);
            assert_eq!(buf[n - 1], 0xC0);
            let reply = slip_encode(&append_crc(&[0xA0, 0x01, 0x00]));
            engine2.deliver_response(reply).await;
        });

        let reply = engine
            .call_plain("getDeviceInfo", &[0xC0, 0x01], true)
            .await
            .unwrap();
        assert_eq!(reply, vec![0xA0, 0x01, 0x00]);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_plain_raises_panel_error() {
        let (engine, mut server) = engine_pair(1000).await;
        let engine2 = engine.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = server.read(&mut buf).await.unwrap();
            let reply = slip_encode(&append_crc(&[0xF0, 0x02]));
            engine2.deliver_response(reply).await;
        });

        let err = engine
            .call_plain("getDeviceInfo", &[0xC0, 0x01], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AceError::Panel { .. }));
    }

    #[tokio::test]
    async fn test_call_timeout_clears_waiter() {
        let (engine, mut server) = engine_pair(50).await;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = server.read(&mut buf).await;
            // Never answer
        });

        let err = engine
            .call_plain("getDeviceInfo", &[0xC0, 0x01], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AceError::CommandTimeout { .. }));
        // The slot is free again: a late response queues and reaches the
        // next waiter instead of a dead one
        engine.deliver_response(vec![0xA0, 0x01]).await;
        let rx = engine.register_waiter().await;
        assert_eq!(rx.await.unwrap(), vec![0xA0, 0x01]);
    }

    #[tokio::test]
    async fn test_call_encrypted_requires_key() {
        let (engine, _server) = engine_pair(100).await;
        let err = engine
            .call_encrypted("ping", &[0xC0, 0x06], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AceError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_engine_aborts_calls() {
        let (engine, _server) = engine_pair(5000).await;
        engine.cancel_token().cancel();
        let err = engine
            .call_plain("getDeviceInfo", &[0xC0, 0x01], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AceError::Aborted));
    }
}
