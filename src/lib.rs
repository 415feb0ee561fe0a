// MIT License - Copyright (c) 2026 Peter Wright

//! # ats-ace-client
//!
//! Direct TCP/IP communication with ATS alarm control panels speaking the
//! ACE 2 (v6) protocol (Advisor Advanced family, including the extended
//! x700 panels).
//!
//! The client authenticates to a panel, opens an AES-encrypted session,
//! queries configuration and state (areas, zones, outputs, triggers,
//! doors), issues supervised control operations and turns unsolicited
//! change-of-state notifications into typed change events.
//!
//! ## Quick start
//!
//! ```no_run
//! use ats_ace_client::{AtsPanel, ArmType, PanelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PanelConfig::builder()
//!         .host("192.168.1.50")
//!         .encryption_key("AAAAAAAAAAAABBBBBBBBBBBB")
//!         .pin("1234")
//!         .build();
//!
//!     let mut panel = AtsPanel::connect(config).await?;
//!
//!     let mut events = panel.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!     panel.start_monitor()?;
//!
//!     panel.arm(&[1], ArmType::Full, false).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod codec;
pub mod comm;
pub mod config;
pub mod constants;
pub mod control;
pub mod crypto;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod message;
pub mod monitor;
pub mod panel;
pub mod state;
pub mod templates;
pub mod transport;

// Re-exports for convenience
pub use config::{ArmType, AuthMethod, LoginPermissions, PanelConfig, PanelConfigBuilder};
pub use control::ControlOutcome;
pub use error::{AceError, Result};
pub use event::{EventReceiver, PanelEvent};
pub use eventlog::LogRecord;
pub use panel::AtsPanel;
pub use state::{EntityKind, EntityState, PanelDescriptor};
