// MIT License - Copyright (c) 2026 Peter Wright

use bitflags::bitflags;

use crate::constants::{CALL_TIMEOUT_MS, KEEP_ALIVE_INTERVAL_MS};

/// Arm variant for an area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmType {
    /// Full set
    Full,
    /// Partial set 1
    Part1,
    /// Partial set 2
    Part2,
}

impl ArmType {
    /// High byte of the control-session state ids for this set type, also
    /// sent in the arm request.
    pub fn set_code(&self) -> u8 {
        match self {
            ArmType::Full => 0x05,
            ArmType::Part1 => 0x04,
            ArmType::Part2 => 0x10,
        }
    }

    /// Compose a full 16-bit state id from this set type and a state low
    /// byte.
    pub fn state_id(&self, state: u8) -> u16 {
        ((self.set_code() as u16) << 8) | state as u16
    }
}

bitflags! {
    /// Permission bits requested at login.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoginPermissions: u8 {
        const REMOTE_CONTROL = 0x01;
        const STATUS_QUERY = 0x04;
        const EVENT_LOG = 0x10;
        const CONTROL_SESSIONS = 0x80;
    }
}

impl Default for LoginPermissions {
    fn default() -> Self {
        Self::all()
    }
}

/// How to authenticate once the encrypted session is up.
///
/// Simple panels take a numeric PIN; the extended family uses an
/// operator account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Pin(String),
    Account { username: String, password: String },
}

/// Configuration for one panel connection.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel host name or IP address
    pub host: String,
    /// Panel TCP port (default: 3001)
    pub port: u16,
    /// The 24/36/48-character encryption password
    pub encryption_key: String,
    /// PIN or account credentials
    pub auth: AuthMethod,
    /// Permission bits requested at login
    pub permissions: LoginPermissions,
    /// Per-call response timeout in milliseconds
    pub call_timeout_ms: u64,
    /// Keep-alive ping interval in milliseconds
    pub keep_alive_interval_ms: u64,
    /// Base delay for reconnection backoff in milliseconds
    pub reconnect_delay_ms: u64,
    /// Maximum connection retries on transient errors (0 = no retries)
    pub max_connect_retries: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.50".to_string(),
            port: 3001,
            encryption_key: String::new(),
            auth: AuthMethod::Pin("1234".to_string()),
            permissions: LoginPermissions::default(),
            call_timeout_ms: CALL_TIMEOUT_MS,
            keep_alive_interval_ms: KEEP_ALIVE_INTERVAL_MS,
            reconnect_delay_ms: 5000,
            max_connect_retries: 2,
        }
    }
}

impl PanelConfig {
    pub fn builder() -> PanelConfigBuilder {
        PanelConfigBuilder::default()
    }
}

/// Builder for [`PanelConfig`].
#[derive(Debug, Clone, Default)]
pub struct PanelConfigBuilder {
    config: PanelConfig,
}

impl PanelConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.config.encryption_key = key.into();
        self
    }

    pub fn pin(mut self, pin: impl Into<String>) -> Self {
        self.config.auth = AuthMethod::Pin(pin.into());
        self
    }

    pub fn account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.auth = AuthMethod::Account {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    pub fn permissions(mut self, permissions: LoginPermissions) -> Self {
        self.config.permissions = permissions;
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.config.call_timeout_ms = ms;
        self
    }

    pub fn keep_alive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keep_alive_interval_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_connect_retries(mut self, retries: u32) -> Self {
        self.config.max_connect_retries = retries;
        self
    }

    pub fn build(self) -> PanelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_type_state_ids() {
        assert_eq!(ArmType::Full.state_id(0x04), 0x0504);
        assert_eq!(ArmType::Full.state_id(0x05), 0x0505);
        assert_eq!(ArmType::Part1.state_id(0x01), 0x0401);
        assert_eq!(ArmType::Part2.state_id(0x03), 0x1003);
    }

    #[test]
    fn test_builder() {
        let config = PanelConfig::builder()
            .host("10.0.0.9")
            .port(3070)
            .encryption_key("AAAAAAAAAAAABBBBBBBBBBBB")
            .account("operator", "hunter2")
            .build();
        assert_eq!(config.host, "10.0.0.9");
        assert_eq!(config.port, 3070);
        assert_eq!(
            config.auth,
            AuthMethod::Account {
                username: "operator".to_string(),
                password: "hunter2".to_string()
            }
        );
    }

    #[test]
    fn test_defaults() {
        let config = PanelConfig::builder().build();
        assert_eq!(config.port, 3001);
        assert_eq!(config.call_timeout_ms, 5000);
        assert_eq!(config.keep_alive_interval_ms, 30_000);
        assert_eq!(config.permissions, LoginPermissions::all());
    }
}
