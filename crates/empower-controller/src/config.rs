//! Controller configuration.
//!
//! One JSON document holds everything the controller needs at start-up: the
//! listen address, session knobs, the engine options, and the APs and
//! multicast groups known in advance. Every section is optional.
//!
//! ```json
//! {
//!   "listen": "0.0.0.0:4433",
//!   "session": { "default_ssid": "EmPOWER" },
//!   "engine": { "every": 2000, "demo_mode": "sdn@play" },
//!   "aps": [ { "addr": "00:0D:B9:2F:56:64", "label": "lab-1" } ],
//!   "groups": [ { "ip": "224.0.1.200", "receivers": ["AA:BB:CC:DD:EE:01"] } ]
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use empower_core::{Address, MulticastGroup};
use empower_lvapp::codec::DEFAULT_PORT;
use empower_lvapp::SessionConfig;
use empower_sdnplay::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};

/// An AP allowed to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    pub addr: Address,
    #[serde(default)]
    pub label: String,
}

impl FromStr for ApConfig {
    type Err = ConfigError;

    /// `ADDR` or `ADDR=label`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, label) = s.split_once('=').unwrap_or((s, ""));
        let addr = Address::parse(addr.trim()).map_err(|e| ConfigError::invalid_value("aps", e.to_string()))?;
        Ok(Self {
            addr,
            label: label.trim().to_string(),
        })
    }
}

/// A multicast group known at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub receivers: Vec<Address>,
    #[serde(default)]
    pub kind: String,
}

impl GroupConfig {
    pub fn to_group(&self) -> Result<MulticastGroup, ConfigError> {
        MulticastGroup::new(self.ip, self.receivers.iter().copied())
            .map(|g| g.with_kind(self.kind.clone()))
            .map_err(|e| ConfigError::invalid_value("groups", format!("{}: {e}", self.ip)))
    }
}

impl FromStr for GroupConfig {
    type Err = ConfigError;

    /// `IP` or `IP=RECV1,RECV2,...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, receivers) = s.split_once('=').unwrap_or((s, ""));
        let ip = ip
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_value("groups", format!("`{ip}` is not an IPv4 address")))?;
        let receivers = receivers
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Address::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::invalid_value("groups", e.to_string()))?;
        Ok(Self {
            ip,
            receivers,
            kind: String::new(),
        })
    }
}

/// Everything the controller reads at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// LVAPP listen address. Default: **0.0.0.0:4433**.
    pub listen: SocketAddr,
    pub session: SessionConfig,
    pub engine: EngineConfig,
    pub aps: Vec<ApConfig>,
    pub groups: Vec<GroupConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            session: SessionConfig::default(),
            engine: EngineConfig::default(),
            aps: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: ControllerConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.session.hello_period_ms == 0 {
            return Err(ConfigError::invalid_value("session.hello_period_ms", "must be > 0"));
        }
        if let Some(ap) = self.aps.iter().find(|ap| !ap.addr.is_unicast()) {
            return Err(ConfigError::invalid_value(
                "aps",
                format!("{} is not a unicast address", ap.addr),
            ));
        }
        for group in &self.groups {
            group.to_group()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empower_sdnplay::DemoMode;
    use std::io::Write;

    #[test]
    fn test_default_listens_on_lvapp_port() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.listen.port(), 4433);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "listen": "127.0.0.1:5533",
                "session": {{ "default_ssid": "EmPOWER" }},
                "engine": {{ "demo_mode": "DMS" }},
                "aps": [ {{ "addr": "00:0d:b9:2f:56:64" }} ],
                "groups": [ {{ "ip": "224.0.1.200", "receivers": ["aa:bb:cc:dd:ee:01"] }} ]
            }}"#
        )
        .unwrap();
        let cfg = ControllerConfig::from_json(file.path()).unwrap();
        assert_eq!(cfg.listen.port(), 5533);
        assert_eq!(cfg.session.default_ssid.as_ref().map(|s| s.as_str()), Some("EmPOWER"));
        assert_eq!(cfg.session.hello_period_ms, 2000);
        assert_eq!(cfg.engine.demo_mode, DemoMode::Dms);
        assert_eq!(cfg.aps[0].addr.to_string(), "00:0D:B9:2F:56:64");
        assert_eq!(cfg.groups[0].to_group().unwrap().addr.to_string(), "01:00:5E:00:01:C8");
    }

    #[test]
    fn test_rejects_unicast_group_ip() {
        let cfg = ControllerConfig {
            groups: vec!["10.0.0.1".parse().unwrap()],
            ..ControllerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field: "groups", .. })
        ));
    }

    #[test]
    fn test_rejects_multicast_ap() {
        let cfg = ControllerConfig {
            aps: vec!["01:00:5E:00:00:01".parse().unwrap()],
            ..ControllerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cli_forms() {
        let ap: ApConfig = "00:0D:B9:2F:56:64=lab-1".parse().unwrap();
        assert_eq!(ap.label, "lab-1");

        let group: GroupConfig = "224.0.1.200=aa:bb:cc:dd:ee:01, aa:bb:cc:dd:ee:02".parse().unwrap();
        assert_eq!(group.receivers.len(), 2);
        let bare: GroupConfig = "239.1.1.1".parse().unwrap();
        assert!(bare.receivers.is_empty());
        assert!("not-an-ip".parse::<GroupConfig>().is_err());
    }
}
