//! # Core Type Definitions
//!
//! This module contains the definition model shared by every stage of the
//! pipeline:
//! - Definition identity and kind (`Definition`, `DefType`)
//! - Backend selection (`Backend`)
//! - Explicitly-set configuration (`Fields` and its nested settings)
//! - Error types (`NetrenderError`)
//!
//! ## Explicit Fields
//!
//! Every setting in [`Fields`] is an `Option`. `None` means "not written in any
//! source document", which is what lets layered documents overlay each other
//! and lets the YAML serializer emit only what the user actually wrote.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub(crate) mod scalar;

// =============================================================================
// DEFINITION KIND
// =============================================================================

/// The declared kind of a definition, taken from the document section it
/// appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefType {
    Ethernet,
    Wifi,
    Bridge,
    Bond,
    Vlan,
    Tunnel,
}

impl DefType {
    /// All kinds, in the order sections are emitted when nothing else decides.
    pub const ALL: [DefType; 6] = [
        DefType::Ethernet,
        DefType::Wifi,
        DefType::Bridge,
        DefType::Bond,
        DefType::Vlan,
        DefType::Tunnel,
    ];

    /// Map a document section name (`ethernets`, `bridges`, ...) to a kind.
    #[must_use]
    pub fn from_section(section: &str) -> Option<Self> {
        match section {
            "ethernets" => Some(Self::Ethernet),
            "wifis" => Some(Self::Wifi),
            "bridges" => Some(Self::Bridge),
            "bonds" => Some(Self::Bond),
            "vlans" => Some(Self::Vlan),
            "tunnels" => Some(Self::Tunnel),
            _ => None,
        }
    }

    /// The document section this kind is declared in.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernets",
            Self::Wifi => "wifis",
            Self::Bridge => "bridges",
            Self::Bond => "bonds",
            Self::Vlan => "vlans",
            Self::Tunnel => "tunnels",
        }
    }

    /// Physical devices exist before configuration and are found by matching.
    #[must_use]
    pub const fn is_physical(self) -> bool {
        matches!(self, Self::Ethernet | Self::Wifi)
    }

    /// Bridges and bonds are the only kinds that own member interfaces.
    #[must_use]
    pub const fn has_members(self) -> bool {
        matches!(self, Self::Bridge | Self::Bond)
    }
}

impl fmt::Display for DefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// The configuration consumer a definition is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Link manager: systemd-networkd.
    #[serde(rename = "networkd")]
    Networkd,
    /// Connection manager: NetworkManager.
    #[serde(rename = "NetworkManager")]
    NetworkManager,
    /// Virtual switch: Open vSwitch.
    #[serde(rename = "openvswitch")]
    OpenVSwitch,
}

impl Backend {
    /// The spelling used for `renderer:` in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Networkd => "networkd",
            Self::NetworkManager => "NetworkManager",
            Self::OpenVSwitch => "openvswitch",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = NetrenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "networkd" => Ok(Self::Networkd),
            "NetworkManager" => Ok(Self::NetworkManager),
            "openvswitch" => Ok(Self::OpenVSwitch),
            other => Err(NetrenderError::SchemaError(format!(
                "unknown renderer '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// NESTED SETTINGS
// =============================================================================

/// DNS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Nameservers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar::list", skip_serializing_if = "Option::is_none")]
    pub search: Option<Vec<String>>,
}

/// A static route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Route {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

/// Rules selecting the physical device a definition applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MatchRules {
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub macaddress: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// Bridge and bond parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Parameters {
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mii_monitor_interval: Option<u32>,
    #[serde(default, deserialize_with = "scalar::boolean", skip_serializing_if = "Option::is_none")]
    pub stp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

/// One wifi network a wifi definition may join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AccessPoint {
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
}

/// Open vSwitch SSL settings (global only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SslSettings {
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// Open vSwitch settings, used both per definition and switch-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OvsSettings {
    #[serde(default, deserialize_with = "scalar::map", skip_serializing_if = "Option::is_none")]
    pub external_ids: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "scalar::map", skip_serializing_if = "Option::is_none")]
    pub other_config: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "scalar::list", skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub fail_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslSettings>,
}

impl OvsSettings {
    /// True when nothing was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// NetworkManager-specific data, mostly carried over from keyfiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NmSettings {
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Keyfile settings with no typed counterpart, keyed `group.key`.
    #[serde(default, deserialize_with = "scalar::map", skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<BTreeMap<String, String>>,
}

// =============================================================================
// FIELDS
// =============================================================================

/// Every explicitly-set setting of a definition.
///
/// Keys are spelled as in the YAML documents. Which keys are legal for which
/// [`DefType`] is enforced by the parser, not by this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Fields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Backend>,
    #[serde(default, deserialize_with = "scalar::boolean", skip_serializing_if = "Option::is_none")]
    pub dhcp4: Option<bool>,
    #[serde(default, deserialize_with = "scalar::boolean", skip_serializing_if = "Option::is_none")]
    pub dhcp6: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub gateway4: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Nameservers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<Route>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub macaddress: Option<String>,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_rules: Option<MatchRules>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    #[serde(default, deserialize_with = "scalar::boolean", skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    /// Bridge/bond members (references).
    #[serde(default, deserialize_with = "scalar::list", skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    /// VLAN tag.
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    /// VLAN parent (reference).
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Tunnel mode.
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, deserialize_with = "scalar::string", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_points: Option<BTreeMap<String, AccessPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openvswitch: Option<OvsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networkmanager: Option<NmSettings>,
}

impl Fields {
    /// Names of the keys that are set but not legal for `def_type`.
    #[must_use]
    pub fn foreign_keys(&self, def_type: DefType) -> Vec<&'static str> {
        let mut foreign = Vec::new();
        if !def_type.has_members() {
            if self.interfaces.is_some() {
                foreign.push("interfaces");
            }
            if self.parameters.is_some() {
                foreign.push("parameters");
            }
        }
        if def_type != DefType::Vlan {
            if self.vlan_id.is_some() {
                foreign.push("id");
            }
            if self.link.is_some() {
                foreign.push("link");
            }
        }
        if def_type != DefType::Tunnel {
            for (key, set) in [
                ("mode", self.mode.is_some()),
                ("local", self.local.is_some()),
                ("remote", self.remote.is_some()),
                ("key", self.key.is_some()),
            ] {
                if set {
                    foreign.push(key);
                }
            }
        }
        if def_type != DefType::Wifi && self.access_points.is_some() {
            foreign.push("access-points");
        }
        if !def_type.is_physical() {
            if self.match_rules.is_some() {
                foreign.push("match");
            }
            if self.set_name.is_some() {
                foreign.push("set-name");
            }
        }
        foreign
    }
}

// =============================================================================
// DEFINITION
// =============================================================================

/// One addressable network object and its desired configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Unique ID within a state.
    pub id: String,
    /// Declared kind.
    pub def_type: DefType,
    /// The file this definition was last declared in.
    pub filename: Option<PathBuf>,
    /// Explicitly-set settings.
    pub fields: Fields,
}

impl Definition {
    /// Create a definition with no settings.
    #[must_use]
    pub fn new(id: impl Into<String>, def_type: DefType) -> Self {
        Self {
            id: id.into(),
            def_type,
            filename: None,
            fields: Fields::default(),
        }
    }

    /// The kernel interface name this definition configures, if it can be
    /// known without looking at the running system.
    ///
    /// Virtual devices are named after their ID. Physical devices use
    /// `set-name`, then a glob-free `match.name`, and fall back to the ID only
    /// when there is no `match` block at all.
    #[must_use]
    pub fn interface_name(&self) -> Option<&str> {
        if let Some(name) = self.fields.set_name.as_deref() {
            return Some(name);
        }
        if !self.def_type.is_physical() {
            return Some(&self.id);
        }
        match &self.fields.match_rules {
            None => Some(&self.id),
            Some(rules) => rules
                .name
                .as_deref()
                .filter(|name| !name.contains(['*', '?', '['])),
        }
    }

    /// IDs of other definitions this one refers to.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.fields
            .interfaces
            .iter()
            .flatten()
            .map(String::as_str)
            .chain(self.fields.link.as_deref())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur anywhere in the pipeline.
///
/// - No silent failures
/// - Use `Result<T, NetrenderError>` for fallible operations
/// - The core never panics or exits; the caller decides what a failure means
#[derive(Debug, Error)]
pub enum NetrenderError {
    /// A file could not be read, listed or removed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A document is not well-formed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A document is well-formed but a key or value is not valid.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A definition refers to an ID that was never declared.
    #[error("{id}: interface '{reference}' is not defined")]
    UnresolvedReference { id: String, reference: String },

    /// A backend file could not be produced.
    #[error("Write error: {0}")]
    WriteError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_names_roundtrip() {
        for def_type in DefType::ALL {
            assert_eq!(DefType::from_section(def_type.section()), Some(def_type));
        }
        assert_eq!(DefType::from_section("modems"), None);
    }

    #[test]
    fn backend_parses_document_spelling() {
        assert_eq!("networkd".parse::<Backend>().ok(), Some(Backend::Networkd));
        assert_eq!(
            "NetworkManager".parse::<Backend>().ok(),
            Some(Backend::NetworkManager)
        );
        assert!("networkmanager".parse::<Backend>().is_err());
    }

    #[test]
    fn interface_name_rules() {
        let eth = Definition::new("eth0", DefType::Ethernet);
        assert_eq!(eth.interface_name(), Some("eth0"));

        let mut matched = Definition::new("lan", DefType::Ethernet);
        matched.fields.match_rules = Some(MatchRules {
            name: Some("en*".to_string()),
            ..MatchRules::default()
        });
        assert_eq!(matched.interface_name(), None);

        matched.fields.set_name = Some("lan0".to_string());
        assert_eq!(matched.interface_name(), Some("lan0"));

        let br = Definition::new("br0", DefType::Bridge);
        assert_eq!(br.interface_name(), Some("br0"));
    }

    #[test]
    fn foreign_keys_detects_misplaced_settings() {
        let fields = Fields {
            interfaces: Some(vec!["eth0".to_string()]),
            vlan_id: Some(10),
            ..Fields::default()
        };
        assert_eq!(fields.foreign_keys(DefType::Ethernet), vec!["interfaces", "id"]);
        assert_eq!(fields.foreign_keys(DefType::Bridge), vec!["id"]);
    }

    #[test]
    fn references_cover_members_and_link() {
        let mut vlan = Definition::new("vlan10", DefType::Vlan);
        vlan.fields.link = Some("eth0".to_string());
        assert_eq!(vlan.references().collect::<Vec<_>>(), vec!["eth0"]);

        let mut br = Definition::new("br0", DefType::Bridge);
        br.fields.interfaces = Some(vec!["eth1".to_string(), "eth2".to_string()]);
        assert_eq!(br.references().collect::<Vec<_>>(), vec!["eth1", "eth2"]);
    }
}
