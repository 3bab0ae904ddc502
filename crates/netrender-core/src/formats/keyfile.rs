//! # Keyfile Format
//!
//! The flat `[group]` / `key=value` format NetworkManager stores connection
//! profiles in. Used in both directions: reading profiles into definitions and
//! writing the connection-manager backend's output.

use crate::primitives::tunnel_mode_from_nm;
use crate::types::{
    AccessPoint, Backend, DefType, Definition, MatchRules, Nameservers, NetrenderError,
    NmSettings, Parameters, Route,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

/// An ordered keyfile: groups and keys keep their first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyfile {
    groups: Vec<(String, Vec<(String, String)>)>,
}

impl Keyfile {
    /// Create an empty keyfile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse keyfile text. Comments start with `#` or `;`.
    pub fn parse(text: &str) -> Result<Self, NetrenderError> {
        let mut keyfile = Self::new();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').filter(|n| !n.is_empty()).ok_or_else(|| {
                    NetrenderError::ParseError(format!("line {}: malformed group header", idx + 1))
                })?;
                keyfile.group_mut(name);
                current = Some(name.to_string());
                continue;
            }
            let Some(group) = current.as_deref() else {
                return Err(NetrenderError::ParseError(format!(
                    "line {}: key outside of any group",
                    idx + 1
                )));
            };
            let (key, value) = line.split_once('=').ok_or_else(|| {
                NetrenderError::ParseError(format!("line {}: expected key=value", idx + 1))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(NetrenderError::ParseError(format!(
                    "line {}: empty key",
                    idx + 1
                )));
            }
            keyfile.set(group, key, value.trim());
        }
        Ok(keyfile)
    }

    fn group_mut(&mut self, group: &str) -> &mut Vec<(String, String)> {
        let idx = match self.groups.iter().position(|(name, _)| name == group) {
            Some(idx) => idx,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }

    /// Set a key, replacing an existing value in place.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let entries = self.group_mut(group);
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .and_then(|(_, entries)| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    /// All `(group, key, value)` triples in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.groups.iter().flat_map(|(group, entries)| {
            entries
                .iter()
                .map(move |(k, v)| (group.as_str(), k.as_str(), v.as_str()))
        })
    }

    /// Keys of `group` of the form `<stem><n>`, sorted by `n`.
    fn numbered(&self, group: &str, stem: &str) -> Vec<(String, String)> {
        let mut found: Vec<(u32, String, String)> = self
            .entries()
            .filter(|(g, _, _)| *g == group)
            .filter_map(|(_, k, v)| {
                let n = k.strip_prefix(stem)?.parse::<u32>().ok()?;
                Some((n, k.to_string(), v.to_string()))
            })
            .collect();
        found.sort_by_key(|(n, _, _)| *n);
        found.into_iter().map(|(_, k, v)| (k, v)).collect()
    }

    /// Render as text: groups separated by a blank line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (idx, (group, entries)) in self.groups.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", group));
            for (key, value) in entries {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        out
    }
}

// =============================================================================
// KEYFILE -> DEFINITION
// =============================================================================

/// Tracks which keys were turned into typed fields.
struct Reader<'a> {
    keyfile: &'a Keyfile,
    consumed: BTreeSet<(String, String)>,
}

impl<'a> Reader<'a> {
    fn take(&mut self, group: &str, key: &str) -> Option<&'a str> {
        let value = self.keyfile.get(group, key)?;
        self.consumed.insert((group.to_string(), key.to_string()));
        Some(value)
    }

    fn take_numbered(&mut self, group: &str, stem: &str) -> Vec<String> {
        let found = self.keyfile.numbered(group, stem);
        let mut values = Vec::with_capacity(found.len());
        for (key, value) in found {
            self.consumed.insert((group.to_string(), key));
            values.push(value);
        }
        values
    }

    fn leftovers(&self) -> BTreeMap<String, String> {
        self.keyfile
            .entries()
            .filter(|(g, k, _)| !self.consumed.contains(&(g.to_string(), k.to_string())))
            .map(|(g, k, v)| (format!("{}.{}", g, k), v.to_string()))
            .collect()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn a connection profile into a definition with id `NM-<uuid>`.
///
/// Settings without a typed counterpart are kept in
/// `networkmanager.passthrough` so they survive re-rendering.
pub fn definition_from_keyfile(
    keyfile: &Keyfile,
    origin: &Path,
) -> Result<Definition, NetrenderError> {
    let schema = |msg: String| NetrenderError::SchemaError(format!("{}: {}", origin.display(), msg));
    let mut reader = Reader {
        keyfile,
        consumed: BTreeSet::new(),
    };

    let uuid_text = reader
        .take("connection", "uuid")
        .ok_or_else(|| schema("missing connection.uuid".to_string()))?;
    let uuid = Uuid::parse_str(uuid_text)
        .map_err(|e| schema(format!("invalid connection.uuid '{}': {}", uuid_text, e)))?;

    let nm_type = reader
        .take("connection", "type")
        .ok_or_else(|| schema("missing connection.type".to_string()))?;
    let def_type = match nm_type {
        "ethernet" | "802-3-ethernet" => DefType::Ethernet,
        "wifi" | "802-11-wireless" => DefType::Wifi,
        "bridge" => DefType::Bridge,
        "bond" => DefType::Bond,
        "vlan" => DefType::Vlan,
        "ip-tunnel" => DefType::Tunnel,
        other => return Err(schema(format!("unsupported connection.type '{}'", other))),
    };

    let mut def = Definition::new(format!("NM-{}", uuid), def_type);
    def.filename = Some(origin.to_path_buf());
    let fields = &mut def.fields;
    fields.renderer = Some(Backend::NetworkManager);

    let name = reader.take("connection", "id").map(str::to_string);

    if def_type.is_physical() {
        let interface = reader.take("connection", "interface-name");
        let mac = reader.take("ethernet", "mac-address");
        if interface.is_some() || mac.is_some() {
            fields.match_rules = Some(MatchRules {
                name: interface.map(str::to_string),
                macaddress: mac.map(str::to_string),
                driver: None,
            });
        }
    }

    let link_group = if def_type == DefType::Wifi { "wifi" } else { "ethernet" };
    if let Some(mtu) = reader.take(link_group, "mtu") {
        let mtu = mtu
            .parse::<u32>()
            .map_err(|_| schema(format!("invalid {}.mtu '{}'", link_group, mtu)))?;
        fields.mtu = Some(mtu);
    }
    if let Some(mac) = reader.take(link_group, "cloned-mac-address") {
        fields.macaddress = Some(mac.to_string());
    }

    let mut addresses = Vec::new();
    let mut dns = Vec::new();
    let mut search = Vec::new();
    let mut routes = Vec::new();
    for (family, dhcp_methods) in [("ipv4", &["auto"][..]), ("ipv6", &["auto", "dhcp"][..])] {
        if let Some(method) = keyfile.get(family, "method") {
            if dhcp_methods.contains(&method) {
                reader.take(family, "method");
                if family == "ipv4" {
                    fields.dhcp4 = Some(true);
                } else {
                    fields.dhcp6 = Some(true);
                }
            } else if method == "manual" {
                reader.take(family, "method");
            }
        }

        let mut gateway = reader.take(family, "gateway").map(str::to_string);
        for entry in reader.take_numbered(family, "address") {
            let mut parts = entry.splitn(2, ',');
            if let Some(addr) = parts.next().map(str::trim).filter(|a| !a.is_empty()) {
                addresses.push(addr.to_string());
            }
            if let Some(gw) = parts.next().map(str::trim).filter(|g| !g.is_empty()) {
                gateway.get_or_insert_with(|| gw.to_string());
            }
        }
        if let Some(gateway) = gateway {
            if family == "ipv4" {
                fields.gateway4 = Some(gateway);
            } else {
                fields.gateway6 = Some(gateway);
            }
        }

        if let Some(list) = reader.take(family, "dns") {
            dns.extend(split_list(list));
        }
        if let Some(list) = reader.take(family, "dns-search") {
            search.extend(split_list(list));
        }
        for entry in reader.take_numbered(family, "route") {
            let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
            let to = parts.first().copied().unwrap_or_default();
            if to.is_empty() {
                return Err(schema(format!("{}: route without destination", family)));
            }
            let metric = match parts.get(2).filter(|m| !m.is_empty()) {
                Some(m) => Some(
                    m.parse::<u32>()
                        .map_err(|_| schema(format!("invalid route metric '{}'", m)))?,
                ),
                None => None,
            };
            routes.push(Route {
                to: to.to_string(),
                via: parts.get(1).filter(|v| !v.is_empty()).map(|v| v.to_string()),
                metric,
            });
        }
    }
    if !addresses.is_empty() {
        fields.addresses = Some(addresses);
    }
    if !dns.is_empty() || !search.is_empty() {
        fields.nameservers = Some(Nameservers {
            addresses: (!dns.is_empty()).then_some(dns),
            search: (!search.is_empty()).then_some(search),
        });
    }
    if !routes.is_empty() {
        fields.routes = Some(routes);
    }

    match def_type {
        DefType::Vlan => {
            if let Some(id) = reader.take("vlan", "id") {
                let id = id
                    .parse::<u16>()
                    .map_err(|_| schema(format!("invalid vlan.id '{}'", id)))?;
                fields.vlan_id = Some(id);
            }
            // `vlan.parent` names an interface, not a definition; the parser
            // resolves it once it knows what else was declared.
        }
        DefType::Tunnel => {
            if let Some(mode) = reader.take("ip-tunnel", "mode") {
                let name = mode
                    .parse::<u32>()
                    .ok()
                    .and_then(tunnel_mode_from_nm)
                    .ok_or_else(|| schema(format!("unsupported ip-tunnel.mode '{}'", mode)))?;
                fields.mode = Some(name.to_string());
            }
            fields.local = reader.take("ip-tunnel", "local").map(str::to_string);
            fields.remote = reader.take("ip-tunnel", "remote").map(str::to_string);
            if let Some(key) = reader.take("ip-tunnel", "input-key") {
                if keyfile.get("ip-tunnel", "output-key") == Some(key) {
                    reader.take("ip-tunnel", "output-key");
                }
                fields.key = Some(key.to_string());
            }
        }
        DefType::Bond => {
            if let Some(mode) = reader.take("bond", "mode") {
                fields.parameters = Some(Parameters {
                    mode: Some(mode.to_string()),
                    ..Parameters::default()
                });
            }
        }
        DefType::Wifi => {
            if let Some(ssid) = reader.take("wifi", "ssid") {
                let password = reader.take("wifi-security", "psk").map(str::to_string);
                if password.is_some() {
                    reader.take("wifi-security", "key-mgmt");
                }
                let ap = AccessPoint {
                    password,
                    mode: reader.take("wifi", "mode").map(str::to_string),
                    ..AccessPoint::default()
                };
                fields.access_points = Some(BTreeMap::from([(ssid.to_string(), ap)]));
            }
        }
        _ => {}
    }

    let passthrough = reader.leftovers();
    fields.networkmanager = Some(NmSettings {
        name,
        uuid: Some(uuid.to_string()),
        passthrough: (!passthrough.is_empty()).then_some(passthrough),
    });

    Ok(def)
}

// =============================================================================
// TESTS
// =============================================================================
