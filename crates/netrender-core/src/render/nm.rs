//! # NetworkManager Renderer
//!
//! Writes one keyfile profile per definition under
//! `run/NetworkManager/system-connections/`, or one per access point for
//! wifi. Passthrough settings carried over from an imported keyfile are
//! applied last and override anything generated.
//!
//! The aggregate `run/NetworkManager/conf.d/netplan.conf` tells
//! NetworkManager to keep its hands off interfaces networkd manages.

use super::files::{remove_file, unlink_matching, write_private_file};
use super::{Renderer, handles};
use crate::formats::Keyfile;
use crate::primitives::{NM_CONF_PATH, NM_CONNECTIONS_DIR, NM_PREFIX, nm_tunnel_mode};
use crate::state::State;
use crate::types::{AccessPoint, Backend, DefType, Definition, NetrenderError};
use std::path::Path;
use uuid::Uuid;

/// Suffix of every connection profile.
const NM_SUFFIX: &str = ".nmconnection";

#[derive(Debug, Default)]
pub struct NmRenderer {
    written: usize,
}

impl NmRenderer {
    /// Definitions written since this renderer was created.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Renderer for NmRenderer {
    fn backend(&self) -> Backend {
        Backend::NetworkManager
    }

    fn write_definition(
        &mut self,
        state: &State,
        def: &Definition,
        root: &Path,
    ) -> Result<bool, NetrenderError> {
        if !handles(state, def, Backend::NetworkManager) {
            return Ok(false);
        }

        if def.def_type == DefType::Wifi {
            for (ssid, ap) in def.fields.access_points.iter().flatten() {
                let rel = format!(
                    "{}/{}{}-{}{}",
                    NM_CONNECTIONS_DIR,
                    NM_PREFIX,
                    def.id,
                    escape_ssid(ssid),
                    NM_SUFFIX
                );
                let profile = connection(state, def, Some((ssid.as_str(), ap)));
                write_private_file(root, &rel, &profile.render())?;
            }
        } else {
            let rel = format!("{}/{}{}{}", NM_CONNECTIONS_DIR, NM_PREFIX, def.id, NM_SUFFIX);
            write_private_file(root, &rel, &connection(state, def, None).render())?;
        }

        self.written += 1;
        Ok(true)
    }

    fn finish(&mut self, state: &State, root: &Path) -> Result<(), NetrenderError> {
        if self.written == 0 {
            return Ok(());
        }

        let unmanaged: Vec<String> = state
            .definitions()
            .filter(|def| handles(state, def, Backend::Networkd))
            .filter_map(|def| def.interface_name())
            .map(|name| format!("interface-name:{},", name))
            .collect();

        let mut conf = String::from("[keyfile]\n# devices managed by networkd\n");
        if !unmanaged.is_empty() {
            conf.push_str(&format!("unmanaged-devices+={}\n", unmanaged.concat()));
        }
        super::files::write_file(root, NM_CONF_PATH, &conf)?;
        Ok(())
    }

    fn cleanup(&self, root: &Path) -> Result<(), NetrenderError> {
        unlink_matching(root, NM_CONNECTIONS_DIR, NM_PREFIX, NM_SUFFIX)?;
        remove_file(root, NM_CONF_PATH)?;
        Ok(())
    }
}

// =============================================================================
// PROFILE CONTENTS
// =============================================================================

fn connection(state: &State, def: &Definition, ap: Option<(&str, &AccessPoint)>) -> Keyfile {
    let fields = &def.fields;
    let nm = fields.networkmanager.as_ref();
    let mut kf = Keyfile::new();

    let profile = match ap {
        Some((ssid, _)) => format!("{}{}-{}", NM_PREFIX, def.id, ssid),
        None => format!("{}{}", NM_PREFIX, def.id),
    };
    let name = nm
        .and_then(|nm| nm.name.clone())
        .unwrap_or_else(|| format!("{}{}", NM_PREFIX, def.id));
    let name = match ap {
        Some((ssid, _)) if nm.and_then(|nm| nm.name.as_ref()).is_none() => {
            format!("{} {}", name, ssid)
        }
        _ => name,
    };
    let uuid = nm
        .and_then(|nm| nm.uuid.clone())
        .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, profile.as_bytes()).to_string());

    kf.set("connection", "id", name);
    kf.set(
        "connection",
        "type",
        match def.def_type {
            DefType::Ethernet => "ethernet",
            DefType::Wifi => "wifi",
            DefType::Bridge => "bridge",
            DefType::Bond => "bond",
            DefType::Vlan => "vlan",
            DefType::Tunnel => "ip-tunnel",
        },
    );
    kf.set("connection", "uuid", uuid);
    if let Some(iface) = def.interface_name() {
        kf.set("connection", "interface-name", iface);
    }
    let parent = state.parent_of(&def.id);
    if let Some(parent) = parent {
        kf.set("connection", "master", parent.id.as_str());
        kf.set(
            "connection",
            "slave-type",
            if parent.def_type == DefType::Bond { "bond" } else { "bridge" },
        );
    }

    match def.def_type {
        DefType::Ethernet => {
            if let Some(mac) = fields.match_rules.as_ref().and_then(|m| m.macaddress.as_deref()) {
                kf.set("ethernet", "mac-address", mac);
            }
            link_settings(&mut kf, "ethernet", def);
        }
        DefType::Wifi => {
            if let Some((ssid, ap)) = ap {
                kf.set("wifi", "ssid", ssid);
                kf.set("wifi", "mode", ap.mode.as_deref().unwrap_or("infrastructure"));
                match ap.band.as_deref() {
                    Some("5GHz") => kf.set("wifi", "band", "a"),
                    Some("2.4GHz") => kf.set("wifi", "band", "bg"),
                    _ => {}
                }
                if let Some(channel) = ap.channel {
                    kf.set("wifi", "channel", channel.to_string());
                }
            }
            if let Some(mac) = fields.match_rules.as_ref().and_then(|m| m.macaddress.as_deref()) {
                kf.set("wifi", "mac-address", mac);
            }
            link_settings(&mut kf, "wifi", def);
            if let Some(psk) = ap.and_then(|(_, ap)| ap.password.as_deref()) {
                kf.set("wifi-security", "key-mgmt", "wpa-psk");
                kf.set("wifi-security", "psk", psk);
            }
        }
        DefType::Bridge => {
            let params = fields.parameters.as_ref();
            if let Some(stp) = params.and_then(|p| p.stp) {
                kf.set("bridge", "stp", stp.to_string());
            }
            if let Some(delay) = params.and_then(|p| p.forward_delay) {
                kf.set("bridge", "forward-delay", delay.to_string());
            }
            if let Some(priority) = params.and_then(|p| p.priority) {
                kf.set("bridge", "priority", priority.to_string());
            }
        }
        DefType::Bond => {
            let params = fields.parameters.as_ref();
            if let Some(mode) = params.and_then(|p| p.mode.as_deref()) {
                kf.set("bond", "mode", mode);
            }
            if let Some(miimon) = params.and_then(|p| p.mii_monitor_interval) {
                kf.set("bond", "miimon", miimon.to_string());
            }
        }
        DefType::Vlan => {
            if let Some(id) = fields.vlan_id {
                kf.set("vlan", "id", id.to_string());
            }
            if let Some(link) = fields.link.as_deref() {
                let parent = state
                    .get_definition(link)
                    .and_then(|p| p.interface_name())
                    .unwrap_or(link);
                kf.set("vlan", "parent", parent);
            }
        }
        DefType::Tunnel => {
            if let Some(mode) = fields.mode.as_deref().and_then(nm_tunnel_mode) {
                kf.set("ip-tunnel", "mode", mode.to_string());
            }
            if let Some(local) = fields.local.as_deref() {
                kf.set("ip-tunnel", "local", local);
            }
            if let Some(remote) = fields.remote.as_deref() {
                kf.set("ip-tunnel", "remote", remote);
            }
            if let Some(key) = fields.key.as_deref() {
                kf.set("ip-tunnel", "input-key", key);
                kf.set("ip-tunnel", "output-key", key);
            }
        }
    }

    if parent.is_none() {
        ip_settings(&mut kf, def);
    }

    for (path, value) in nm.and_then(|nm| nm.passthrough.as_ref()).into_iter().flatten() {
        match path.split_once('.') {
            Some((group, key)) => kf.set(group, key, value.as_str()),
            None => tracing::warn!("{}: ignoring passthrough key '{}'", def.id, path),
        }
    }

    kf
}

fn link_settings(kf: &mut Keyfile, group: &str, def: &Definition) {
    if let Some(mac) = def.fields.macaddress.as_deref() {
        kf.set(group, "cloned-mac-address", mac);
    }
    if let Some(mtu) = def.fields.mtu {
        kf.set(group, "mtu", mtu.to_string());
    }
}

fn ip_settings(kf: &mut Keyfile, def: &Definition) {
    let fields = &def.fields;
    let (v6, v4): (Vec<&String>, Vec<&String>) =
        fields.addresses.iter().flatten().partition(|a| a.contains(':'));
    let ns = fields.nameservers.as_ref();
    let (dns6, dns4): (Vec<&String>, Vec<&String>) = ns
        .and_then(|ns| ns.addresses.as_ref())
        .into_iter()
        .flatten()
        .partition(|a| a.contains(':'));
    let (routes6, routes4): (Vec<_>, Vec<_>) = fields
        .routes
        .iter()
        .flatten()
        .partition(|r| r.to.contains(':'));

    for (family, dhcp, addrs, gateway, dns, routes, fallback) in [
        ("ipv4", fields.dhcp4, &v4, fields.gateway4.as_deref(), &dns4, &routes4, "link-local"),
        ("ipv6", fields.dhcp6, &v6, fields.gateway6.as_deref(), &dns6, &routes6, "ignore"),
    ] {
        let method = if dhcp == Some(true) {
            "auto"
        } else if !addrs.is_empty() {
            "manual"
        } else {
            fallback
        };
        kf.set(family, "method", method);
        for (idx, addr) in addrs.iter().enumerate() {
            kf.set(family, &format!("address{}", idx + 1), addr.as_str());
        }
        if let Some(gateway) = gateway {
            kf.set(family, "gateway", gateway);
        }
        if !dns.is_empty() {
            let list: String = dns.iter().map(|a| format!("{};", a)).collect();
            kf.set(family, "dns", list);
        }
        if family == "ipv4" {
            if let Some(search) = ns.and_then(|ns| ns.search.as_ref()).filter(|s| !s.is_empty()) {
                let list: String = search.iter().map(|s| format!("{};", s)).collect();
                kf.set(family, "dns-search", list);
            }
        }
        for (idx, route) in routes.iter().enumerate() {
            let mut value = route.to.clone();
            if let Some(via) = route.via.as_deref() {
                value.push_str(&format!(",{}", via));
            }
            if let Some(metric) = route.metric {
                if route.via.is_none() {
                    value.push(',');
                }
                value.push_str(&format!(",{}", metric));
            }
            kf.set(family, &format!("route{}", idx + 1), value);
        }
    }
}

// =============================================================================
// FILENAMES
// =============================================================================

/// Percent-escape an SSID for use in a filename.
///
/// ASCII alphanumerics, `-._~` and non-ASCII characters are kept; every other
/// byte becomes `%XX`.
#[must_use]
pub fn escape_ssid(ssid: &str) -> String {
    let mut out = String::with_capacity(ssid.len());
    for c in ssid.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~') || !c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("%{:02X}", c as u32));
        }
    }
    out
}

/// Recover the definition ID from a generated profile path.
///
/// `ssid` must be given for per-access-point wifi profiles. Returns `None`
/// when the path is not one of ours.
#[must_use]
pub fn id_from_nm_filename(filename: &str, ssid: Option<&str>) -> Option<String> {
    let prefix = format!("/{}/{}", NM_CONNECTIONS_DIR, NM_PREFIX);
    let start = filename.rfind(&prefix)? + prefix.len();
    let suffix = match ssid {
        Some(ssid) => format!("-{}{}", escape_ssid(ssid), NM_SUFFIX),
        None => NM_SUFFIX.to_string(),
    };
    let end = filename.rfind(&suffix)?;
    (end >= start).then(|| filename[start..end].to_string())
}

// =============================================================================
// TESTS
// =============================================================================
