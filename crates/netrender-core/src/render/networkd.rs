//! # systemd-networkd Renderer
//!
//! Per definition:
//! - `run/systemd/network/10-netplan-<id>.network`, always
//! - `run/systemd/network/10-netplan-<id>.netdev` for virtual devices
//! - `run/systemd/network/10-netplan-<id>.link` for a renamed physical device
//! - `run/netplan/wpa-<id>.conf` for wifi with access points
//!
//! There is no aggregate file.

use super::files::{unlink_matching, write_file, write_private_file};
use super::unit::UnitFile;
use super::{Renderer, handles};
use crate::primitives::{
    NETWORKD_DIR, NETWORKD_PREFIX, WPA_DIR, WPA_PREFIX, wifi_freq_5, wifi_freq_24,
};
use crate::state::State;
use crate::types::{Backend, DefType, Definition, NetrenderError};
use std::path::Path;

#[derive(Debug, Default)]
pub struct NetworkdRenderer {
    written: usize,
}

impl NetworkdRenderer {
    /// Definitions written since this renderer was created.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Renderer for NetworkdRenderer {
    fn backend(&self) -> Backend {
        Backend::Networkd
    }

    fn write_definition(
        &mut self,
        state: &State,
        def: &Definition,
        root: &Path,
    ) -> Result<bool, NetrenderError> {
        if !handles(state, def, Backend::Networkd) {
            return Ok(false);
        }

        let base = format!("{}/{}{}", NETWORKD_DIR, NETWORKD_PREFIX, def.id);
        write_file(root, &format!("{}.network", base), &network_file(state, def))?;
        if let Some(netdev) = netdev_file(def) {
            write_file(root, &format!("{}.netdev", base), &netdev)?;
        }
        if let Some(link) = link_file(def) {
            write_file(root, &format!("{}.link", base), &link)?;
        }
        if let Some(wpa) = wpa_file(def)? {
            write_private_file(root, &format!("{}/{}{}.conf", WPA_DIR, WPA_PREFIX, def.id), &wpa)?;
        }

        self.written += 1;
        Ok(true)
    }

    fn finish(&mut self, _state: &State, _root: &Path) -> Result<(), NetrenderError> {
        Ok(())
    }

    fn cleanup(&self, root: &Path) -> Result<(), NetrenderError> {
        unlink_matching(root, NETWORKD_DIR, NETWORKD_PREFIX, "")?;
        unlink_matching(root, WPA_DIR, WPA_PREFIX, ".conf")?;
        Ok(())
    }
}

// =============================================================================
// FILE CONTENTS
// =============================================================================

fn network_file(state: &State, def: &Definition) -> String {
    let fields = &def.fields;
    let mut unit = UnitFile::new();

    unit.section("Match");
    match (&fields.set_name, &fields.match_rules) {
        (Some(name), _) => {
            unit.entry("Name", name);
        }
        (None, Some(rules)) => {
            unit.entry_opt("Name", rules.name.as_deref());
            unit.entry_opt("MACAddress", rules.macaddress.as_deref());
            unit.entry_opt("Driver", rules.driver.as_deref());
        }
        (None, None) => {
            unit.entry("Name", &def.id);
        }
    }

    unit.section("Link");
    if !def.def_type.is_physical() || fields.set_name.is_none() {
        unit.entry_opt("MTUBytes", fields.mtu);
        unit.entry_opt("MACAddress", fields.macaddress.as_deref());
    }
    if fields.optional == Some(true) {
        unit.entry("RequiredForOnline", "no");
    }

    unit.section("Network");
    let dhcp = match (fields.dhcp4 == Some(true), fields.dhcp6 == Some(true)) {
        (true, true) => Some("yes"),
        (true, false) => Some("ipv4"),
        (false, true) => Some("ipv6"),
        (false, false) => None,
    };
    unit.entry_opt("DHCP", dhcp);
    for address in fields.addresses.iter().flatten() {
        unit.entry("Address", address);
    }
    unit.entry_opt("Gateway", fields.gateway4.as_deref());
    unit.entry_opt("Gateway", fields.gateway6.as_deref());
    if let Some(ns) = &fields.nameservers {
        for address in ns.addresses.iter().flatten() {
            unit.entry("DNS", address);
        }
        if let Some(search) = ns.search.as_ref().filter(|s| !s.is_empty()) {
            unit.entry("Domains", search.join(" "));
        }
    }
    if let Some(parent) = state.parent_of(&def.id) {
        match parent.def_type {
            DefType::Bond => unit.entry("Bond", &parent.id),
            _ => unit.entry("Bridge", &parent.id),
        };
    }
    for vlan in state.vlans_on(&def.id) {
        unit.entry("VLAN", &vlan.id);
    }
    if def.def_type == DefType::Tunnel {
        unit.entry("ConfigureWithoutCarrier", "yes");
    }

    for route in fields.routes.iter().flatten() {
        unit.section("Route");
        unit.entry("Destination", &route.to);
        unit.entry_opt("Gateway", route.via.as_deref());
        unit.entry_opt("Metric", route.metric);
    }

    unit.render()
}

fn netdev_file(def: &Definition) -> Option<String> {
    let fields = &def.fields;
    let mut unit = UnitFile::new();
    let params = fields.parameters.as_ref();

    let kind = match def.def_type {
        DefType::Ethernet | DefType::Wifi => return None,
        DefType::Bridge => "bridge",
        DefType::Bond => "bond",
        DefType::Vlan => "vlan",
        DefType::Tunnel => match fields.mode.as_deref() {
            Some("ipip6" | "ip6ip6") => "ip6tnl",
            Some("isatap") => "sit",
            Some(mode) => mode,
            None => return None,
        },
    };

    unit.section("NetDev")
        .entry("Name", &def.id)
        .entry("Kind", kind)
        .entry_opt("MTUBytes", fields.mtu)
        .entry_opt("MACAddress", fields.macaddress.as_deref());

    match def.def_type {
        DefType::Bridge => {
            unit.section("Bridge")
                .entry_opt("STP", params.and_then(|p| p.stp))
                .entry_opt("ForwardDelaySec", params.and_then(|p| p.forward_delay))
                .entry_opt("Priority", params.and_then(|p| p.priority));
        }
        DefType::Bond => {
            unit.section("Bond")
                .entry_opt("Mode", params.and_then(|p| p.mode.as_deref()))
                .entry_opt("MIIMonitorSec", params.and_then(|p| p.mii_monitor_interval).map(|ms| format!("{}ms", ms)));
        }
        DefType::Vlan => {
            unit.section("VLAN").entry_opt("Id", fields.vlan_id);
        }
        DefType::Tunnel => {
            unit.section("Tunnel")
                .entry_opt("Local", fields.local.as_deref())
                .entry_opt("Remote", fields.remote.as_deref())
                .entry_opt("Key", fields.key.as_deref());
            match fields.mode.as_deref() {
                Some(mode @ ("ipip6" | "ip6ip6")) => {
                    unit.entry("Mode", mode);
                }
                Some("isatap") => {
                    unit.entry("Isatap", "yes");
                }
                _ => {}
            }
        }
        DefType::Ethernet | DefType::Wifi => {}
    }

    Some(unit.render())
}

fn link_file(def: &Definition) -> Option<String> {
    if !def.def_type.is_physical() {
        return None;
    }
    let set_name = def.fields.set_name.as_deref()?;
    let rules = def.fields.match_rules.as_ref()?;

    let mut unit = UnitFile::new();
    unit.section("Match")
        .entry_opt("OriginalName", rules.name.as_deref())
        .entry_opt("MACAddress", rules.macaddress.as_deref())
        .entry_opt("Driver", rules.driver.as_deref());
    unit.section("Link")
        .entry("Name", set_name)
        .entry("WakeOnLan", "off")
        .entry_opt("MTUBytes", def.fields.mtu)
        .entry_opt("MACAddress", def.fields.macaddress.as_deref());
    Some(unit.render())
}

/// `ssid=` value: quoted when plain printable ASCII without quotes, else hex.
fn wpa_ssid(ssid: &str) -> String {
    if ssid.chars().all(|c| c.is_ascii_graphic() || c == ' ') && !ssid.contains('"') {
        format!("\"{}\"", ssid)
    } else {
        ssid.bytes().map(|b| format!("{:02x}", b)).collect()
    }
}

fn wpa_file(def: &Definition) -> Result<Option<String>, NetrenderError> {
    if def.def_type != DefType::Wifi {
        return Ok(None);
    }
    let Some(aps) = def.fields.access_points.as_ref().filter(|aps| !aps.is_empty()) else {
        return Ok(None);
    };

    let mut out = String::from("ctrl_interface=/run/wpa_supplicant\n");
    for (ssid, ap) in aps {
        out.push_str("\nnetwork={\n");
        out.push_str(&format!("  ssid={}\n", wpa_ssid(ssid)));
        match ap.password.as_deref() {
            // wpa_supplicant ends a quoted passphrase at its last quote, so
            // only line breaks and other control characters are unwritable.
            Some(psk) if psk.chars().any(char::is_control) => {
                return Err(NetrenderError::WriteError(format!(
                    "{}: password for '{}' contains control characters",
                    def.id, ssid
                )));
            }
            Some(psk) => out.push_str(&format!("  psk=\"{}\"\n", psk)),
            None => out.push_str("  key_mgmt=NONE\n"),
        }
        match ap.mode.as_deref() {
            Some("adhoc") => out.push_str("  mode=1\n"),
            Some("ap") => out.push_str("  mode=2\n"),
            _ => {}
        }
        let freq = match (ap.band.as_deref(), ap.channel) {
            (Some("2.4GHz"), Some(ch)) => wifi_freq_24(ch),
            (Some("5GHz"), Some(ch)) => wifi_freq_5(ch),
            _ => None,
        };
        if let Some(freq) = freq {
            out.push_str(&format!("  frequency={}\n", freq));
        }
        out.push_str("}\n");
    }
    Ok(Some(out))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn state_from(text: &str) -> State {
        let mut parser = Parser::new();
        parser
            .load_yaml_str(text, Path::new("/etc/netplan/test.yaml"))
            .expect("load");
        let mut state = State::new();
        state.import_from(&mut parser).expect("import");
        state
    }

    fn render(state: &State) -> (tempfile::TempDir, NetworkdRenderer) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut renderer = NetworkdRenderer::default();
        for def in state.definitions() {
            renderer
                .write_definition(state, def, dir.path())
                .expect("write");
        }
        (dir, renderer)
    }

    fn read(dir: &tempfile::TempDir, rel: &str) -> String {
        std::fs::read_to_string(dir.path().join(rel)).expect("read")
    }

    #[test]
    fn ethernet_network_file() {
        let state = state_from(
            "network:\n  renderer: networkd\n  ethernets:\n    eth0:\n      dhcp4: true\n      addresses: [10.0.0.2/24]\n      nameservers:\n        addresses: [8.8.8.8]\n        search: [lan]\n      routes:\n        - to: 10.1.0.0/16\n          via: 10.0.0.1\n",
        );
        let (dir, renderer) = render(&state);
        assert_eq!(renderer.written(), 1);

        let network = read(&dir, "run/systemd/network/10-netplan-eth0.network");
        assert!(network.starts_with("[Match]\nName=eth0\n"));
        assert!(network.contains("DHCP=ipv4\n"));
        assert!(network.contains("Address=10.0.0.2/24\n"));
        assert!(network.contains("DNS=8.8.8.8\nDomains=lan\n"));
        assert!(network.contains("[Route]\nDestination=10.1.0.0/16\nGateway=10.0.0.1\n"));
        assert!(!dir.path().join("run/systemd/network/10-netplan-eth0.netdev").exists());
    }

    #[test]
    fn bridge_gets_netdev_and_members_point_at_it() {
        let state = state_from(
            "network:\n  renderer: networkd\n  ethernets:\n    eth0: {}\n  bridges:\n    br0:\n      interfaces: [eth0]\n      parameters:\n        stp: false\n",
        );
        let (dir, _) = render(&state);

        let netdev = read(&dir, "run/systemd/network/10-netplan-br0.netdev");
        assert!(netdev.contains("Name=br0\nKind=bridge\n"));
        assert!(netdev.contains("[Bridge]\nSTP=false\n"));
        assert!(read(&dir, "run/systemd/network/10-netplan-eth0.network").contains("Bridge=br0\n"));
    }

    #[test]
    fn vlan_netdev_and_parent_reference() {
        let state = state_from(
            "network:\n  renderer: networkd\n  ethernets:\n    eth0: {}\n  vlans:\n    vlan10:\n      id: 10\n      link: eth0\n",
        );
        let (dir, _) = render(&state);
        assert!(read(&dir, "run/systemd/network/10-netplan-vlan10.netdev").contains("[VLAN]\nId=10\n"));
        assert!(read(&dir, "run/systemd/network/10-netplan-eth0.network").contains("VLAN=vlan10\n"));
    }

    #[test]
    fn set_name_writes_link_file() {
        let state = state_from(
            "network:\n  renderer: networkd\n  ethernets:\n    lan:\n      match:\n        macaddress: \"00:11:22:33:44:55\"\n      set-name: lan0\n",
        );
        let (dir, _) = render(&state);
        let link = read(&dir, "run/systemd/network/10-netplan-lan.link");
        assert!(link.contains("MACAddress=00:11:22:33:44:55\n"));
        assert!(link.contains("[Link]\nName=lan0\n"));
    }

    #[test]
    fn wifi_writes_wpa_with_frequency() {
        let state = state_from(
            "network:\n  renderer: networkd\n  wifis:\n    wl0:\n      access-points:\n        home:\n          password: secret123\n          band: 5GHz\n          channel: 36\n",
        );
        let (dir, _) = render(&state);
        let wpa = read(&dir, "run/netplan/wpa-wl0.conf");
        assert!(wpa.contains("ssid=\"home\"\n"));
        assert!(wpa.contains("psk=\"secret123\"\n"));
        assert!(wpa.contains("frequency=5180\n"));
    }

    #[test]
    fn wpa_ssid_with_quote_is_hex_encoded() {
        let state = state_from(
            "network:\n  renderer: networkd\n  wifis:\n    wl0:\n      access-points:\n        'say \"hi\"':\n          password: 'pa\"ss word'\n",
        );
        let (dir, _) = render(&state);
        let wpa = read(&dir, "run/netplan/wpa-wl0.conf");
        assert!(wpa.contains("  ssid=7361792022686922\n"));
        assert!(wpa.contains("  psk=\"pa\"ss word\"\n"));
    }

    #[test]
    fn password_with_newline_is_write_error() {
        let state = state_from(
            "network:\n  renderer: networkd\n  wifis:\n    wl0:\n      access-points:\n        home:\n          password: \"line\\nbreak\"\n",
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let def = state.get_definition("wl0").expect("wl0");
        let err = NetworkdRenderer::default()
            .write_definition(&state, def, dir.path())
            .expect_err("must fail");
        assert!(matches!(err, NetrenderError::WriteError(_)));
    }

    #[test]
    fn other_backend_is_ignored() {
        let state = state_from(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0: {}\n",
        );
        let (dir, renderer) = render(&state);
        assert_eq!(renderer.written(), 0);
        assert!(!dir.path().join("run/systemd/network").exists());
    }

    #[test]
    fn cleanup_removes_owned_files_only() {
        let state = state_from(
            "network:\n  renderer: networkd\n  wifis:\n    wl0:\n      access-points:\n        open: {}\n",
        );
        let (dir, renderer) = render(&state);
        write_file(dir.path(), "run/systemd/network/99-local.network", "").expect("write");

        renderer.cleanup(dir.path()).expect("cleanup");
        assert!(!dir.path().join("run/systemd/network/10-netplan-wl0.network").exists());
        assert!(!dir.path().join("run/netplan/wpa-wl0.conf").exists());
        assert!(dir.path().join("run/systemd/network/99-local.network").exists());
    }
}
