//! # Fixed Paths and Limits
//!
//! Compiled-in locations and tables. Every path is relative to the render
//! root, which is `/` in production and a scratch directory in tests.

/// Search directories for YAML documents, lowest precedence first.
///
/// A file in a later directory shadows a file with the same basename in an
/// earlier one.
pub const HIERARCHY_DIRS: [&str; 3] = ["lib/netplan", "etc/netplan", "run/netplan"];

/// Document format version accepted under `network.version`.
pub const DOCUMENT_VERSION: u64 = 2;

/// Maximum size of a single input document (1 MB).
///
/// Larger files are rejected before they are read.
pub const MAX_DOCUMENT_SIZE: u64 = 1024 * 1024;

// =============================================================================
// OUTPUT LOCATIONS
// =============================================================================

/// networkd `.network` / `.netdev` / `.link` files.
pub const NETWORKD_DIR: &str = "run/systemd/network";

/// Prefix of every networkd file we own.
pub const NETWORKD_PREFIX: &str = "10-netplan-";

/// wpa_supplicant configuration for networkd-managed wifi.
pub const WPA_DIR: &str = "run/netplan";

/// Prefix of every wpa_supplicant file we own.
pub const WPA_PREFIX: &str = "wpa-";

/// NetworkManager connection profiles.
pub const NM_CONNECTIONS_DIR: &str = "run/NetworkManager/system-connections";

/// Prefix of every NetworkManager profile we own.
pub const NM_PREFIX: &str = "netplan-";

/// NetworkManager aggregate configuration.
pub const NM_CONF_PATH: &str = "run/NetworkManager/conf.d/netplan.conf";

/// Open vSwitch oneshot units.
pub const OVS_UNIT_DIR: &str = "run/systemd/system";

/// Prefix of every Open vSwitch unit we own.
pub const OVS_PREFIX: &str = "netplan-ovs-";

/// Open vSwitch aggregate unit carrying switch-wide settings.
pub const OVS_CLEANUP_UNIT: &str = "netplan-ovs-cleanup.service";

/// `ovs-vsctl` binary invoked by generated units.
pub const OVS_VSCTL: &str = "/usr/bin/ovs-vsctl";

/// Directory round-trip YAML is written to.
pub const YAML_OUTPUT_DIR: &str = "etc/netplan";

// =============================================================================
// WIFI CHANNELS
// =============================================================================

/// Valid 5 GHz channels. Channels 183-196 (Japan only) are left out.
const WIFI_5GHZ_CHANNELS: [u32; 57] = [
    7, 8, 9, 11, 12, 16, 32, 34, 36, 38, 40, 42, 44, 46, 48, 50, 52, 54, 56, 58, 60, 62, 64, 68,
    96, 100, 102, 104, 106, 108, 110, 112, 114, 116, 118, 120, 122, 124, 126, 128, 132, 134, 136,
    138, 140, 142, 144, 149, 151, 153, 155, 157, 159, 161, 165, 169, 173,
];

/// Frequency in MHz of a 2.4 GHz channel, or `None` if the channel is invalid.
#[must_use]
pub fn wifi_freq_24(channel: u32) -> Option<u32> {
    match channel {
        1..=13 => Some(2412 + (channel - 1) * 5),
        14 => Some(2484),
        _ => None,
    }
}

/// Frequency in MHz of a 5 GHz channel, or `None` if the channel is invalid.
#[must_use]
pub fn wifi_freq_5(channel: u32) -> Option<u32> {
    WIFI_5GHZ_CHANNELS
        .contains(&channel)
        .then(|| 5000 + channel * 5)
}

// =============================================================================
// NETWORKMANAGER TUNNEL MODES
// =============================================================================

/// Tunnel modes and NetworkManager's numeric `ip-tunnel.mode` for each.
const NM_TUNNEL_MODES: [(&str, u32); 11] = [
    ("ipip", 1),
    ("gre", 2),
    ("sit", 3),
    ("isatap", 4),
    ("vti", 5),
    ("ip6ip6", 6),
    ("ipip6", 7),
    ("ip6gre", 8),
    ("vti6", 9),
    ("gretap", 10),
    ("ip6gretap", 11),
];

/// NetworkManager's number for a tunnel mode.
#[must_use]
pub fn nm_tunnel_mode(mode: &str) -> Option<u32> {
    NM_TUNNEL_MODES
        .iter()
        .find(|(name, _)| *name == mode)
        .map(|(_, number)| *number)
}

/// The tunnel mode behind NetworkManager's number.
#[must_use]
pub fn tunnel_mode_from_nm(number: u32) -> Option<&'static str> {
    NM_TUNNEL_MODES
        .iter()
        .find(|(_, n)| *n == number)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_24_table() {
        assert_eq!(wifi_freq_24(1), Some(2412));
        assert_eq!(wifi_freq_24(13), Some(2472));
        assert_eq!(wifi_freq_24(14), Some(2484));
        assert_eq!(wifi_freq_24(0), None);
        assert_eq!(wifi_freq_24(15), None);
    }

    #[test]
    fn freq_5_table() {
        assert_eq!(wifi_freq_5(36), Some(5180));
        assert_eq!(wifi_freq_5(173), Some(5865));
        assert_eq!(wifi_freq_5(37), None);
    }

    #[test]
    fn nm_tunnel_modes_invert() {
        assert_eq!(nm_tunnel_mode("gre"), Some(2));
        assert_eq!(tunnel_mode_from_nm(2), Some("gre"));
        assert_eq!(nm_tunnel_mode("wireguard"), None);
        assert_eq!(tunnel_mode_from_nm(0), None);
    }

    #[test]
    fn hierarchy_order_is_lib_etc_run() {
        assert_eq!(HIERARCHY_DIRS, ["lib/netplan", "etc/netplan", "run/netplan"]);
    }
}
