//! # Merge Engine
//!
//! Field-level overlay used whenever a definition is declared more than once,
//! whether across layered documents in the parser or across generations in the
//! state.
//!
//! Rules:
//! - Scalars and lists: a later explicit value replaces the earlier one
//! - Nested settings blocks: overlaid key by key
//! - String maps (`access-points`, `external-ids`, `passthrough`, ...): merged
//!   per key, later entries winning
//! - An unset (`None`) later value never clears an earlier one

use crate::types::{
    AccessPoint, Fields, MatchRules, Nameservers, NmSettings, OvsSettings, Parameters, SslSettings,
};
use std::collections::BTreeMap;

/// Types that can absorb a later declaration of themselves.
pub trait Overlay {
    /// Apply `later` on top of `self`.
    fn overlay(&mut self, later: Self);
}

/// Replace `slot` when `later` is set.
fn replace<T>(slot: &mut Option<T>, later: Option<T>) {
    if later.is_some() {
        *slot = later;
    }
}

/// Overlay a nested block, adopting `later` wholesale when `slot` is unset.
fn nested<T: Overlay>(slot: &mut Option<T>, later: Option<T>) {
    match (slot.as_mut(), later) {
        (Some(current), Some(later)) => current.overlay(later),
        (None, Some(later)) => *slot = Some(later),
        (_, None) => {}
    }
}

impl<V> Overlay for BTreeMap<String, V> {
    fn overlay(&mut self, later: Self) {
        self.extend(later);
    }
}

impl Overlay for Nameservers {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.addresses, later.addresses);
        replace(&mut self.search, later.search);
    }
}

impl Overlay for MatchRules {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.name, later.name);
        replace(&mut self.macaddress, later.macaddress);
        replace(&mut self.driver, later.driver);
    }
}

impl Overlay for Parameters {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.mode, later.mode);
        replace(&mut self.mii_monitor_interval, later.mii_monitor_interval);
        replace(&mut self.stp, later.stp);
        replace(&mut self.forward_delay, later.forward_delay);
        replace(&mut self.priority, later.priority);
    }
}

impl Overlay for AccessPoint {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.password, later.password);
        replace(&mut self.mode, later.mode);
        replace(&mut self.band, later.band);
        replace(&mut self.channel, later.channel);
    }
}

impl Overlay for SslSettings {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.ca_cert, later.ca_cert);
        replace(&mut self.certificate, later.certificate);
        replace(&mut self.private_key, later.private_key);
    }
}

impl Overlay for OvsSettings {
    fn overlay(&mut self, later: Self) {
        nested(&mut self.external_ids, later.external_ids);
        nested(&mut self.other_config, later.other_config);
        replace(&mut self.protocols, later.protocols);
        replace(&mut self.fail_mode, later.fail_mode);
        nested(&mut self.ssl, later.ssl);
    }
}

impl Overlay for NmSettings {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.name, later.name);
        replace(&mut self.uuid, later.uuid);
        nested(&mut self.passthrough, later.passthrough);
    }
}

impl Overlay for Fields {
    fn overlay(&mut self, later: Self) {
        replace(&mut self.renderer, later.renderer);
        replace(&mut self.dhcp4, later.dhcp4);
        replace(&mut self.dhcp6, later.dhcp6);
        replace(&mut self.addresses, later.addresses);
        replace(&mut self.gateway4, later.gateway4);
        replace(&mut self.gateway6, later.gateway6);
        nested(&mut self.nameservers, later.nameservers);
        replace(&mut self.routes, later.routes);
        replace(&mut self.mtu, later.mtu);
        replace(&mut self.macaddress, later.macaddress);
        nested(&mut self.match_rules, later.match_rules);
        replace(&mut self.set_name, later.set_name);
        replace(&mut self.optional, later.optional);
        replace(&mut self.interfaces, later.interfaces);
        nested(&mut self.parameters, later.parameters);
        replace(&mut self.vlan_id, later.vlan_id);
        replace(&mut self.link, later.link);
        replace(&mut self.mode, later.mode);
        replace(&mut self.local, later.local);
        replace(&mut self.remote, later.remote);
        replace(&mut self.key, later.key);
        merge_access_points(&mut self.access_points, later.access_points);
        nested(&mut self.openvswitch, later.openvswitch);
        nested(&mut self.networkmanager, later.networkmanager);
    }
}

/// Access points merge per SSID, and each SSID's settings overlay.
fn merge_access_points(
    slot: &mut Option<BTreeMap<String, AccessPoint>>,
    later: Option<BTreeMap<String, AccessPoint>>,
) {
    let Some(later) = later else { return };
    let current = slot.get_or_insert_with(BTreeMap::new);
    for (ssid, ap) in later {
        match current.get_mut(&ssid) {
            Some(existing) => existing.overlay(ap),
            None => {
                current.insert(ssid, ap);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_scalar_wins() {
        let mut base = Fields {
            mtu: Some(1500),
            dhcp4: Some(true),
            ..Fields::default()
        };
        base.overlay(Fields {
            mtu: Some(9000),
            ..Fields::default()
        });
        assert_eq!(base.mtu, Some(9000));
        assert_eq!(base.dhcp4, Some(true));
    }

    #[test]
    fn lists_are_replaced_not_unioned() {
        let mut base = Fields {
            addresses: Some(vec!["10.0.0.2/24".to_string()]),
            ..Fields::default()
        };
        base.overlay(Fields {
            addresses: Some(vec!["192.168.1.2/24".to_string()]),
            ..Fields::default()
        });
        assert_eq!(base.addresses, Some(vec!["192.168.1.2/24".to_string()]));
    }

    #[test]
    fn nested_blocks_overlay_per_key() {
        let mut base = Fields {
            nameservers: Some(Nameservers {
                addresses: Some(vec!["8.8.8.8".to_string()]),
                search: None,
            }),
            ..Fields::default()
        };
        base.overlay(Fields {
            nameservers: Some(Nameservers {
                addresses: None,
                search: Some(vec!["lan".to_string()]),
            }),
            ..Fields::default()
        });
        let ns = base.nameservers.expect("nameservers");
        assert_eq!(ns.addresses, Some(vec!["8.8.8.8".to_string()]));
        assert_eq!(ns.search, Some(vec!["lan".to_string()]));
    }

    #[test]
    fn access_points_merge_per_ssid() {
        let ap = |password: &str| AccessPoint {
            password: Some(password.to_string()),
            ..AccessPoint::default()
        };
        let mut base = Fields {
            access_points: Some(BTreeMap::from([
                ("home".to_string(), ap("one")),
                ("work".to_string(), ap("two")),
            ])),
            ..Fields::default()
        };
        base.overlay(Fields {
            access_points: Some(BTreeMap::from([("home".to_string(), ap("three"))])),
            ..Fields::default()
        });
        let aps = base.access_points.expect("access points");
        assert_eq!(aps.len(), 2);
        assert_eq!(aps["home"].password.as_deref(), Some("three"));
        assert_eq!(aps["work"].password.as_deref(), Some("two"));
    }

    #[test]
    fn unset_never_clears() {
        let original = Fields {
            gateway4: Some("10.0.0.1".to_string()),
            ..Fields::default()
        };
        let mut merged = original.clone();
        merged.overlay(Fields::default());
        assert_eq!(merged, original);
    }
}
