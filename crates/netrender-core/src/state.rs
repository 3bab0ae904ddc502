//! # Canonical State
//!
//! The validated, committed set of definitions that renderers and the YAML
//! serializer consume.
//!
//! ## Import
//!
//! [`State::import_from`] builds the merged result on the side, checks it, and
//! only then swaps it in. A failed import leaves the state exactly as it was.
//!
//! ## Ordering
//!
//! Definitions are stored in a `BTreeMap` for lookup and a `Vec` for
//! first-insertion order. Re-importing an existing ID keeps its position.

use crate::merge::Overlay;
use crate::parser::Parser;
use crate::primitives::{wifi_freq_5, wifi_freq_24};
use crate::types::{Backend, DefType, Definition, NetrenderError, OvsSettings};
use std::collections::BTreeMap;
use std::path::Path;

/// Tunnel modes accepted under `tunnels.<id>.mode`.
const TUNNEL_MODES: [&str; 11] = [
    "sit", "gre", "ip6gre", "ipip", "ipip6", "ip6ip6", "vti", "vti6", "gretap", "ip6gretap",
    "isatap",
];

/// Tunnel modes that take a `key`.
const KEYED_TUNNEL_MODES: [&str; 6] = ["gre", "gretap", "ip6gre", "ip6gretap", "vti", "vti6"];

/// Access point modes accepted under `access-points.<ssid>.mode`.
const AP_MODES: [&str; 3] = ["infrastructure", "adhoc", "ap"];

/// Highest usable 802.1Q tag.
const MAX_VLAN_ID: u16 = 4094;

/// The committed definition set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    defs: BTreeMap<String, Definition>,
    order: Vec<String>,
    backend: Option<Backend>,
    openvswitch: Option<OvsSettings>,
}

impl State {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // IMPORT
    // =========================================================================

    /// Validate everything pending in `parser` and commit it.
    ///
    /// On success the parser is drained and the full definition map is
    /// returned. On failure both the state and the parser are untouched.
    pub fn import_from(
        &mut self,
        parser: &mut Parser,
    ) -> Result<&BTreeMap<String, Definition>, NetrenderError> {
        let mut merged = self.defs.clone();
        let mut order = self.order.clone();

        for pending in parser.definitions() {
            for reference in pending.references() {
                if !parser.contains(reference) {
                    return Err(NetrenderError::UnresolvedReference {
                        id: pending.id.clone(),
                        reference: reference.to_string(),
                    });
                }
            }

            match merged.get_mut(&pending.id) {
                Some(existing) => {
                    if existing.def_type != pending.def_type {
                        return Err(NetrenderError::SchemaError(format!(
                            "{}: cannot change device type from {} to {}",
                            pending.id, existing.def_type, pending.def_type
                        )));
                    }
                    existing.fields.overlay(pending.fields.clone());
                    if pending.filename.is_some() {
                        existing.filename.clone_from(&pending.filename);
                    }
                }
                None => {
                    order.push(pending.id.clone());
                    merged.insert(pending.id.clone(), pending.clone());
                }
            }
        }

        for pending in parser.definitions() {
            if let Some(def) = merged.get(&pending.id) {
                validate(def)?;
            }
        }
        check_membership(&merged, &order)?;

        let drained = parser.drain();
        tracing::debug!(
            "Imported {} definitions ({} total)",
            drained.definitions.len(),
            order.len()
        );

        self.defs = merged;
        self.order = order;
        if drained.renderer.is_some() {
            self.backend = drained.renderer;
        }
        if let Some(ovs) = drained.openvswitch {
            match self.openvswitch.as_mut() {
                Some(current) => current.overlay(ovs),
                None => self.openvswitch = Some(ovs),
            }
        }

        Ok(&self.defs)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Look up a committed definition.
    #[must_use]
    pub fn get_definition(&self, id: &str) -> Option<&Definition> {
        self.defs.get(id)
    }

    /// Committed definitions in first-insertion order.
    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.order.iter().filter_map(|id| self.defs.get(id))
    }

    /// Number of committed definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// IDs of every definition of `def_type`, in insertion order.
    #[must_use]
    pub fn ids_for_type(&self, def_type: DefType) -> Vec<&str> {
        self.definitions()
            .filter(|def| def.def_type == def_type)
            .map(|def| def.id.as_str())
            .collect()
    }

    /// The file `id` was last declared in.
    #[must_use]
    pub fn filename_of(&self, id: &str) -> Option<&Path> {
        self.defs.get(id).and_then(|def| def.filename.as_deref())
    }

    /// The bridge or bond that lists `id` as a member.
    #[must_use]
    pub fn parent_of(&self, id: &str) -> Option<&Definition> {
        self.definitions().find(|def| {
            def.def_type.has_members()
                && def.fields.interfaces.iter().flatten().any(|m| m == id)
        })
    }

    /// VLANs whose `link` is `id`.
    #[must_use]
    pub fn vlans_on(&self, id: &str) -> Vec<&Definition> {
        self.definitions()
            .filter(|def| def.def_type == DefType::Vlan && def.fields.link.as_deref() == Some(id))
            .collect()
    }

    // =========================================================================
    // BACKEND SELECTION
    // =========================================================================

    /// The state-wide default backend.
    #[must_use]
    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    /// Replace the state-wide default backend.
    pub fn set_default_backend(&mut self, backend: Backend) {
        self.backend = Some(backend);
    }

    /// Switch-wide Open vSwitch settings.
    #[must_use]
    pub fn ovs_settings(&self) -> Option<&OvsSettings> {
        self.openvswitch.as_ref()
    }

    /// The backend `def` renders for: its own `renderer`, else the state
    /// default. `None` means no renderer handles it.
    #[must_use]
    pub fn resolve_backend(&self, def: &Definition) -> Option<Backend> {
        def.fields.renderer.or(self.backend)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Clear everything, including global settings.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn schema(def: &Definition, msg: impl std::fmt::Display) -> NetrenderError {
    let origin = def
        .filename
        .as_deref()
        .map(|p| format!("{}: ", p.display()))
        .unwrap_or_default();
    NetrenderError::SchemaError(format!("{}{}: {}", origin, def.id, msg))
}

/// Type-specific checks on a fully merged definition.
fn validate(def: &Definition) -> Result<(), NetrenderError> {
    let fields = &def.fields;

    if fields.set_name.is_some() && fields.match_rules.is_none() {
        return Err(schema(def, "'set-name' requires 'match'"));
    }

    match def.def_type {
        DefType::Vlan => {
            let id = fields.vlan_id.ok_or_else(|| schema(def, "missing 'id' property"))?;
            if id > MAX_VLAN_ID {
                return Err(schema(def, format!("invalid id '{}'", id)));
            }
            let keyfile_parent = fields
                .networkmanager
                .as_ref()
                .and_then(|nm| nm.passthrough.as_ref())
                .is_some_and(|p| p.contains_key("vlan.parent"));
            if fields.link.is_none() && !keyfile_parent {
                return Err(schema(def, "missing 'link' property"));
            }
        }
        DefType::Tunnel => {
            let mode = fields
                .mode
                .as_deref()
                .ok_or_else(|| schema(def, "missing 'mode' property for tunnel"))?;
            if !TUNNEL_MODES.contains(&mode) {
                return Err(schema(def, format!("tunnel mode '{}' is not supported", mode)));
            }
            if fields.local.is_none() {
                return Err(schema(def, "missing 'local' property for tunnel"));
            }
            if fields.remote.is_none() {
                return Err(schema(def, "missing 'remote' property for tunnel"));
            }
            if fields.key.is_some() && !KEYED_TUNNEL_MODES.contains(&mode) {
                return Err(schema(
                    def,
                    format!("'key' is not supported for tunnel mode '{}'", mode),
                ));
            }
        }
        DefType::Wifi => {
            if fields.access_points.as_ref().is_none_or(BTreeMap::is_empty) {
                return Err(schema(def, "no access points defined"));
            }
            for (ssid, ap) in fields.access_points.iter().flatten() {
                if let Some(mode) = ap.mode.as_deref() {
                    if !AP_MODES.contains(&mode) {
                        return Err(schema(
                            def,
                            format!("access point '{}': unknown mode '{}'", ssid, mode),
                        ));
                    }
                }
                let freq = match (ap.band.as_deref(), ap.channel) {
                    (None, None) => continue,
                    (None, Some(_)) => {
                        return Err(schema(
                            def,
                            format!("access point '{}': 'channel' requires 'band'", ssid),
                        ));
                    }
                    (Some("2.4GHz"), Some(ch)) => wifi_freq_24(ch),
                    (Some("5GHz"), Some(ch)) => wifi_freq_5(ch),
                    (Some("2.4GHz" | "5GHz"), None) => continue,
                    (Some(band), _) => {
                        return Err(schema(
                            def,
                            format!("access point '{}': unknown band '{}'", ssid, band),
                        ));
                    }
                };
                if freq.is_none() {
                    return Err(schema(
                        def,
                        format!("access point '{}': invalid channel for its band", ssid),
                    ));
                }
            }
        }
        DefType::Ethernet | DefType::Bridge | DefType::Bond => {}
    }
    Ok(())
}

/// An interface may belong to at most one bridge or bond, and a member
/// reference must name a definition in the merged set.
fn check_membership(
    merged: &BTreeMap<String, Definition>,
    order: &[String],
) -> Result<(), NetrenderError> {
    let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
    for def in order.iter().filter_map(|id| merged.get(id)) {
        if !def.def_type.has_members() {
            continue;
        }
        for member in def.fields.interfaces.iter().flatten() {
            if member == &def.id {
                return Err(schema(def, "cannot be a member of itself"));
            }
            if let Some(previous) = owner.insert(member, &def.id) {
                if previous != def.id {
                    return Err(schema(
                        def,
                        format!(
                            "interface '{}' is already assigned to '{}'",
                            member, previous
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
