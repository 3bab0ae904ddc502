//! # Open vSwitch Renderer
//!
//! Every definition resolved to Open vSwitch becomes a oneshot unit
//! `run/systemd/system/netplan-ovs-<id>.service` whose `ExecStart=` lines
//! drive `ovs-vsctl`. Switch-wide settings go into
//! `netplan-ovs-cleanup.service`, written once after all definitions.

use super::files::{unlink_matching, write_file};
use super::unit::UnitFile;
use super::{Renderer, handles};
use crate::primitives::{OVS_CLEANUP_UNIT, OVS_PREFIX, OVS_UNIT_DIR, OVS_VSCTL};
use crate::state::State;
use crate::types::{Backend, DefType, Definition, NetrenderError, OvsSettings};
use std::path::Path;

#[derive(Debug, Default)]
pub struct OvsRenderer {
    written: usize,
}

impl OvsRenderer {
    /// Definitions written since this renderer was created.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Renderer for OvsRenderer {
    fn backend(&self) -> Backend {
        Backend::OpenVSwitch
    }

    fn write_definition(
        &mut self,
        state: &State,
        def: &Definition,
        root: &Path,
    ) -> Result<bool, NetrenderError> {
        if !handles(state, def, Backend::OpenVSwitch) {
            return Ok(false);
        }

        let commands = commands(state, def)?;
        let mut unit = unit_header(&format!("OpenVSwitch configuration for {}", def.id));
        for command in &commands {
            unit.entry("ExecStart", format!("{} {}", OVS_VSCTL, command));
        }

        let rel = format!("{}/{}{}.service", OVS_UNIT_DIR, OVS_PREFIX, def.id);
        write_file(root, &rel, &unit.render())?;
        self.written += 1;
        Ok(true)
    }

    fn finish(&mut self, state: &State, root: &Path) -> Result<(), NetrenderError> {
        if self.written == 0 {
            return Ok(());
        }

        let mut unit = unit_header("OpenVSwitch configuration for cleanup");
        if let Some(global) = state.ovs_settings() {
            for (key, value) in global.external_ids.iter().flatten() {
                unit.entry(
                    "ExecStart",
                    format!(
                        "{} set Open_vSwitch . {}",
                        OVS_VSCTL,
                        exec_arg(&format!("external-ids:{}={}", key, value))
                    ),
                );
            }
            for (key, value) in global.other_config.iter().flatten() {
                unit.entry(
                    "ExecStart",
                    format!(
                        "{} set Open_vSwitch . {}",
                        OVS_VSCTL,
                        exec_arg(&format!("other-config:{}={}", key, value))
                    ),
                );
            }
            if let Some(ssl) = &global.ssl {
                if let (Some(key), Some(cert), Some(ca)) = (
                    ssl.private_key.as_deref(),
                    ssl.certificate.as_deref(),
                    ssl.ca_cert.as_deref(),
                ) {
                    unit.entry(
                        "ExecStart",
                        format!(
                            "{} set-ssl {} {} {}",
                            OVS_VSCTL,
                            exec_arg(key),
                            exec_arg(cert),
                            exec_arg(ca)
                        ),
                    );
                }
            }
        }

        write_file(root, &format!("{}/{}", OVS_UNIT_DIR, OVS_CLEANUP_UNIT), &unit.render())?;
        Ok(())
    }

    fn cleanup(&self, root: &Path) -> Result<(), NetrenderError> {
        unlink_matching(root, OVS_UNIT_DIR, OVS_PREFIX, "")?;
        Ok(())
    }
}

/// One `ExecStart=` argument. systemd splits on whitespace and expands `%`
/// specifiers, so those are escaped and such arguments double-quoted.
fn exec_arg(arg: &str) -> String {
    let arg = arg.replace('%', "%%");
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\')) {
        let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        arg
    }
}

fn unit_header(description: &str) -> UnitFile {
    let mut unit = UnitFile::new();
    unit.section("Unit")
        .entry("Description", description)
        .entry("DefaultDependencies", "no")
        .entry("Wants", "ovsdb-server.service")
        .entry("After", "ovsdb-server.service")
        .entry("Before", "network.target");
    unit.section("Service").entry("Type", "oneshot");
    unit
}

/// The interface name a member is attached under.
fn port_name<'a>(state: &'a State, id: &'a str) -> &'a str {
    state
        .get_definition(id)
        .and_then(|def| def.interface_name())
        .unwrap_or(id)
}

/// `ovs-vsctl` arguments for one definition, in execution order.
fn commands(state: &State, def: &Definition) -> Result<Vec<String>, NetrenderError> {
    let mut out = Vec::new();
    let own = def.fields.openvswitch.as_ref();
    let global = state.ovs_settings();

    let table = match def.def_type {
        DefType::Bridge => {
            out.push(format!("--may-exist add-br {}", def.id));
            for member in def.fields.interfaces.iter().flatten() {
                let is_bond = state
                    .get_definition(member)
                    .is_some_and(|m| m.def_type == DefType::Bond);
                if !is_bond {
                    out.push(format!(
                        "--may-exist add-port {} {}",
                        def.id,
                        port_name(state, member)
                    ));
                }
            }

            let protocols = own
                .and_then(|o| o.protocols.as_ref())
                .or_else(|| global.and_then(|g| g.protocols.as_ref()));
            if let Some(protocols) = protocols.filter(|p| !p.is_empty()) {
                out.push(format!("set Bridge {} protocols={}", def.id, protocols.join(",")));
            }
            let fail_mode = own
                .and_then(|o| o.fail_mode.as_deref())
                .or_else(|| global.and_then(|g| g.fail_mode.as_deref()));
            if let Some(fail_mode) = fail_mode {
                out.push(format!("set-fail-mode {} {}", def.id, fail_mode));
            }
            "Bridge"
        }
        DefType::Bond => {
            let bridge = state
                .parent_of(&def.id)
                .filter(|parent| parent.def_type == DefType::Bridge)
                .ok_or_else(|| {
                    NetrenderError::WriteError(format!(
                        "{}: Open vSwitch bond must be a member of a bridge",
                        def.id
                    ))
                })?;
            let members: Vec<&str> = def
                .fields
                .interfaces
                .iter()
                .flatten()
                .map(|m| port_name(state, m))
                .collect();
            out.push(format!(
                "--may-exist add-bond {} {} {}",
                bridge.id,
                def.id,
                members.join(" ")
            ));
            if let Some(mode) = def.fields.parameters.as_ref().and_then(|p| p.mode.as_deref()) {
                out.push(format!("set Port {} bond_mode={}", def.id, mode));
            }
            "Port"
        }
        DefType::Ethernet | DefType::Wifi | DefType::Vlan | DefType::Tunnel => "Interface",
    };

    let name = def.interface_name().unwrap_or(def.id.as_str());
    out.push(format!("set {} {} external-ids:netplan=true", table, name));
    if let Some(own) = own {
        settings(&mut out, table, name, own);
    }
    Ok(out)
}

fn settings(out: &mut Vec<String>, table: &str, name: &str, ovs: &OvsSettings) {
    for (key, value) in ovs.external_ids.iter().flatten() {
        let arg = exec_arg(&format!("external-ids:{}={}", key, value));
        out.push(format!("set {} {} {}", table, name, arg));
    }
    for (key, value) in ovs.other_config.iter().flatten() {
        let arg = exec_arg(&format!("other-config:{}={}", key, value));
        out.push(format!("set {} {} {}", table, name, arg));
    }
}

// =============================================================================
// TESTS
// =============================================================================
