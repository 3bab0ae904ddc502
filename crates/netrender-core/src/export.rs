//! # YAML Export
//!
//! Writes committed definitions back out as declarative documents that the
//! parser accepts again. Only explicitly set fields are emitted, so a
//! parse, import and export cycle yields the same definitions.

use crate::formats::encode_document;
use crate::primitives::{NETWORKD_PREFIX, YAML_OUTPUT_DIR};
use crate::render::files::write_file;
use crate::state::State;
use crate::types::{Definition, NetrenderError};
use std::path::{Path, PathBuf};

fn to_text(value: &serde_yaml::Value) -> Result<String, NetrenderError> {
    serde_yaml::to_string(value)
        .map_err(|e| NetrenderError::WriteError(format!("YAML encoding: {}", e)))
}

/// One definition as a standalone document.
pub fn definition_to_yaml(def: &Definition) -> Result<String, NetrenderError> {
    to_text(&encode_document(None, None, [def])?)
}

/// Write one definition to `etc/netplan/10-netplan-<id>.yaml` under `root`.
pub fn write_definition_yaml(def: &Definition, root: &Path) -> Result<PathBuf, NetrenderError> {
    let rel = format!("{}/{}{}.yaml", YAML_OUTPUT_DIR, NETWORKD_PREFIX, def.id);
    write_file(root, &rel, &definition_to_yaml(def)?)
}

/// The whole state as one document, global settings included.
pub fn state_to_yaml(state: &State) -> Result<String, NetrenderError> {
    to_text(&encode_document(
        state.backend(),
        state.ovs_settings(),
        state.definitions(),
    )?)
}

/// Write the whole state to `etc/netplan/<file_hint>` under `root`.
///
/// `.yaml` is appended when the hint lacks it. The hint must be a bare file
/// name.
pub fn write_state_yaml(
    state: &State,
    file_hint: &str,
    root: &Path,
) -> Result<PathBuf, NetrenderError> {
    if file_hint.is_empty() || file_hint.contains('/') {
        return Err(NetrenderError::WriteError(format!(
            "invalid output file name '{}'",
            file_hint
        )));
    }
    let name = if file_hint.ends_with(".yaml") {
        file_hint.to_string()
    } else {
        format!("{}.yaml", file_hint)
    };
    write_file(root, &format!("{}/{}", YAML_OUTPUT_DIR, name), &state_to_yaml(state)?)
}
