//! # Declarative Document Format
//!
//! Decoding and encoding of the YAML document shape:
//!
//! ```yaml
//! network:
//!   version: 2
//!   renderer: networkd
//!   openvswitch: { ... }
//!   ethernets:
//!     eth0:
//!       dhcp4: true
//! ```
//!
//! The YAML grammar itself belongs to `serde_yaml`; this module only walks the
//! resulting value tree. No file I/O happens here.

use crate::primitives::DOCUMENT_VERSION;
use crate::types::scalar::stringify_keys;
use crate::types::{Backend, DefType, Definition, Fields, NetrenderError, OvsSettings};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Everything one document declares, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// `network.renderer`, the default backend.
    pub renderer: Option<Backend>,
    /// `network.openvswitch`, switch-wide settings.
    pub openvswitch: Option<OvsSettings>,
    /// Declared definitions with their file set to the document's origin.
    pub definitions: Vec<Definition>,
}

/// Decode one document. `origin` is used for provenance and error messages.
pub fn parse_document(text: &str, origin: &Path) -> Result<ParsedDocument, NetrenderError> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| NetrenderError::ParseError(format!("{}: {}", origin.display(), e)))?;

    let schema = |msg: String| NetrenderError::SchemaError(format!("{}: {}", origin.display(), msg));

    let top = match stringify_keys(value) {
        Value::Null => return Ok(ParsedDocument::default()),
        Value::Mapping(top) => top,
        _ => return Err(schema("expected a mapping at top level".to_string())),
    };

    let mut doc = ParsedDocument::default();
    if !top.contains_key("network") {
        return Err(schema("missing 'network' key".to_string()));
    }
    for (key, value) in top {
        match key.as_str() {
            Some("network") => decode_network(value, origin, &mut doc)?,
            Some(other) => return Err(schema(format!("unknown key '{}'", other))),
            None => return Err(schema("top-level keys must be strings".to_string())),
        }
    }
    Ok(doc)
}

fn decode_network(
    value: Value,
    origin: &Path,
    doc: &mut ParsedDocument,
) -> Result<(), NetrenderError> {
    let schema = |msg: String| NetrenderError::SchemaError(format!("{}: {}", origin.display(), msg));

    let network = match value {
        Value::Null => return Ok(()),
        Value::Mapping(network) => network,
        _ => return Err(schema("'network' must be a mapping".to_string())),
    };

    for (key, value) in network {
        let Some(key) = key.as_str() else {
            return Err(schema("keys under 'network' must be strings".to_string()));
        };
        match key {
            "version" => {
                if value.as_u64() != Some(DOCUMENT_VERSION) {
                    return Err(schema(format!(
                        "only network.version {} is supported",
                        DOCUMENT_VERSION
                    )));
                }
            }
            "renderer" => {
                let backend: Backend = serde_yaml::from_value(value)
                    .map_err(|e| schema(format!("network.renderer: {}", e)))?;
                doc.renderer = Some(backend);
            }
            "openvswitch" => {
                let settings: OvsSettings = serde_yaml::from_value(value)
                    .map_err(|e| schema(format!("network.openvswitch: {}", e)))?;
                doc.openvswitch = Some(settings);
            }
            section => {
                let def_type = DefType::from_section(section)
                    .ok_or_else(|| schema(format!("unknown key '{}'", section)))?;
                decode_section(def_type, value, origin, doc)?;
            }
        }
    }
    Ok(())
}

fn decode_section(
    def_type: DefType,
    value: Value,
    origin: &Path,
    doc: &mut ParsedDocument,
) -> Result<(), NetrenderError> {
    let schema = |msg: String| NetrenderError::SchemaError(format!("{}: {}", origin.display(), msg));

    let entries = match value {
        Value::Null => return Ok(()),
        Value::Mapping(entries) => entries,
        _ => return Err(schema(format!("'{}' must be a mapping", def_type))),
    };

    for (id, body) in entries {
        let id = id
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| schema(format!("{}: definition IDs must be non-empty strings", def_type)))?
            .to_string();

        let fields: Fields = match body {
            Value::Null => Fields::default(),
            body => serde_yaml::from_value(body)
                .map_err(|e| schema(format!("{}: {}", id, e)))?,
        };

        if let Some(key) = fields.foreign_keys(def_type).first() {
            return Err(schema(format!(
                "{}: key '{}' is not valid for {}",
                id, key, def_type
            )));
        }

        doc.definitions.push(Definition {
            id,
            def_type,
            filename: Some(origin.to_path_buf()),
            fields,
        });
    }
    Ok(())
}

/// Build the document value for a set of definitions.
///
/// Sections appear in the order their first definition appears; definitions
/// keep the order given.
pub fn encode_document<'a>(
    renderer: Option<Backend>,
    openvswitch: Option<&OvsSettings>,
    definitions: impl IntoIterator<Item = &'a Definition>,
) -> Result<Value, NetrenderError> {
    let encode = |e: serde_yaml::Error| NetrenderError::WriteError(format!("YAML encoding: {}", e));

    let mut network = Mapping::new();
    network.insert(
        Value::from("version"),
        serde_yaml::to_value(DOCUMENT_VERSION).map_err(encode)?,
    );
    if let Some(renderer) = renderer {
        network.insert(Value::from("renderer"), Value::from(renderer.as_str()));
    }
    if let Some(ovs) = openvswitch.filter(|ovs| !ovs.is_empty()) {
        network.insert(
            Value::from("openvswitch"),
            serde_yaml::to_value(ovs).map_err(encode)?,
        );
    }

    let mut sections: Vec<(DefType, Mapping)> = Vec::new();
    for def in definitions {
        let body = serde_yaml::to_value(&def.fields).map_err(encode)?;
        let idx = match sections.iter().position(|(t, _)| *t == def.def_type) {
            Some(idx) => idx,
            None => {
                sections.push((def.def_type, Mapping::new()));
                sections.len() - 1
            }
        };
        sections[idx].1.insert(Value::from(def.id.as_str()), body);
    }
    for (def_type, entries) in sections {
        network.insert(Value::from(def_type.section()), Value::Mapping(entries));
    }

    let mut top = Mapping::new();
    top.insert(Value::from("network"), Value::Mapping(network));
    Ok(Value::Mapping(top))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedDocument, NetrenderError> {
        parse_document(text, Path::new("/etc/netplan/test.yaml"))
    }

    #[test]
    fn parses_sections_in_order() {
        let doc = parse(
            "network:\n  version: 2\n  renderer: networkd\n  ethernets:\n    eth1: {}\n    eth0:\n      dhcp4: true\n  bridges:\n    br0:\n      interfaces: [eth1]\n",
        )
        .expect("parse");

        assert_eq!(doc.renderer, Some(Backend::Networkd));
        let ids: Vec<_> = doc.definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["eth1", "eth0", "br0"]);
        assert_eq!(doc.definitions[1].fields.dhcp4, Some(true));
        assert_eq!(doc.definitions[2].def_type, DefType::Bridge);
    }

    #[test]
    fn empty_document_is_accepted() {
        assert_eq!(parse("").expect("parse"), ParsedDocument::default());
        assert_eq!(parse("network:\n").expect("parse"), ParsedDocument::default());
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse("network: [unclosed").expect_err("must fail");
        assert!(matches!(err, NetrenderError::ParseError(_)));
    }

    #[test]
    fn unknown_field_is_schema_error() {
        let err = parse("network:\n  ethernets:\n    eth0:\n      dhcp5: true\n")
            .expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(_)));
    }

    #[test]
    fn key_foreign_to_section_is_schema_error() {
        let err = parse("network:\n  ethernets:\n    eth0:\n      interfaces: [eth1]\n")
            .expect_err("must fail");
        assert!(
            matches!(err, NetrenderError::SchemaError(ref msg) if msg.contains("'interfaces'"))
        );
    }

    #[test]
    fn document_without_network_is_rejected() {
        let err = parse("{}\n").expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(ref msg) if msg.contains("'network'")));
    }

    #[test]
    fn numeric_scalars_decode_as_text() {
        let doc = parse(
            "network:\n  tunnels:\n    tun0:\n      mode: gre\n      local: 10.0.0.1\n      remote: 10.0.0.2\n      key: 1234\n  wifis:\n    wl0:\n      access-points:\n        1234:\n          password: 12345678\n",
        )
        .expect("parse");

        assert_eq!(doc.definitions[0].fields.key.as_deref(), Some("1234"));
        let aps = doc.definitions[1].fields.access_points.as_ref().expect("aps");
        assert_eq!(aps["1234"].password.as_deref(), Some("12345678"));
    }

    #[test]
    fn yaml_boolean_spellings_are_accepted() {
        let doc = parse(
            "network:\n  ethernets:\n    eth0:\n      dhcp4: yes\n      dhcp6: off\n      optional: On\n  bridges:\n    br0:\n      parameters:\n        stp: n\n",
        )
        .expect("parse");

        let eth0 = &doc.definitions[0].fields;
        assert_eq!(eth0.dhcp4, Some(true));
        assert_eq!(eth0.dhcp6, Some(false));
        assert_eq!(eth0.optional, Some(true));
        let params = doc.definitions[1].fields.parameters.as_ref().expect("parameters");
        assert_eq!(params.stp, Some(false));
    }

    #[test]
    fn invalid_boolean_is_schema_error() {
        let err = parse("network:\n  ethernets:\n    eth0:\n      dhcp4: maybe\n")
            .expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(ref msg) if msg.contains("maybe")));
    }

    #[test]
    fn numeric_definition_id_is_accepted() {
        let doc = parse("network:\n  vlans:\n    100:\n      id: 100\n      link: eth0\n")
            .expect("parse");
        assert_eq!(doc.definitions[0].id, "100");
        assert_eq!(doc.definitions[0].fields.vlan_id, Some(100));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = parse("network:\n  version: 1\n").expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(_)));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = parse("network:\n  modems:\n    m0: {}\n").expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(_)));
    }

    #[test]
    fn encode_groups_by_first_appearance() {
        let mut br = Definition::new("br0", DefType::Bridge);
        br.fields.interfaces = Some(vec!["eth0".to_string()]);
        let eth = Definition::new("eth0", DefType::Ethernet);

        let value = encode_document(Some(Backend::Networkd), None, [&br, &eth]).expect("encode");
        let text = serde_yaml::to_string(&value).expect("to string");

        let bridges = text.find("bridges:").expect("bridges");
        let ethernets = text.find("ethernets:").expect("ethernets");
        assert!(bridges < ethernets);
        assert!(text.contains("renderer: networkd"));
        assert!(text.contains("version: 2"));
    }
}
