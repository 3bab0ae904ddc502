//! # Parser Accumulator
//!
//! Collects definitions from any number of documents before they are imported
//! into a [`State`](crate::State).
//!
//! - Re-declared IDs are overlaid field by field (see [`crate::merge`])
//! - First-seen order is kept for deterministic output
//! - A failed load leaves the accumulator in an unspecified state; callers
//!   reset it or throw it away instead of retrying

use crate::formats::{Keyfile, definition_from_keyfile, parse_document};
use crate::merge::Overlay;
use crate::primitives::{HIERARCHY_DIRS, MAX_DOCUMENT_SIZE};
use crate::types::{Backend, DefType, Definition, NetrenderError, OvsSettings};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The transient working set built from input documents.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    /// ID -> partially resolved definition.
    defs: BTreeMap<String, Definition>,
    /// IDs in first-seen order.
    order: Vec<String>,
    /// Last `network.renderer` seen.
    renderer: Option<Backend>,
    /// Overlay of every `network.openvswitch` seen.
    openvswitch: Option<OvsSettings>,
    /// Files consumed so far, in load order.
    sources: Vec<PathBuf>,
}

/// What an import takes out of a parser.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) definitions: Vec<Definition>,
    pub(crate) renderer: Option<Backend>,
    pub(crate) openvswitch: Option<OvsSettings>,
}

impl Parser {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Load one file, choosing the format from its extension.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), NetrenderError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => self.load_yaml(path),
            Some("nmconnection" | "keyfile") => self.load_keyfile(path),
            _ => Err(NetrenderError::SchemaError(format!(
                "{}: unsupported file type",
                path.display()
            ))),
        }
    }

    /// Load one YAML document.
    pub fn load_yaml(&mut self, path: impl AsRef<Path>) -> Result<(), NetrenderError> {
        let path = path.as_ref();
        tracing::debug!("Processing input file {}", path.display());
        let text = read_document(path)?;
        self.load_yaml_str(&text, path)
    }

    /// Load YAML text as if it had been read from `origin`.
    pub fn load_yaml_str(&mut self, text: &str, origin: &Path) -> Result<(), NetrenderError> {
        let doc = parse_document(text, origin)?;

        if doc.renderer.is_some() {
            self.renderer = doc.renderer;
        }
        if let Some(ovs) = doc.openvswitch {
            match self.openvswitch.as_mut() {
                Some(current) => current.overlay(ovs),
                None => self.openvswitch = Some(ovs),
            }
        }
        for def in doc.definitions {
            self.absorb(def)?;
        }
        self.sources.push(origin.to_path_buf());
        Ok(())
    }

    /// Load one NetworkManager keyfile as a single definition.
    pub fn load_keyfile(&mut self, path: impl AsRef<Path>) -> Result<(), NetrenderError> {
        let path = path.as_ref();
        tracing::debug!("Processing keyfile {}", path.display());
        let text = read_document(path)?;
        let keyfile = Keyfile::parse(&text).map_err(|e| match e {
            NetrenderError::ParseError(msg) => {
                NetrenderError::ParseError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        let mut def = definition_from_keyfile(&keyfile, path)?;
        if def.def_type == DefType::Vlan {
            self.resolve_vlan_parent(&mut def);
        }
        self.absorb(def)?;
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    /// Load every document of the search hierarchy under `root`.
    ///
    /// Returns the number of files loaded. The first failure aborts the walk;
    /// files loaded before it stay merged.
    pub fn load_hierarchy(&mut self, root: impl AsRef<Path>) -> Result<usize, NetrenderError> {
        let files = hierarchy_files(root.as_ref())?;
        for file in &files {
            self.load_yaml(file)?;
        }
        Ok(files.len())
    }

    /// Turn a keyfile's `vlan.parent` into a `link` when it names a known
    /// definition, by ID or by interface name. Otherwise it stays passthrough.
    fn resolve_vlan_parent(&self, def: &mut Definition) {
        let Some(nm) = def.fields.networkmanager.as_mut() else {
            return;
        };
        let Some(passthrough) = nm.passthrough.as_mut() else {
            return;
        };
        let Some(parent) = passthrough.get("vlan.parent") else {
            return;
        };
        let link = match self.defs.get(parent) {
            Some(known) => known.id.clone(),
            None => match self
                .definitions()
                .find(|known| known.interface_name() == Some(parent.as_str()))
            {
                Some(known) => known.id.clone(),
                None => return,
            },
        };

        passthrough.remove("vlan.parent");
        if passthrough.is_empty() {
            nm.passthrough = None;
        }
        def.fields.link = Some(link);
    }

    /// Merge one declaration into the working set.
    fn absorb(&mut self, def: Definition) -> Result<(), NetrenderError> {
        match self.defs.get_mut(&def.id) {
            Some(existing) => {
                if existing.def_type != def.def_type {
                    return Err(NetrenderError::SchemaError(format!(
                        "{}: updated definition '{}' changes device type from {} to {}",
                        def.filename
                            .as_deref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                        def.id,
                        existing.def_type,
                        def.def_type
                    )));
                }
                existing.fields.overlay(def.fields);
                if def.filename.is_some() {
                    existing.filename = def.filename;
                }
            }
            None => {
                self.order.push(def.id.clone());
                self.defs.insert(def.id.clone(), def);
            }
        }
        Ok(())
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Look up a pending definition.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Definition> {
        self.defs.get(id)
    }

    /// True if `id` has been declared.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.defs.contains_key(id)
    }

    /// Pending definitions in first-seen order.
    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.order.iter().filter_map(|id| self.defs.get(id))
    }

    /// Number of pending definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Last `network.renderer` seen.
    #[must_use]
    pub fn renderer(&self) -> Option<Backend> {
        self.renderer
    }

    /// Accumulated switch-wide Open vSwitch settings.
    #[must_use]
    pub fn openvswitch(&self) -> Option<&OvsSettings> {
        self.openvswitch.as_ref()
    }

    /// Files consumed so far.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Discard the working set. Idempotent.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Take everything out, leaving the accumulator empty.
    pub(crate) fn drain(&mut self) -> Drained {
        let mut parser = std::mem::take(self);
        let definitions = parser
            .order
            .iter()
            .filter_map(|id| parser.defs.remove(id))
            .collect();
        Drained {
            definitions,
            renderer: parser.renderer,
            openvswitch: parser.openvswitch,
        }
    }
}

/// Read a document, refusing oversized files.
fn read_document(path: &Path) -> Result<String, NetrenderError> {
    let io = |e: std::io::Error| NetrenderError::IoError(format!("{}: {}", path.display(), e));
    let metadata = std::fs::metadata(path).map_err(io)?;
    if metadata.len() > MAX_DOCUMENT_SIZE {
        return Err(NetrenderError::IoError(format!(
            "{}: file size {} bytes exceeds maximum allowed {} bytes",
            path.display(),
            metadata.len(),
            MAX_DOCUMENT_SIZE
        )));
    }
    std::fs::read_to_string(path).map_err(io)
}

/// The documents of the search hierarchy under `root`, in load order.
///
/// Files in `run/` shadow same-named files in `etc/`, which shadow those in
/// `lib/`. The survivors are ordered by basename, so `90-a.yaml` always loads
/// after `10-b.yaml` whatever directory each lives in.
pub fn hierarchy_files(root: &Path) -> Result<Vec<PathBuf>, NetrenderError> {
    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();

    for dir in HIERARCHY_DIRS {
        let dir = root.join(dir);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(NetrenderError::IoError(format!(
                    "{}: {}",
                    dir.display(),
                    e
                )));
            }
        };
        for entry in entries {
            let entry = entry
                .map_err(|e| NetrenderError::IoError(format!("{}: {}", dir.display(), e)))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".yaml") && path.is_file() {
                by_name.insert(name.to_string(), path);
            }
        }
    }

    Ok(by_name.into_values().collect())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, text).expect("write");
        path
    }

    #[test]
    fn later_document_overlays_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write(dir.path(), "a.yaml", "network:\n  ethernets:\n    eth0:\n      mtu: 1500\n      dhcp4: true\n");
        let b = write(dir.path(), "b.yaml", "network:\n  ethernets:\n    eth0:\n      mtu: 9000\n");

        let mut parser = Parser::new();
        parser.load(&a).expect("load a");
        parser.load(&b).expect("load b");

        let eth0 = parser.get("eth0").expect("eth0");
        assert_eq!(eth0.fields.mtu, Some(9000));
        assert_eq!(eth0.fields.dhcp4, Some(true));
        assert_eq!(eth0.filename.as_deref(), Some(b.as_path()));
        assert_eq!(parser.len(), 1);
    }

    #[test]
    fn type_change_is_rejected() {
        let mut parser = Parser::new();
        parser
            .load_yaml_str("network:\n  ethernets:\n    x0: {}\n", Path::new("a.yaml"))
            .expect("first");
        let err = parser
            .load_yaml_str("network:\n  bridges:\n    x0: {}\n", Path::new("b.yaml"))
            .expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut parser = Parser::new();
        let err = parser.load("/nonexistent/netrender/a.yaml").expect_err("must fail");
        assert!(matches!(err, NetrenderError::IoError(_)));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let mut parser = Parser::new();
        assert!(matches!(
            parser.load("/tmp/config.json"),
            Err(NetrenderError::SchemaError(_))
        ));
    }

    #[test]
    fn hierarchy_shadows_by_basename_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "lib/netplan/50-base.yaml", "network: {}\n");
        let etc_base = write(dir.path(), "etc/netplan/50-base.yaml", "network: {}\n");
        let run_early = write(dir.path(), "run/netplan/10-early.yaml", "network: {}\n");
        write(dir.path(), "etc/netplan/notes.txt", "ignored");

        let files = hierarchy_files(dir.path()).expect("files");
        assert_eq!(files, vec![run_early, etc_base]);
    }

    #[test]
    fn hierarchy_without_directories_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut parser = Parser::new();
        assert_eq!(parser.load_hierarchy(dir.path()).expect("load"), 0);
        assert!(parser.is_empty());
    }

    #[test]
    fn hierarchy_failure_keeps_earlier_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "etc/netplan/10-good.yaml", "network:\n  ethernets:\n    eth0: {}\n");
        write(dir.path(), "etc/netplan/20-bad.yaml", "network:\n  ethernets:\n    eth1:\n      bogus: 1\n");

        let mut parser = Parser::new();
        let err = parser.load_hierarchy(dir.path()).expect_err("must fail");
        assert!(matches!(err, NetrenderError::SchemaError(ref msg) if msg.contains("20-bad.yaml")));
        assert!(parser.contains("eth0"));
    }

    #[test]
    fn drain_empties_and_keeps_order() {
        let mut parser = Parser::new();
        parser
            .load_yaml_str(
                "network:\n  renderer: NetworkManager\n  ethernets:\n    b: {}\n    a: {}\n",
                Path::new("x.yaml"),
            )
            .expect("load");

        let drained = parser.drain();
        let ids: Vec<_> = drained.definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(drained.renderer, Some(Backend::NetworkManager));
        assert!(parser.is_empty());
        assert!(parser.renderer().is_none());
        assert_eq!(drained.definitions[0].def_type, DefType::Ethernet);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut parser = Parser::new();
        parser
            .load_yaml_str("network:\n  ethernets:\n    eth0: {}\n", Path::new("x.yaml"))
            .expect("load");
        parser.reset();
        parser.reset();
        assert!(parser.is_empty());
        assert!(parser.sources().is_empty());
    }

    const VLAN_KEYFILE: &str = "[connection]\nuuid=0f7e3a46-9c0b-4b8e-9d1a-5b2f7c6e4d23\ntype=vlan\n\n[vlan]\nid=20\nparent=PARENT\n";

    #[test]
    fn keyfile_vlan_parent_resolves_to_known_definition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "vlan.nmconnection",
            &VLAN_KEYFILE.replace("PARENT", "lan0"),
        );

        let mut parser = Parser::new();
        parser
            .load_yaml_str(
                "network:\n  ethernets:\n    uplink:\n      match:\n        name: eth0\n      set-name: lan0\n",
                Path::new("a.yaml"),
            )
            .expect("yaml");
        parser.load(&path).expect("keyfile");

        let vlan = parser
            .definitions()
            .find(|d| d.def_type == DefType::Vlan)
            .expect("vlan");
        assert_eq!(vlan.fields.link.as_deref(), Some("uplink"));
        assert!(
            vlan.fields
                .networkmanager
                .as_ref()
                .is_some_and(|nm| nm.passthrough.is_none())
        );
    }

    #[test]
    fn keyfile_vlan_unknown_parent_stays_passthrough() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "vlan.nmconnection",
            &VLAN_KEYFILE.replace("PARENT", "enp3s0"),
        );

        let mut parser = Parser::new();
        parser.load(&path).expect("keyfile");
        let vlan = parser.definitions().next().expect("vlan");
        assert!(vlan.fields.link.is_none());
    }
}
