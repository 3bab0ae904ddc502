//! # Session
//!
//! Pairs a [`Parser`] with a [`State`] for callers that want one long-lived
//! context. Library code should pass its own `Session`; [`Session::global`]
//! exists for embedders that need a process-wide default.

use crate::formats::{encode_document, parse_document};
use crate::parser::Parser;
use crate::state::State;
use crate::types::{DefType, NetrenderError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

static GLOBAL: OnceLock<Mutex<Session>> = OnceLock::new();

/// A parser and the state it feeds.
#[derive(Debug, Default)]
pub struct Session {
    pub parser: Parser,
    pub state: State,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default session, created empty on first use.
    pub fn global() -> &'static Mutex<Session> {
        GLOBAL.get_or_init(|| Mutex::new(Session::new()))
    }

    /// Load the hierarchy under `root` and import it into the state.
    ///
    /// On failure the parser is reset so the session stays usable.
    pub fn load_and_import(&mut self, root: &Path) -> Result<usize, NetrenderError> {
        let result = self
            .parser
            .load_hierarchy(root)
            .and_then(|_| self.state.import_from(&mut self.parser).map(|defs| defs.len()));
        if result.is_err() {
            self.parser.reset();
        }
        result
    }

    /// Reset the parser, then the state.
    ///
    /// Returns how many definitions the state held.
    pub fn reset_all(&mut self) -> usize {
        let held = self.state.len();
        self.parser.reset();
        self.state.reset();
        tracing::debug!("Session reset, {} definitions dropped", held);
        held
    }

    /// The file that last declared `id` in the hierarchy under `root`.
    ///
    /// Runs on a throwaway parser and state; `self` is not consulted.
    pub fn filename_by_id(id: &str, root: &Path) -> Result<Option<PathBuf>, NetrenderError> {
        let state = scratch_import(root)?;
        Ok(state.filename_of(id).map(Path::to_path_buf))
    }

    /// IDs of every definition of `def_type` in the hierarchy under `root`.
    pub fn ids_for_type(def_type: DefType, root: &Path) -> Result<Vec<String>, NetrenderError> {
        let state = scratch_import(root)?;
        Ok(state
            .ids_for_type(def_type)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Remove `id` from the document that last declared it.
    ///
    /// Returns `Ok(false)` when nothing under `root` declares `id`. The rest of
    /// the document is re-encoded unchanged; only YAML documents can be edited.
    pub fn delete_definition(id: &str, root: &Path) -> Result<bool, NetrenderError> {
        let state = scratch_import(root)?;
        let Some(def) = state.get_definition(id) else {
            tracing::warn!("Cannot delete {}, it is not defined", id);
            return Ok(false);
        };
        let Some(path) = def.filename.clone() else {
            return Ok(false);
        };
        if path.extension().is_none_or(|ext| ext != "yaml") {
            return Err(NetrenderError::WriteError(format!(
                "{}: {} is not declared in a YAML document",
                path.display(),
                id
            )));
        }

        let text = fs::read_to_string(&path)
            .map_err(|e| NetrenderError::IoError(format!("{}: {}", path.display(), e)))?;
        let doc = parse_document(&text, &path)?;
        let kept = doc
            .definitions
            .iter()
            .filter(|d| !(d.id == id && d.def_type == def.def_type));
        let value = encode_document(doc.renderer, doc.openvswitch.as_ref(), kept)?;
        let text = serde_yaml::to_string(&value)
            .map_err(|e| NetrenderError::WriteError(format!("YAML encoding: {}", e)))?;
        fs::write(&path, text)
            .map_err(|e| NetrenderError::WriteError(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Deleted {} from {}", id, path.display());
        Ok(true)
    }
}

fn scratch_import(root: &Path) -> Result<State, NetrenderError> {
    let mut parser = Parser::new();
    let mut state = State::new();
    parser.load_hierarchy(root)?;
    state.import_from(&mut parser)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    }

    #[test]
    fn reset_all_reports_held_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "etc/netplan/a.yaml",
            "network:\n  ethernets:\n    eth0: {}\n    eth1: {}\n",
        );

        let mut session = Session::new();
        assert_eq!(session.load_and_import(dir.path()).expect("import"), 2);
        assert_eq!(session.reset_all(), 2);
        assert_eq!(session.reset_all(), 0);
        assert!(session.parser.is_empty());
    }

    #[test]
    fn failed_import_resets_parser() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "etc/netplan/a.yaml",
            "network:\n  bridges:\n    br0:\n      interfaces: [missing]\n",
        );

        let mut session = Session::new();
        assert!(session.load_and_import(dir.path()).is_err());
        assert!(session.parser.is_empty());
        assert!(session.state.is_empty());
    }

    #[test]
    fn filename_by_id_takes_last_declaration() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "etc/netplan/a.yaml", "network:\n  ethernets:\n    id_a: {}\n");
        write(dir.path(), "etc/netplan/b.yaml", "network:\n  ethernets:\n    id_a: {}\n    id_b: {}\n");

        let file = Session::filename_by_id("id_a", dir.path()).expect("lookup");
        assert_eq!(file, Some(dir.path().join("etc/netplan/b.yaml")));
        assert_eq!(Session::filename_by_id("nope", dir.path()).expect("lookup"), None);
    }

    #[test]
    fn delete_definition_rewrites_declaring_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "etc/netplan/a.yaml", "network:\n  ethernets:\n    eth0: {}\n");
        write(
            dir.path(),
            "etc/netplan/b.yaml",
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0:\n      dhcp4: yes\n    eth1: {}\n  bridges:\n    br0:\n      interfaces: [eth1]\n",
        );

        assert!(Session::delete_definition("eth0", dir.path()).expect("delete"));

        let text = fs::read_to_string(dir.path().join("etc/netplan/b.yaml")).expect("read");
        let doc = parse_document(&text, Path::new("b.yaml")).expect("reparse");
        let ids: Vec<&str> = doc.definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["eth1", "br0"]);
        assert_eq!(doc.renderer, Some(crate::types::Backend::NetworkManager));

        // a.yaml still declares it, so the next lookup finds that file
        let file = Session::filename_by_id("eth0", dir.path()).expect("lookup");
        assert_eq!(file, Some(dir.path().join("etc/netplan/a.yaml")));
    }

    #[test]
    fn delete_unknown_definition_is_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "etc/netplan/a.yaml", "network:\n  ethernets:\n    eth0: {}\n");

        assert!(!Session::delete_definition("eth9", dir.path()).expect("delete"));
        let text = fs::read_to_string(dir.path().join("etc/netplan/a.yaml")).expect("read");
        assert!(text.contains("eth0"));
    }

    #[test]
    fn global_is_shared() {
        assert!(std::ptr::eq(Session::global(), Session::global()));
    }
}
