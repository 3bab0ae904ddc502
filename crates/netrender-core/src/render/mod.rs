//! # Backend Renderers
//!
//! Turns a committed [`State`] into backend configuration files.
//!
//! ## Ordering Contract
//!
//! 1. `cleanup` on every renderer (removes what a previous run left behind)
//! 2. `write_definition` for every definition on every renderer
//! 3. `finish` once per renderer (aggregate files)
//!
//! A renderer ignores definitions that resolve to another backend. Every write
//! replaces the target file.

pub mod files;
pub mod networkd;
pub mod nm;
pub mod ovs;
pub mod unit;

pub use networkd::NetworkdRenderer;
pub use nm::{NmRenderer, escape_ssid, id_from_nm_filename};
pub use ovs::OvsRenderer;

use crate::state::State;
use crate::types::{Backend, Definition, NetrenderError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A backend output writer.
pub trait Renderer {
    /// The backend this renderer handles.
    fn backend(&self) -> Backend;

    /// Write the files for one definition.
    ///
    /// Returns `Ok(false)` when `def` belongs to another backend.
    fn write_definition(
        &mut self,
        state: &State,
        def: &Definition,
        root: &Path,
    ) -> Result<bool, NetrenderError>;

    /// Write aggregate files once every definition has been seen.
    fn finish(&mut self, state: &State, root: &Path) -> Result<(), NetrenderError>;

    /// Remove every file this renderer may have produced earlier.
    fn cleanup(&self, root: &Path) -> Result<(), NetrenderError>;
}

/// One fresh instance of every renderer, in a fixed order.
#[must_use]
pub fn all_renderers() -> Vec<Box<dyn Renderer>> {
    vec![
        Box::new(NetworkdRenderer::default()),
        Box::new(NmRenderer::default()),
        Box::new(OvsRenderer::default()),
    ]
}

/// What a generation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    /// Definitions written, per backend.
    pub written: BTreeMap<Backend, usize>,
    /// Definitions no renderer handled.
    pub skipped: Vec<String>,
}

impl RenderSummary {
    /// Definitions written for `backend`.
    #[must_use]
    pub fn count(&self, backend: Backend) -> usize {
        self.written.get(&backend).copied().unwrap_or(0)
    }

    /// Definitions written in total.
    #[must_use]
    pub fn total(&self) -> usize {
        self.written.values().sum()
    }
}

/// Remove the output of every renderer under `root`.
pub fn cleanup_all(root: &Path) -> Result<(), NetrenderError> {
    for renderer in all_renderers() {
        renderer.cleanup(root)?;
    }
    Ok(())
}

/// Run a full generation of `state` under `root`.
///
/// Stops at the first failure; files written before it stay on disk.
pub fn generate(state: &State, root: &Path) -> Result<RenderSummary, NetrenderError> {
    let mut renderers = all_renderers();
    let mut summary = RenderSummary::default();

    for renderer in &renderers {
        renderer.cleanup(root)?;
    }

    for def in state.definitions() {
        let mut handled = false;
        for renderer in &mut renderers {
            if renderer.write_definition(state, def, root)? {
                *summary.written.entry(renderer.backend()).or_insert(0) += 1;
                handled = true;
            }
        }
        if !handled {
            tracing::warn!("{}: no renderer configured, skipping", def.id);
            summary.skipped.push(def.id.clone());
        }
    }

    for renderer in &mut renderers {
        renderer.finish(state, root)?;
    }

    tracing::info!(
        "Generated {} definitions ({} skipped)",
        summary.total(),
        summary.skipped.len()
    );
    Ok(summary)
}

/// Shared by the renderers: does `def` belong to `backend`?
pub(crate) fn handles(state: &State, def: &Definition, backend: Backend) -> bool {
    state.resolve_backend(def) == Some(backend)
}
