//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Config;
use netrender_core::{
    DefType, NetrenderError, Session, cleanup_all, generate, write_definition_yaml,
    write_state_yaml,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

// =============================================================================
// SESSION HELPERS
// =============================================================================

/// Load and import the hierarchy under the configured root.
///
/// The configured default renderer applies only when no document set
/// `network.renderer`.
fn load_session(config: &Config) -> Result<Session, NetrenderError> {
    let mut session = Session::new();
    session.load_and_import(&config.root_dir)?;
    if session.state.backend().is_none() {
        if let Some(backend) = config.default_renderer {
            session.state.set_default_backend(backend);
        }
    }
    Ok(session)
}

fn print_json(output: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

// =============================================================================
// GENERATE COMMAND
// =============================================================================

/// Render every backend and, when networkd got output, enable it.
pub fn cmd_generate(
    config: &Config,
    json_mode: bool,
    generator_dir: Option<&Path>,
) -> Result<(), NetrenderError> {
    let session = load_session(config)?;
    let summary = generate(&session.state, &config.root_dir)?;

    let generator_dir = generator_dir.or(config.generator_dir.as_deref());
    let enabled = match generator_dir {
        Some(dir) if summary.count(netrender_core::Backend::Networkd) > 0 => {
            enable_networkd(dir)?;
            true
        }
        _ => false,
    };

    if json_mode {
        print_json(&serde_json::json!({
            "root_dir": config.root_dir.to_string_lossy(),
            "written": summary.written,
            "skipped": summary.skipped,
            "networkd_enabled": enabled,
        }));
        return Ok(());
    }

    println!("Generated configuration under {}", config.root_dir.display());
    for (backend, count) in &summary.written {
        println!("  {:<16} {}", backend.as_str(), count);
    }
    if !summary.skipped.is_empty() {
        println!("  skipped          {}", summary.skipped.join(", "));
    }
    if enabled {
        println!("Enabled systemd-networkd");
    }
    Ok(())
}

/// Create the systemd-networkd enablement links under `generator_dir`.
///
/// Links that already exist are left alone.
pub fn enable_networkd(generator_dir: &Path) -> Result<(), NetrenderError> {
    link(
        &generator_dir.join("multi-user.target.wants"),
        "systemd-networkd.service",
        Path::new("../systemd-networkd.service"),
    )?;
    link(
        &generator_dir.join("network-online.target.wants"),
        "systemd-networkd-wait-online.service",
        Path::new("/lib/systemd/system/systemd-networkd-wait-online.service"),
    )
}

fn link(dir: &Path, name: &str, target: &Path) -> Result<(), NetrenderError> {
    let write_err = |path: &Path, e: std::io::Error| {
        NetrenderError::WriteError(format!("{}: {}", path.display(), e))
    };
    std::fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    let path = dir.join(name);
    match symlink(target, &path) {
        Ok(()) => {
            tracing::debug!("Linked {} -> {}", path.display(), target.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(write_err(&path, e)),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, path: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "symlinks require a unix platform",
    ))
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show committed definitions.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), NetrenderError> {
    let session = load_session(config)?;
    let state = &session.state;

    if json_mode {
        let definitions: Vec<serde_json::Value> = state
            .definitions()
            .map(|def| {
                serde_json::json!({
                    "id": def.id,
                    "type": def.def_type.section(),
                    "backend": state.resolve_backend(def).map(|b| b.as_str()),
                    "filename": def.filename.as_ref().map(|p| p.to_string_lossy()),
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "root_dir": config.root_dir.to_string_lossy(),
            "renderer": state.backend().map(|b| b.as_str()),
            "definition_count": state.len(),
            "definitions": definitions,
        }));
        return Ok(());
    }

    println!("netrender Status");
    println!("================");
    println!("Root:     {}", config.root_dir.display());
    println!(
        "Renderer: {}",
        state.backend().map(|b| b.as_str()).unwrap_or("(none)")
    );
    println!("Definitions: {}", state.len());
    println!();
    for def in state.definitions() {
        println!(
            "  {:<16} {:<10} {:<15} {}",
            def.id,
            def.def_type.section(),
            state
                .resolve_backend(def)
                .map(|b| b.as_str())
                .unwrap_or("-"),
            def.filename
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}

// =============================================================================
// LOOKUP COMMANDS
// =============================================================================

/// Show the file that last declared `id`.
pub fn cmd_get_filename(config: &Config, json_mode: bool, id: &str) -> Result<(), NetrenderError> {
    let filename = Session::filename_by_id(id, &config.root_dir)?;

    if json_mode {
        print_json(&serde_json::json!({
            "id": id,
            "filename": filename.as_ref().map(|p| p.to_string_lossy()),
        }));
        return Ok(());
    }

    match filename {
        Some(path) => println!("{}", path.display()),
        None => tracing::warn!("{}: not defined", id),
    }
    Ok(())
}

/// List the IDs declared in `section`.
pub fn cmd_ids(config: &Config, json_mode: bool, section: &str) -> Result<(), NetrenderError> {
    let def_type = DefType::from_section(section).ok_or_else(|| {
        NetrenderError::SchemaError(format!(
            "unknown section '{}' (expected one of: {})",
            section,
            DefType::ALL.map(DefType::section).join(", ")
        ))
    })?;
    let ids = Session::ids_for_type(def_type, &config.root_dir)?;

    if json_mode {
        print_json(&serde_json::json!({ "section": section, "ids": ids }));
        return Ok(());
    }

    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write one definition, or the whole state, back out as YAML.
pub fn cmd_export(
    config: &Config,
    json_mode: bool,
    id: Option<&str>,
    file_hint: Option<&str>,
) -> Result<(), NetrenderError> {
    let session = load_session(config)?;
    let state = &session.state;

    let path: PathBuf = match id {
        Some(id) => {
            let def = state.get_definition(id).ok_or_else(|| {
                NetrenderError::WriteError(format!("{}: no such definition", id))
            })?;
            write_definition_yaml(def, &config.root_dir)?
        }
        None => write_state_yaml(
            state,
            file_hint.unwrap_or(&config.output_hint),
            &config.root_dir,
        )?,
    };

    if json_mode {
        print_json(&serde_json::json!({ "path": path.to_string_lossy() }));
        return Ok(());
    }
    println!("Exported to {}", path.display());
    Ok(())
}

// =============================================================================
// DELETE COMMAND
// =============================================================================

/// Remove `id` from the document that last declared it.
pub fn cmd_delete(config: &Config, json_mode: bool, id: &str) -> Result<(), NetrenderError> {
    if !Session::delete_definition(id, &config.root_dir)? {
        return Err(NetrenderError::WriteError(format!(
            "{}: no such definition",
            id
        )));
    }

    if json_mode {
        print_json(&serde_json::json!({ "id": id, "deleted": true }));
        return Ok(());
    }
    println!("Deleted {}", id);
    Ok(())
}

// =============================================================================
// CLEAN COMMAND
// =============================================================================

/// Remove every generated backend file under the root.
pub fn cmd_clean(config: &Config, json_mode: bool) -> Result<(), NetrenderError> {
    cleanup_all(&config.root_dir)?;

    if json_mode {
        print_json(&serde_json::json!({
            "root_dir": config.root_dir.to_string_lossy(),
            "cleaned": true,
        }));
        return Ok(());
    }
    println!("Removed generated files under {}", config.root_dir.display());
    Ok(())
}
