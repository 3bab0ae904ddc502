//! # netrender-core
//!
//! The network configuration engine behind `netrender`.
//!
//! Declarative YAML documents (and NetworkManager keyfiles) are collected by a
//! [`Parser`], merged field by field, validated and committed to a canonical
//! [`State`], and rendered for three backends:
//! - systemd-networkd (`.network` / `.netdev` / `.link`, wpa_supplicant)
//! - NetworkManager (keyfile profiles)
//! - Open vSwitch (oneshot systemd units driving `ovs-vsctl`)
//!
//! The state can also be written back out as YAML.
//!
//! ## Architectural Constraints
//!
//! - No async, no network access
//! - Deterministic: `BTreeMap` plus explicit insertion order, no `HashMap`
//! - Every operation takes its context (`Parser`, `State`, output root)
//! - Never exits the process; every failure is a [`NetrenderError`]

// =============================================================================
// MODULES
// =============================================================================

pub mod export;
pub mod formats;
pub mod merge;
pub mod parser;
pub mod primitives;
pub mod render;
pub mod session;
pub mod state;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AccessPoint, Backend, DefType, Definition, Fields, MatchRules, Nameservers, NetrenderError,
    NmSettings, OvsSettings, Parameters, Route, SslSettings,
};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use export::{definition_to_yaml, state_to_yaml, write_definition_yaml, write_state_yaml};
pub use merge::Overlay;
pub use parser::{Parser, hierarchy_files};
pub use render::{
    NetworkdRenderer, NmRenderer, OvsRenderer, RenderSummary, Renderer, all_renderers,
    cleanup_all, generate, id_from_nm_filename,
};
pub use session::Session;
pub use state::State;

// =============================================================================
// RE-EXPORTS: Formats
// =============================================================================

pub use formats::{Keyfile, ParsedDocument, definition_from_keyfile, parse_document};
