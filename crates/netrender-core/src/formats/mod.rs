//! # Input and Output Formats
//!
//! Pure transformations between text and the definition model:
//! - `document`: the declarative YAML document shape
//! - `keyfile`: the flat NetworkManager keyfile format
//!
//! File I/O lives in the parser, the renderers and the exporter.

pub mod document;
pub mod keyfile;

pub use document::{ParsedDocument, encode_document, parse_document};
pub use keyfile::{Keyfile, definition_from_keyfile};
