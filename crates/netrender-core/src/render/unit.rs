//! systemd-style INI builder used for networkd files and systemd units.
//!
//! Unlike a NetworkManager keyfile, sections and keys may repeat
//! (`Address=` lines, several `[Route]` sections).

use std::fmt::Display;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnitFile {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl UnitFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new section. Later entries go into it.
    pub fn section(&mut self, name: &str) -> &mut Self {
        self.sections.push((name.to_string(), Vec::new()));
        self
    }

    /// Append `key=value` to the current section.
    pub fn entry(&mut self, key: &str, value: impl Display) -> &mut Self {
        if self.sections.is_empty() {
            self.sections.push((String::new(), Vec::new()));
        }
        if let Some((_, entries)) = self.sections.last_mut() {
            entries.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// Append `key=value` when `value` is set.
    pub fn entry_opt<V: Display>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.entry(key, value);
        }
        self
    }

    /// Render, dropping empty sections.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in self.sections.iter().filter(|(_, e)| !e.is_empty()) {
            if !out.is_empty() {
                out.push('\n');
            }
            if !name.is_empty() {
                out.push_str(&format!("[{}]\n", name));
            }
            for (key, value) in entries {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        out
    }
}
