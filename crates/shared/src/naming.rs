//! Naming conventions shared by the workflow controller and the admin host.
//!
//! Every name the quick-create workflow reads from or writes into a request is
//! derived here, so callers never assemble these strings by hand.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::EntityType;

/// Marker parameter carried by the redirect that resumes a suspended edit.
pub const QUICK_CREATED_MARKER: &str = "quick-created";

/// Session slot holding the serialized stack of pending frames.
pub const STACK_SLOT: &str = "quick-create-stack";

const TRIGGER_PREFIX: &str = "quick-create-";
const BUTTON_CLASS: &str = "quick-create";

static ACRONYM_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static regex"));
static WORD_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])([A-Z])").expect("static regex"));
static NAMESPACE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(.?)").expect("static regex"));
static WORD_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|_|-)+(.)").expect("static regex"));
static ID_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_id$").expect("static regex"));

/// `VenueHall` -> `venue_hall`, `HTMLPage` -> `html_page`, `Admin::Venue` -> `admin/venue`.
pub fn underscore(word: &str) -> String {
    let word = word.replace("::", "/");
    let word = ACRONYM_BOUNDARY.replace_all(&word, "${1}_${2}");
    let word = WORD_BOUNDARY.replace_all(&word, "${1}_${2}");
    word.to_lowercase()
}

/// `venue_hall` -> `VenueHall`, `admin/venue` -> `Admin::Venue`.
pub fn camelize(word: &str) -> String {
    let word = NAMESPACE_SEGMENT.replace_all(word, |caps: &Captures| {
        format!("::{}", caps[1].to_uppercase())
    });
    WORD_START
        .replace_all(&word, |caps: &Captures| caps[1].to_uppercase())
        .into_owned()
}

/// `venue_id` -> `Venue`, `venue_hall` -> `Venue hall`.
pub fn humanize(word: &str) -> String {
    let word = ID_SUFFIX.replace(word, "").replace('_', " ");
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Foreign-key field used when a relation does not name one.
pub fn default_field(entity_type: &EntityType) -> String {
    format!("{}_id", underscore(entity_type.as_str()))
}

/// Admin module used when a relation does not name one.
pub fn default_module(entity_type: &EntityType) -> String {
    entity_type.as_str().to_lowercase()
}

/// Top-level parameter key under which a type's form fields are submitted.
pub fn form_key(entity_type: &EntityType) -> String {
    underscore(entity_type.as_str())
}

/// Request parameter whose presence means the quick-create button for `field` was pressed.
pub fn trigger_parameter(field: &str) -> String {
    format!("{TRIGGER_PREFIX}{field}")
}

/// Submit button that starts a quick-create for one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickCreateButton {
    pub name: String,
    pub id: String,
    pub label: String,
    pub class: String,
}

impl QuickCreateButton {
    pub fn new(entity_type: &EntityType, field: Option<&str>) -> Self {
        let field = field
            .map(str::to_string)
            .unwrap_or_else(|| default_field(entity_type));
        let name = trigger_parameter(&field);
        Self {
            id: name.clone(),
            name,
            label: format!("Add New {}", humanize(&underscore(entity_type.as_str()))),
            class: BUTTON_CLASS.to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
#[path = "tests/naming_tests.rs"]
mod tests;
