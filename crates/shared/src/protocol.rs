use serde::{Deserialize, Serialize};

use crate::{
    domain::{EntityType, RecordId},
    naming::{default_field, default_module},
    params::Parameters,
};

/// One relation on an edit form that offers a quick-create button.
///
/// `field` defaults to `underscore(type) + "_id"` and `module` to the
/// lower-cased type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl FieldSpec {
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            field: None,
            module: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn field(&self) -> String {
        self.field
            .clone()
            .unwrap_or_else(|| default_field(&self.entity_type))
    }

    pub fn module(&self) -> String {
        self.module
            .clone()
            .unwrap_or_else(|| default_module(&self.entity_type))
    }
}

/// A suspended edit waiting for a related record to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Type being edited when the button was pressed; the screen to return to.
    pub admin_type: EntityType,
    #[serde(rename = "type")]
    pub related_type: EntityType,
    /// Foreign-key field on `admin_type` that receives the new id.
    pub field: String,
    /// Every request parameter present when the quick-create was triggered.
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
}

impl Frame {
    pub fn new(
        admin_type: EntityType,
        related_type: EntityType,
        field: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            admin_type,
            related_type,
            field: field.into(),
            parameters,
            id: None,
        }
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|value| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Module the suspended request was dispatched to.
    pub fn module(&self) -> Option<&str> {
        self.parameter("module")
    }

    /// Action the suspended request was dispatched to.
    pub fn action(&self) -> Option<&str> {
        self.parameter("action")
    }
}

/// LIFO stack of pending frames for one session. Empty means no workflow in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    frames: Vec<Frame>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn peek(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Attaches the saved record's id to the top frame. Returns false on an empty stack.
    pub fn set_id(&mut self, id: RecordId) -> bool {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.id = Some(id);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
