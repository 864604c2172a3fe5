use std::sync::Arc;

use serde_json::{Map, Value};
use shared::{
    domain::{EntityType, RecordId},
    naming::form_key,
    params::FormRequest,
    protocol::FieldSpec,
};

use crate::config::EntityConfig;

/// Entity type served by one admin module.
#[derive(Debug, Clone)]
pub(crate) struct AdminEntity {
    pub(crate) entity_type: EntityType,
    pub(crate) module: String,
    pub(crate) columns: Vec<String>,
    pub(crate) relations: Vec<FieldSpec>,
}

impl AdminEntity {
    pub(crate) fn form_key(&self) -> String {
        form_key(&self.entity_type)
    }

    /// Columns and relation fields submitted under this type's form key.
    ///
    /// Anything else in the submission is dropped.
    pub(crate) fn submitted_fields(&self, request: &FormRequest) -> Map<String, Value> {
        let key = self.form_key();
        let mut fields = Map::new();
        let relation_fields = self.relations.iter().map(FieldSpec::field);
        for name in self.columns.iter().cloned().chain(relation_fields) {
            if let Some(value) = request.get_nested(&key, &name) {
                fields.insert(name, value.clone());
            }
        }
        fields
    }

    /// Primary key of the record being edited, if the request names one.
    pub(crate) fn record_id(request: &FormRequest) -> Option<RecordId> {
        match request.get("id")? {
            Value::String(raw) => raw.trim().parse().ok().map(RecordId),
            Value::Number(number) => number.as_i64().map(RecordId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AdminEntities {
    entities: Arc<Vec<AdminEntity>>,
}

impl AdminEntities {
    pub(crate) fn from_config(configs: &[EntityConfig]) -> Self {
        let entities = configs
            .iter()
            .map(|config| AdminEntity {
                entity_type: config.entity_type(),
                module: config.module(),
                columns: config.columns.clone(),
                relations: config.relations.clone(),
            })
            .collect();
        Self {
            entities: Arc::new(entities),
        }
    }

    pub(crate) fn by_module(&self, module: &str) -> Option<&AdminEntity> {
        self.entities.iter().find(|entity| entity.module == module)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &AdminEntity> {
        self.entities.iter()
    }
}

/// Renders a stored or submitted field value the way a form input expects it.
pub(crate) fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
