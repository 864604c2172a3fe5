use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{EntityType, RecordId, RecordRef};

/// Looks up records of one entity type by primary key.
#[async_trait]
pub trait RecordAccessor: Send + Sync {
    async fn retrieve_by_primary_key(&self, id: RecordId) -> Result<Option<RecordRef>>;
}

/// Accessors registered at startup, one per administered entity type.
#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: HashMap<EntityType, Arc<dyn RecordAccessor>>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: impl Into<EntityType>, accessor: Arc<dyn RecordAccessor>) {
        self.accessors.insert(entity_type.into(), accessor);
    }

    pub fn with(mut self, entity_type: impl Into<EntityType>, accessor: Arc<dyn RecordAccessor>) -> Self {
        self.register(entity_type, accessor);
        self
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&Arc<dyn RecordAccessor>> {
        self.accessors.get(entity_type)
    }
}

impl fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.accessors.keys().map(EntityType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("AccessorRegistry").field("types", &types).finish()
    }
}
