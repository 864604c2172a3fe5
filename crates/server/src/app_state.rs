use std::sync::Arc;

use quick_create::{AccessorRegistry, QuickCreateContext, RouteNavigator};
use storage::{Storage, StorageRecordAccessor};

use crate::{admin::AdminEntities, render::Chrome};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) storage: Storage,
    pub(crate) quick_create: QuickCreateContext,
    pub(crate) entities: AdminEntities,
    pub(crate) base_path: String,
}

impl AppState {
    pub(crate) fn new(
        storage: Storage,
        entities: AdminEntities,
        navigator: RouteNavigator,
    ) -> Self {
        let accessors = entities
            .iter()
            .fold(AccessorRegistry::new(), |registry, entity| {
                registry.with(
                    entity.entity_type.clone(),
                    Arc::new(StorageRecordAccessor::new(
                        storage.clone(),
                        entity.entity_type.clone(),
                    )),
                )
            });
        let base_path = navigator.base_path().to_string();

        let quick_create = QuickCreateContext {
            store: Arc::new(storage.clone()),
            accessors,
            navigator: Arc::new(navigator),
        };
        Self {
            storage,
            quick_create,
            entities,
            base_path,
        }
    }

    pub(crate) fn chrome(&self, workflow_active: bool) -> Chrome<'_> {
        Chrome {
            base_path: &self.base_path,
            workflow_active,
            entities: &self.entities,
        }
    }
}
