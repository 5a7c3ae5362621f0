use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::descriptor::TableDescriptor;

/// Table name to descriptor, filled at manager creation and on first use.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: RwLock<HashMap<String, Arc<TableDescriptor>>>,
}

impl DescriptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor.
    pub fn register(&self, descriptor: TableDescriptor) -> Arc<TableDescriptor> {
        let descriptor = Arc::new(descriptor);
        let mut guard = self
            .descriptors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(descriptor.table.clone(), Arc::clone(&descriptor));
        descriptor
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<Arc<TableDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    /// Existing descriptor for `table`, or the one `build` derives, registered.
    pub fn get_or_register(
        &self,
        table: &str,
        build: impl FnOnce() -> TableDescriptor,
    ) -> Arc<TableDescriptor> {
        if let Some(existing) = self.get(table) {
            return existing;
        }
        let mut guard = self
            .descriptors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            guard
                .entry(table.to_string())
                .or_insert_with(|| Arc::new(build())),
        )
    }

    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .descriptors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tables.sort();
        tables
    }
}
