//! Object containers filled by cluster handles

use crate::domain::ports::ObjectContainer;
use crate::error::{Error, Result};
use kube::core::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;

/// Decode a dynamic object into a concrete type
pub fn decode_object<K: DeserializeOwned>(object: &DynamicObject, kind: &str) -> Result<K> {
    let value = serde_json::to_value(object).map_err(|e| Error::ObjectDecode {
        kind: kind.to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| Error::ObjectDecode {
        kind: kind.to_string(),
        reason: format!("{} ({})", e, object.metadata.name.as_deref().unwrap_or("<unnamed>")),
    })
}

// =============================================================================
// Typed Container
// =============================================================================

/// Container holding objects of a statically known resource type
#[derive(Debug, Clone)]
pub struct ResourceList<K> {
    resource: ApiResource,
    items: Vec<K>,
}

impl<K> ResourceList<K>
where
    K: Resource<DynamicType = ()>,
{
    pub fn new() -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            items: Vec::new(),
        }
    }
}

impl<K> Default for ResourceList<K>
where
    K: Resource<DynamicType = ()>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ResourceList<K> {
    pub fn items(&self) -> &[K] {
        &self.items
    }

    pub fn into_items(self) -> Vec<K> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K> ObjectContainer for ResourceList<K>
where
    K: DeserializeOwned + Send,
{
    fn api_resource(&self) -> ApiResource {
        self.resource.clone()
    }

    fn fill(&mut self, objects: Vec<DynamicObject>) -> Result<()> {
        let items = objects
            .iter()
            .map(|o| decode_object(o, &self.resource.kind))
            .collect::<Result<Vec<K>>>()?;
        self.items = items;
        Ok(())
    }
}

// =============================================================================
// Dynamic Container
// =============================================================================

/// Container for a kind described only at runtime
#[derive(Debug, Clone)]
pub struct DynamicResourceList {
    resource: ApiResource,
    items: Vec<DynamicObject>,
}

impl DynamicResourceList {
    pub fn new(resource: ApiResource) -> Self {
        Self {
            resource,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[DynamicObject] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DynamicObject> {
        self.items
    }
}

impl ObjectContainer for DynamicResourceList {
    fn api_resource(&self) -> ApiResource {
        self.resource.clone()
    }

    fn fill(&mut self, objects: Vec<DynamicObject>) -> Result<()> {
        self.items = objects;
        Ok(())
    }
}
