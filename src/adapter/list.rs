//! List specs: what to list and how to read the results back

use crate::adapter::container::{DynamicResourceList, ResourceList};
use crate::domain::ports::{ListSpec, ObjectContainer};
use kube::core::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

// =============================================================================
// Adapted List (caller-supplied extraction)
// =============================================================================

type ContainerFactory<C> = Box<dyn Fn() -> C + Send + Sync>;
type ExtractFn<C, T> = Box<dyn Fn(&C) -> Vec<T> + Send + Sync>;

/// A container factory paired with a caller-written extraction callback
///
/// The aggregator fills a fresh container per cluster and hands it to
/// `extract`, which is the only code that knows the concrete item type.
///
/// ```ignore
/// let pods = AdaptedList::new(ResourceList::<Pod>::new, |list| {
///     list.items().iter().map(|p| p.metadata.name.clone()).collect()
/// });
/// ```
pub struct AdaptedList<C, T> {
    container: ContainerFactory<C>,
    extract: ExtractFn<C, T>,
}

impl<C, T> AdaptedList<C, T> {
    pub fn new<F, E>(container: F, extract: E) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        E: Fn(&C) -> Vec<T> + Send + Sync + 'static,
    {
        Self {
            container: Box::new(container),
            extract: Box::new(extract),
        }
    }
}

impl<C, T> ListSpec for AdaptedList<C, T>
where
    C: ObjectContainer,
    T: Send + 'static,
{
    type Container = C;
    type Object = T;

    fn new_container(&self) -> C {
        (self.container)()
    }

    fn extract(&self, container: &C) -> Vec<T> {
        (self.extract)(container)
    }
}

// =============================================================================
// Typed List
// =============================================================================

/// Lists a statically typed resource and returns owned copies of its items
pub struct TypedList<K> {
    _kind: PhantomData<fn() -> K>,
}

impl<K> TypedList<K> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<K> Default for TypedList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ListSpec for TypedList<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send + 'static,
{
    type Container = ResourceList<K>;
    type Object = K;

    fn new_container(&self) -> ResourceList<K> {
        ResourceList::new()
    }

    fn extract(&self, container: &ResourceList<K>) -> Vec<K> {
        container.items().to_vec()
    }
}

// =============================================================================
// Dynamic List
// =============================================================================

/// Lists a kind described at runtime, returning dynamic objects
#[derive(Debug, Clone)]
pub struct DynamicList {
    resource: ApiResource,
}

impl DynamicList {
    pub fn new(resource: ApiResource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }
}

impl ListSpec for DynamicList {
    type Container = DynamicResourceList;
    type Object = DynamicObject;

    fn new_container(&self) -> DynamicResourceList {
        DynamicResourceList::new(self.resource.clone())
    }

    fn extract(&self, container: &DynamicResourceList) -> Vec<DynamicObject> {
        container.items().to_vec()
    }
}
