//! Field Indexes
//!
//! Field filters in [`ListOptions`](crate::domain::ListOptions) are only
//! honored for fields with a registered index. An index is keyed by the
//! resource's group and kind plus the field name, and knows how to pull
//! the indexed values out of an object.

use crate::adapter::container::decode_object;
use crate::error::{Error, Result};
use kube::core::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Extracts the indexed values from an object
pub type ValueExtractor = Arc<dyn Fn(&DynamicObject) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey {
    group: String,
    kind: String,
    field: String,
}

impl IndexKey {
    fn new(resource: &ApiResource, field: &str) -> Self {
        Self {
            group: resource.group.clone(),
            kind: resource.kind.clone(),
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Field Index
// =============================================================================

/// An (object kind, field name, extractor) triple
#[derive(Clone)]
pub struct FieldIndex {
    key: IndexKey,
    extract: ValueExtractor,
}

impl std::fmt::Debug for FieldIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldIndex")
            .field("group", &self.key.group)
            .field("kind", &self.key.kind)
            .field("field", &self.key.field)
            .finish()
    }
}

impl FieldIndex {
    pub fn new<F>(resource: &ApiResource, field: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&DynamicObject) -> Vec<String> + Send + Sync + 'static,
    {
        let field = field.into();
        Self {
            key: IndexKey::new(resource, &field),
            extract: Arc::new(extract),
        }
    }

    /// Index a statically typed resource with a typed extractor
    ///
    /// Objects that fail to decode produce no values and never match.
    pub fn typed<K, F>(field: impl Into<String>, extract: F) -> Self
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
        F: Fn(&K) -> Vec<String> + Send + Sync + 'static,
    {
        let resource = ApiResource::erase::<K>(&());
        let kind = resource.kind.clone();
        Self::new(&resource, field, move |obj| {
            decode_object::<K>(obj, &kind)
                .map(|k| extract(&k))
                .unwrap_or_default()
        })
    }

    /// Index `metadata.name`
    pub fn metadata_name(resource: &ApiResource) -> Self {
        Self::new(resource, "metadata.name", |obj| {
            obj.metadata.name.iter().cloned().collect()
        })
    }

    /// Index `metadata.namespace`
    pub fn metadata_namespace(resource: &ApiResource) -> Self {
        Self::new(resource, "metadata.namespace", |obj| {
            obj.metadata.namespace.iter().cloned().collect()
        })
    }

    /// Index an arbitrary dotted JSON path such as `spec.nodeName`
    pub fn json_path(resource: &ApiResource, path: impl Into<String>) -> Self {
        let path = path.into();
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        Self::new(resource, path, move |obj| {
            serde_json::to_value(obj)
                .map(|root| values_at(&root, &segments))
                .unwrap_or_default()
        })
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn field(&self) -> &str {
        &self.key.field
    }

    /// Indexed values of `object`
    pub fn values(&self, object: &DynamicObject) -> Vec<String> {
        (self.extract)(object)
    }
}

fn values_at(root: &Value, segments: &[String]) -> Vec<String> {
    let mut current = root;
    for segment in segments {
        match current.get(segment.as_str()) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    match current {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Index Set
// =============================================================================

/// Immutable-once-shared collection of field indexes
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    indexes: BTreeMap<IndexKey, FieldIndex>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index; each (kind, field) pair may only be registered once
    pub fn insert(&mut self, index: FieldIndex) -> Result<()> {
        if self.indexes.contains_key(&index.key) {
            return Err(Error::DuplicateIndex {
                kind: index.key.kind.clone(),
                field: index.key.field.clone(),
            });
        }
        self.indexes.insert(index.key.clone(), index);
        Ok(())
    }

    pub fn get(&self, resource: &ApiResource, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(&IndexKey::new(resource, field))
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Fail if any filtered field lacks an index for `resource`
    pub fn ensure_indexed(&self, resource: &ApiResource, fields: &BTreeMap<String, String>) -> Result<()> {
        match fields.keys().find(|f| self.get(resource, f).is_none()) {
            Some(field) => Err(Error::IndexNotRegistered {
                kind: resource.kind.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Keep only objects whose indexed values match every field filter
    pub fn filter(
        &self,
        resource: &ApiResource,
        objects: Vec<DynamicObject>,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>> {
        if fields.is_empty() {
            return Ok(objects);
        }
        self.ensure_indexed(resource, fields)?;

        let matchers: Vec<(&FieldIndex, &String)> = fields
            .iter()
            .filter_map(|(field, value)| self.get(resource, field).map(|idx| (idx, value)))
            .collect();

        Ok(objects
            .into_iter()
            .filter(|obj| {
                matchers
                    .iter()
                    .all(|(idx, value)| idx.values(obj).iter().any(|v| v == *value))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::json;

    fn pods() -> ApiResource {
        ApiResource::erase::<Pod>(&())
    }

    fn pod(name: &str, node: &str) -> DynamicObject {
        DynamicObject::new(name, &pods()).within("default").data(json!({
            "spec": { "nodeName": node, "containers": [{ "name": "main" }] }
        }))
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filter_by_name() {
        let mut set = IndexSet::new();
        set.insert(FieldIndex::metadata_name(&pods())).unwrap();

        let out = set
            .filter(
                &pods(),
                vec![pod("nginx", "a"), pod("redis", "a")],
                &fields(&[("metadata.name", "nginx")]),
            )
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.name.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_filter_requires_index() {
        let set = IndexSet::new();
        let result = set.filter(&pods(), vec![pod("nginx", "a")], &fields(&[("spec.nodeName", "a")]));
        assert_matches!(result, Err(Error::IndexNotRegistered { field, .. }) if field == "spec.nodeName");

        // No filters, no index needed
        assert_eq!(set.filter(&pods(), vec![pod("nginx", "a")], &BTreeMap::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_json_path_and_typed_indexes_agree() {
        let mut set = IndexSet::new();
        set.insert(FieldIndex::json_path(&pods(), "spec.nodeName")).unwrap();

        let typed = FieldIndex::typed::<Pod, _>("spec.nodeName", |p| {
            p.spec.iter().filter_map(|s| s.node_name.clone()).collect()
        });
        let object = pod("nginx", "worker-1");
        assert_eq!(typed.values(&object), vec!["worker-1".to_string()]);
        assert_eq!(set.get(&pods(), "spec.nodeName").unwrap().values(&object), typed.values(&object));

        let out = set
            .filter(
                &pods(),
                vec![pod("a", "worker-1"), pod("b", "worker-2")],
                &fields(&[("spec.nodeName", "worker-2")]),
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.name.as_deref(), Some("b"));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut set = IndexSet::new();
        set.insert(FieldIndex::metadata_name(&pods())).unwrap();
        assert_matches!(
            set.insert(FieldIndex::metadata_name(&pods())),
            Err(Error::DuplicateIndex { .. })
        );
        assert_eq!(set.len(), 1);
    }
}
