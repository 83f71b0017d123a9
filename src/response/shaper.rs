//! Turns a dispatch outcome into a JSON document
//!
//! Steps, in order:
//! 1. normalize the result to a list, remembering whether it was a collection
//! 2. replace entities and objects by their property maps
//! 3. apply `expand` paths, batch-loading connected data per kind
//! 4. apply `fields` selection
//! 5. collapse non-collections back to a single element
//! 6. reduce every remaining entity to its href

use crate::core::entity::{Entity, EntityRef, read_properties};
use crate::core::error::{RestResult, ShapeError};
use crate::core::value::{Capability, Value};
use crate::dispatch::{DispatchContext, DispatchOutcome};
use crate::request::{RequestView, TerseTree};
use indexmap::IndexMap;

/// Pagination metadata of a collection response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub count: u64,
    pub offset: usize,
    pub limit: usize,
}

/// A shaped response body plus collection metadata
#[derive(Debug, Clone)]
pub struct ShapedBody {
    pub body: serde_json::Value,
    pub collection: Option<CollectionInfo>,
}

pub struct ResponseShaper<'a> {
    ctx: &'a DispatchContext,
    view: &'a RequestView,
}

impl<'a> ResponseShaper<'a> {
    pub fn new(ctx: &'a DispatchContext, view: &'a RequestView) -> Self {
        Self { ctx, view }
    }

    pub async fn shape(&self, outcome: DispatchOutcome) -> RestResult<ShapedBody> {
        let (elements, is_collection) = match outcome.value {
            Value::List(items) => (items, true),
            single => (vec![single], false),
        };
        let count = outcome.total.unwrap_or(elements.len() as u64);

        let mut shaped = Vec::with_capacity(elements.len());
        for element in elements {
            self.ctx.memory().check()?;
            shaped.push(self.represent(element).await?);
        }

        for path in self.view.expand().lookup() {
            self.expand_path(&mut shaped, &path).await?;
        }

        let fields = self.view.fields();
        if !fields.is_empty() {
            for element in &mut shaped {
                select_fields(element, fields);
            }
        }

        let (value, collection) = if is_collection {
            let info = CollectionInfo {
                count,
                offset: outcome.offset,
                limit: outcome.limit,
            };
            (Value::List(shaped), Some(info))
        } else {
            let single = shaped.into_iter().next().unwrap_or_default();
            let single = match single {
                Value::Bool(true) if self.view.return_true_as_null() => Value::Null,
                other => other,
            };
            (single, None)
        };

        Ok(ShapedBody {
            body: self.finalize(value)?,
            collection,
        })
    }

    /// Property map of an entity, including its href
    async fn entity_properties(&self, entity: &dyn Entity) -> RestResult<Value> {
        let mut values = read_properties(entity).await?;
        values.insert(
            "href".to_string(),
            Value::Str(self.ctx.href_for(entity, self.view.version())),
        );
        Ok(Value::Map(values))
    }

    /// One level of representation; nested entities stay references
    async fn represent(&self, value: Value) -> RestResult<Value> {
        match value {
            Value::Entity(entity) => self.entity_properties(entity.as_ref()).await,
            Value::Object(object) => match object.capability() {
                Capability::Resource(values) | Capability::Array(values) => Ok(Value::Map(values)),
                Capability::Text(text) => Ok(Value::Str(text)),
                Capability::Integer(i) => Ok(Value::Int(i)),
                Capability::Opaque => Err(ShapeError::Unrepresentable {
                    what: object.type_name().to_string(),
                }
                .into()),
            },
            other => Ok(other),
        }
    }

    /// Expand every value found at `path` across all elements
    async fn expand_path(&self, elements: &mut [Value], path: &str) -> RestResult<()> {
        let keys: Vec<&str> = path.split('/').collect();
        let mut targets: Vec<&mut Value> = Vec::new();
        for element in elements.iter_mut() {
            collect_targets(element, &keys, &mut targets);
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut by_kind: IndexMap<String, Vec<EntityRef>> = IndexMap::new();
        for target in &targets {
            for entity in referenced_entities(target) {
                by_kind
                    .entry(entity.kind().to_string())
                    .or_default()
                    .push(entity);
            }
        }
        for (kind, entities) in &by_kind {
            if let Some(provider) = self.ctx.provider(kind) {
                tracing::debug!(%kind, count = entities.len(), %path, "fetching connected data");
                provider.fetch_connected(entities).await?;
            }
        }

        for target in targets {
            self.ctx.memory().check()?;
            let value = std::mem::take(target);
            *target = self.expand_value(value).await?;
        }
        Ok(())
    }

    async fn expand_value(&self, value: Value) -> RestResult<Value> {
        match value {
            Value::List(items) => {
                let mut expanded = Vec::with_capacity(items.len());
                for item in items {
                    expanded.push(self.expand_single(item).await?);
                }
                Ok(Value::List(expanded))
            }
            other => self.expand_single(other).await,
        }
    }

    async fn expand_single(&self, value: Value) -> RestResult<Value> {
        match value {
            Value::Null | Value::Bool(_) | Value::Map(_) => Ok(value),
            Value::Entity(_) | Value::Object(_) => self.represent(value).await,
            other => Err(ShapeError::Unrepresentable {
                what: format!("{} (cannot be expanded)", other.type_name()),
            }
            .into()),
        }
    }

    /// Reduce to plain JSON; entities left over become hrefs
    fn finalize(&self, value: Value) -> RestResult<serde_json::Value> {
        Ok(match value {
            Value::Entity(entity) => {
                serde_json::Value::String(self.ctx.href_for(entity.as_ref(), self.view.version()))
            }
            Value::Object(object) => match object.capability() {
                Capability::Resource(values) | Capability::Array(values) => {
                    self.finalize(Value::Map(values))?
                }
                Capability::Text(text) => serde_json::Value::String(text),
                Capability::Integer(i) => serde_json::Value::from(i),
                Capability::Opaque => {
                    return Err(ShapeError::Unrepresentable {
                        what: object.type_name().to_string(),
                    }
                    .into());
                }
            },
            Value::List(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(|item| self.finalize(item))
                    .collect::<RestResult<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key, self.finalize(item)?);
                }
                serde_json::Value::Object(out)
            }
            scalar => scalar.to_json().unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Collect mutable references to the values at `keys`, walking through lists
fn collect_targets<'v>(value: &'v mut Value, keys: &[&str], out: &mut Vec<&'v mut Value>) {
    match value {
        Value::List(items) => {
            for item in items {
                collect_targets(item, keys, out);
            }
        }
        Value::Map(map) => {
            let Some((head, rest)) = keys.split_first() else {
                return;
            };
            if let Some(child) = map.get_mut(*head) {
                if rest.is_empty() {
                    out.push(child);
                } else {
                    collect_targets(child, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn referenced_entities(value: &Value) -> Vec<EntityRef> {
    match value {
        Value::Entity(entity) => vec![entity.clone()],
        Value::List(items) => items
            .iter()
            .filter_map(|item| item.as_entity().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Keep only selected keys; `href` always survives and list indices are
/// transparent
pub fn select_fields(value: &mut Value, tree: &TerseTree) {
    match value {
        Value::List(items) => {
            for item in items {
                select_fields(item, tree);
            }
        }
        Value::Map(map) => {
            map.retain(|key, _| key == "href" || tree.contains(key));
            for (key, child) in map.iter_mut() {
                if let Some(subtree) = tree.child(key).filter(|t| !t.is_empty()) {
                    select_fields(child, subtree);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_select_fields_keeps_href() {
        let mut value = map(vec![
            ("id", Value::Int(1)),
            ("name", Value::from("Ann")),
            ("email", Value::from("ann@example.com")),
            ("href", Value::from("http://h/v1/users/1")),
        ]);
        let tree = TerseTree::parse("id,name").unwrap();
        select_fields(&mut value, &tree);
        let keys: Vec<_> = value.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name", "href"]);

        // idempotent
        let before = value.clone();
        select_fields(&mut value, &tree);
        assert_eq!(value, before);
    }

    #[test]
    fn test_select_fields_nested_through_lists() {
        let friend = |id: i64| {
            map(vec![
                ("id", Value::Int(id)),
                ("name", Value::from("x")),
                ("age", Value::Int(30)),
            ])
        };
        let mut value = map(vec![
            ("id", Value::Int(1)),
            ("friends", Value::List(vec![friend(2), friend(3)])),
            ("address", map(vec![("city", Value::from("Delft"))])),
        ]);
        let tree = TerseTree::parse("friends(name),address").unwrap();
        select_fields(&mut value, &tree);

        let root = value.as_map().unwrap();
        assert!(!root.contains_key("id"));
        // leaf selection keeps the whole subtree
        assert_eq!(
            root.get("address"),
            Some(&Value::Map(indexmap! {"city".to_string() => Value::from("Delft")}))
        );
        let Some(Value::List(friends)) = root.get("friends") else {
            panic!("friends missing");
        };
        for f in friends {
            let keys: Vec<_> = f.as_map().unwrap().keys().cloned().collect();
            assert_eq!(keys, vec!["name"]);
        }
    }

    #[test]
    fn test_collect_targets_walks_lists() {
        let mut elements = vec![
            map(vec![("a", map(vec![("b", Value::Int(1))]))]),
            map(vec![("a", Value::List(vec![map(vec![("b", Value::Int(2))])]))]),
            map(vec![("c", Value::Int(3))]),
        ];
        let mut targets = Vec::new();
        for element in elements.iter_mut() {
            collect_targets(element, &["a", "b"], &mut targets);
        }
        assert_eq!(targets.len(), 2);
        *targets[1] = Value::Int(20);
        assert_eq!(
            elements[1],
            map(vec![("a", Value::List(vec![map(vec![("b", Value::Int(20))])]))])
        );
    }
}
