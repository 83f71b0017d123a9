//! In-memory storage collaborator for testing and development
//!
//! Every kind lives in one shared [`InMemoryStore`], so references between
//! kinds resolve to entities. A [`RecordSchema`] declares the properties and
//! operations of a kind; [`InMemoryProvider`] evaluates canonical filters
//! against the stored records.

use crate::core::auth::Caller;
use crate::core::entity::{Entity, EntityRef, STATE_ACTIVE, STATE_DELETED};
use crate::core::filter::{Filter, FilterOp, SortKey};
use crate::core::naming;
use crate::core::operation::{
    Arguments, Operation, Operations, ParamType, Parameter, RestProperties,
};
use crate::core::provider::Provider;
use crate::core::value::Value;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, Weak};

const EARTH_RADIUS_KM: f64 = 6371.0;

type Tables = RwLock<HashMap<String, Table>>;

#[derive(Default)]
struct Table {
    next_id: i64,
    records: IndexMap<i64, Arc<Record>>,
}

/// Storage shared by all in-memory providers
///
/// Uses RwLock for thread-safe access.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider for the kind described by `schema`
    pub fn provider(&self, schema: RecordSchema) -> InMemoryProvider {
        InMemoryProvider {
            schema: Arc::new(schema),
            store: self.clone(),
            operations: Operations::new(),
            handlers: HashMap::new(),
            read_filter: None,
            connected_fetches: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, kind: &str, id: i64) -> Result<Option<Arc<Record>>> {
        find_record(&self.tables, kind, id)
    }

    fn records(&self, kind: &str) -> Result<Vec<Arc<Record>>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(tables
            .get(kind)
            .map(|table| table.records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert(
        &self,
        schema: &Arc<RecordSchema>,
        mut values: IndexMap<String, Value>,
    ) -> Result<Arc<Record>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let table = tables.entry(schema.kind.clone()).or_default();

        let id = match values.shift_remove("id").and_then(|v| v.as_i64()) {
            Some(id) if id >= 1 => id,
            _ => table.next_id.max(1),
        };
        if table.records.contains_key(&id) {
            bail!("{} {} already exists", schema.kind, id);
        }
        table.next_id = table.next_id.max(id + 1);

        let state = values
            .shift_remove("state")
            .and_then(|v| v.as_i64())
            .unwrap_or(STATE_ACTIVE);

        let mut stored = IndexMap::new();
        for (name, kind) in &schema.fields {
            let value = values.shift_remove(name).unwrap_or_else(|| match kind {
                FieldKind::References(_) => Value::List(Vec::new()),
                _ => Value::Null,
            });
            stored.insert(name.clone(), store_form(value));
        }
        if let Some(unknown) = values.keys().next() {
            bail!("{} has no field '{}'", schema.kind, unknown);
        }

        let record = Arc::new(Record {
            id,
            schema: schema.clone(),
            state: AtomicI64::new(state),
            values: RwLock::new(stored),
            tables: Arc::downgrade(&self.tables),
        });
        table.records.insert(id, record.clone());
        tracing::debug!(kind = %schema.kind, id, "record inserted");
        Ok(record)
    }
}

fn find_record(tables: &Tables, kind: &str, id: i64) -> Result<Option<Arc<Record>>> {
    let tables = tables
        .read()
        .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
    Ok(tables
        .get(kind)
        .and_then(|table| table.records.get(&id))
        .cloned())
}

/// Entities are stored by id
fn store_form(value: Value) -> Value {
    match value {
        Value::Entity(entity) => Value::Int(entity.id()),
        Value::List(items) => Value::List(items.into_iter().map(store_form).collect()),
        other => other,
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Custom entity operation
pub type EntityHandler = Arc<dyn Fn(&Record, &Arguments) -> Result<Value> + Send + Sync>;

/// Custom provider operation
pub type ProviderHandler =
    Arc<dyn Fn(&InMemoryProvider, &Arguments) -> Result<Value> + Send + Sync>;

/// Runs after a record's properties were read
pub type AfterGetHook = Arc<dyn Fn(&Record, &mut IndexMap<String, Value>) + Send + Sync>;

/// Filters restricting what a caller may read
pub type ReadFilterFn = Arc<dyn Fn(&Caller) -> Vec<Filter> + Send + Sync>;

#[derive(Debug, Clone)]
enum FieldKind {
    Scalar,
    /// Id of an entity of the given kind
    Reference(String),
    /// Ids of entities of the given kind
    References(String),
}

#[derive(Debug, Clone)]
enum Accessor {
    Get(String),
    Set(String),
    Add(String),
}

/// Declares the fields and operations of one kind
#[derive(Clone)]
pub struct RecordSchema {
    kind: String,
    fields: IndexMap<String, FieldKind>,
    accessors: HashMap<String, Accessor>,
    properties: RestProperties,
    operations: Operations,
    handlers: HashMap<String, EntityHandler>,
    name_field: Option<String>,
    after_get: Option<AfterGetHook>,
}

impl RecordSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: IndexMap::new(),
            accessors: HashMap::new(),
            properties: RestProperties::new(),
            operations: Operations::new(),
            handlers: HashMap::new(),
            name_field: None,
            after_get: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Readable and writable property
    pub fn property(self, name: &str, ty: ParamType) -> Self {
        self.field(name, FieldKind::Scalar, ty, true)
    }

    /// Property without a setter
    pub fn read_only(self, name: &str, ty: ParamType) -> Self {
        self.field(name, FieldKind::Scalar, ty, false)
    }

    /// Writable reference to one entity of `kind`
    pub fn reference(self, name: &str, kind: &str) -> Self {
        self.field(
            name,
            FieldKind::Reference(kind.to_string()),
            ParamType::Entity(kind.to_string()),
            true,
        )
    }

    /// List of entities of `kind`, grown through `add<Name>`
    pub fn references(self, name: &str, kind: &str) -> Self {
        let adder = naming::prefixed("add", name);
        let mut schema = self.field(
            name,
            FieldKind::References(kind.to_string()),
            ParamType::Entity(kind.to_string()),
            false,
        );
        schema.operations.insert(Operation::adder(
            adder.clone(),
            Parameter::required(name, ParamType::Entity(kind.to_string())),
        ));
        schema.accessors.insert(adder, Accessor::Add(name.to_string()));
        schema
    }

    /// Free-form map replaced through `set<Name>Specifications`
    pub fn specifications(self, name: &str) -> Self {
        let setter = naming::specifications_setter_name(name);
        let mut schema = self.field(name, FieldKind::Scalar, ParamType::Any, false);
        schema.operations.insert(Operation::setter(
            setter.clone(),
            Parameter::required("specifications", ParamType::Any),
        ));
        schema.accessors.insert(setter, Accessor::Set(name.to_string()));
        schema
    }

    /// Custom operation implemented by `handler`
    pub fn operation(
        mut self,
        operation: Operation,
        handler: impl Fn(&Record, &Arguments) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .insert(operation.name.clone(), Arc::new(handler));
        self.operations.insert(operation);
        self
    }

    /// Field answering `[name]` path lookups
    pub fn named_by(mut self, field: &str) -> Self {
        self.name_field = Some(field.to_string());
        self
    }

    pub fn after_get(
        mut self,
        hook: impl Fn(&Record, &mut IndexMap<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        self.after_get = Some(Arc::new(hook));
        self
    }

    fn field(mut self, name: &str, kind: FieldKind, ty: ParamType, writable: bool) -> Self {
        let getter = naming::prefixed("get", name);
        let setter = naming::prefixed("set", name);

        self.fields.insert(name.to_string(), kind);
        self.operations.insert(Operation::getter(getter.clone()));
        self.accessors
            .insert(getter.clone(), Accessor::Get(name.to_string()));
        if writable {
            self.operations
                .insert(Operation::setter(setter.clone(), Parameter::required(name, ty)));
            self.accessors
                .insert(setter.clone(), Accessor::Set(name.to_string()));
        }
        self.properties = self.properties.with(
            name,
            Some(getter.as_str()),
            writable.then_some(setter.as_str()),
        );
        self
    }
}

// =============================================================================
// Record
// =============================================================================

/// One stored entity
pub struct Record {
    id: i64,
    schema: Arc<RecordSchema>,
    state: AtomicI64,
    values: RwLock<IndexMap<String, Value>>,
    tables: Weak<Tables>,
}

impl Record {
    /// Stored value of a field; references come back as ids
    pub fn value(&self, field: &str) -> Result<Value> {
        match field {
            "id" => Ok(Value::Int(self.id)),
            "state" => Ok(Value::Int(self.state())),
            _ => {
                let values = self
                    .values
                    .read()
                    .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
                Ok(values.get(field).cloned().unwrap_or_default())
            }
        }
    }

    pub fn set_value(&self, field: &str, value: Value) -> Result<()> {
        if !self.schema.fields.contains_key(field) {
            bail!("{} has no field '{}'", self.schema.kind, field);
        }
        let mut values = self
            .values
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        values.insert(field.to_string(), store_form(value));
        Ok(())
    }

    fn resolve(&self, kind: &str, id: &Value) -> Result<Value> {
        let Some(id) = id.as_i64() else {
            return Ok(Value::Null);
        };
        let tables = self
            .tables
            .upgrade()
            .ok_or_else(|| anyhow!("store of {} {} is gone", self.schema.kind, self.id))?;
        Ok(find_record(&tables, kind, id)?
            .map(|record| Value::Entity(record))
            .unwrap_or_default())
    }

    /// Field value with references resolved to entities
    fn read_field(&self, field: &str) -> Result<Value> {
        let raw = self.value(field)?;
        match self.schema.fields.get(field) {
            Some(FieldKind::Reference(kind)) => self.resolve(kind, &raw),
            Some(FieldKind::References(kind)) => {
                let ids = match raw {
                    Value::List(ids) => ids,
                    _ => Vec::new(),
                };
                let mut entities = Vec::with_capacity(ids.len());
                for id in &ids {
                    match self.resolve(kind, id)? {
                        Value::Null => {}
                        entity => entities.push(entity),
                    }
                }
                Ok(Value::List(entities))
            }
            _ => Ok(raw),
        }
    }

    /// Append an entity id to a list field; returns how many were added
    fn add_to(&self, field: &str, value: Value) -> Result<Value> {
        let id = match value {
            Value::Entity(entity) => entity.id(),
            other => other
                .as_i64()
                .ok_or_else(|| anyhow!("cannot add {} to '{}'", other.type_name(), field))?,
        };
        let mut values = self
            .values
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let slot = values
            .entry(field.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        let Value::List(ids) = slot else {
            bail!("field '{}' is not a list", field);
        };
        if ids.iter().any(|v| v.as_i64() == Some(id)) {
            return Ok(Value::Int(0));
        }
        ids.push(Value::Int(id));
        Ok(Value::Int(1))
    }
}

#[async_trait]
impl Entity for Record {
    fn id(&self) -> i64 {
        self.id
    }

    fn kind(&self) -> &str {
        &self.schema.kind
    }

    fn state(&self) -> i64 {
        self.state.load(AtomicOrdering::SeqCst)
    }

    async fn set_state(&self, state: i64) -> Result<()> {
        self.state.store(state, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// Soft delete
    async fn delete(&self) -> Result<()> {
        self.set_state(STATE_DELETED).await
    }

    fn name(&self) -> Option<String> {
        let field = self.schema.name_field.as_deref()?;
        match self.value(field).ok()? {
            Value::Null => None,
            value => Some(value.to_text()),
        }
    }

    fn rest_properties(&self) -> &RestProperties {
        &self.schema.properties
    }

    fn operations(&self) -> &Operations {
        &self.schema.operations
    }

    async fn invoke(&self, operation: &str, args: Arguments) -> Result<Value> {
        if let Some(handler) = self.schema.handlers.get(operation) {
            return handler(self, &args);
        }
        let argument = || args.first().cloned().unwrap_or_default();
        match self.schema.accessors.get(operation) {
            Some(Accessor::Get(field)) => self.read_field(field),
            Some(Accessor::Set(field)) => {
                self.set_value(field, argument())?;
                Ok(Value::Null)
            }
            Some(Accessor::Add(field)) => self.add_to(field, argument()),
            None => bail!(
                "operation '{}' is not implemented by {}",
                operation,
                self.schema.kind
            ),
        }
    }

    async fn after_getting(&self, values: &mut IndexMap<String, Value>) -> Result<()> {
        if let Some(hook) = &self.schema.after_get {
            hook(self, values);
        }
        Ok(())
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Provider over one kind of the in-memory store
pub struct InMemoryProvider {
    schema: Arc<RecordSchema>,
    store: InMemoryStore,
    operations: Operations,
    handlers: HashMap<String, ProviderHandler>,
    read_filter: Option<ReadFilterFn>,
    connected_fetches: AtomicUsize,
}

impl InMemoryProvider {
    /// Add a provider-level operation
    pub fn with_operation(
        mut self,
        operation: Operation,
        handler: impl Fn(&InMemoryProvider, &Arguments) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .insert(operation.name.clone(), Arc::new(handler));
        self.operations.insert(operation);
        self
    }

    /// Restrict what callers may read
    pub fn with_read_filter(
        mut self,
        filter: impl Fn(&Caller) -> Vec<Filter> + Send + Sync + 'static,
    ) -> Self {
        self.read_filter = Some(Arc::new(filter));
        self
    }

    /// Store a record; `id` and `state` are taken from `values` when present
    pub fn insert<'a>(&self, values: impl IntoIterator<Item = (&'a str, Value)>) -> Result<Arc<Record>> {
        let values = values
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        self.store.insert(&self.schema, values)
    }

    /// Run canonical filters over the stored records
    pub fn query(&self, filters: &[Filter], active_only: bool) -> Result<Vec<EntityRef>> {
        let mut records = self.store.records(&self.schema.kind)?;
        records.sort_by_key(|record| record.id);
        if active_only {
            records.retain(|record| record.is_active());
        }

        let mut sort_keys: Vec<SortKey> = Vec::new();
        let mut limit = None;
        let mut offset = 0;
        for filter in filters {
            match filter {
                Filter::Field { field, op, values } => {
                    let mut kept = Vec::with_capacity(records.len());
                    for record in records {
                        if evaluate(&record.value(field)?, *op, values)? {
                            kept.push(record);
                        }
                    }
                    records = kept;
                }
                Filter::Sort(keys) => sort_keys.extend(keys.iter().cloned()),
                Filter::MaxRowCount(n) => limit = Some(*n),
                Filter::RowOffset(n) => offset = *n,
            }
        }

        if !sort_keys.is_empty() {
            let mut keyed = Vec::with_capacity(records.len());
            for record in records {
                let key = sort_keys
                    .iter()
                    .map(|k| record.value(&k.field))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((key, record));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(&sort_keys, a, b));
            records = keyed.into_iter().map(|(_, record)| record).collect();
        }

        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| record as EntityRef)
            .collect())
    }

    /// Number of `fetch_connected` calls so far
    pub fn connected_fetches(&self) -> usize {
        self.connected_fetches.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn kind(&self) -> &str {
        &self.schema.kind
    }

    async fn get(&self, id: i64) -> Result<Option<EntityRef>> {
        Ok(self
            .store
            .record(&self.schema.kind, id)?
            .map(|record| record as EntityRef))
    }

    async fn get_instances(&self, filters: &[Filter]) -> Result<Vec<EntityRef>> {
        self.query(filters, false)
    }

    async fn get_active_instances(&self, filters: &[Filter]) -> Result<Vec<EntityRef>> {
        self.query(filters, true)
    }

    async fn get_active_instance_count(&self) -> Result<u64> {
        let records = self.store.records(&self.schema.kind)?;
        Ok(records.iter().filter(|r| r.is_active()).count() as u64)
    }

    async fn read_filters_for_caller(&self, caller: &Caller) -> Result<Vec<Filter>> {
        Ok(self
            .read_filter
            .as_ref()
            .map(|filter| filter(caller))
            .unwrap_or_default())
    }

    /// Creates an empty record; properties are applied by the caller
    async fn create_instance(&self, _data: Value) -> Result<Value> {
        let record = self.store.insert(&self.schema, IndexMap::new())?;
        Ok(Value::Entity(record))
    }

    fn rest_properties(&self) -> &RestProperties {
        &self.schema.properties
    }

    fn operations(&self) -> &Operations {
        &self.operations
    }

    async fn invoke(&self, operation: &str, args: Arguments) -> Result<Value> {
        match self.handlers.get(operation) {
            Some(handler) => handler(self, &args),
            None => bail!(
                "operation '{}' is not implemented by provider {}",
                operation,
                self.schema.kind
            ),
        }
    }

    async fn fetch_connected(&self, entities: &[EntityRef]) -> Result<()> {
        self.connected_fetches.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::debug!(kind = %self.schema.kind, count = entities.len(), "connected data loaded");
        Ok(())
    }
}

// =============================================================================
// Filter evaluation
// =============================================================================

fn compare_keys(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    keys.iter()
        .zip(a.iter().zip(b.iter()))
        .map(|(key, (x, y))| {
            let ordering = x.compare(y);
            if key.descending {
                ordering.reverse()
            } else {
                ordering
            }
        })
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_text() == b.to_text(),
    }
}

/// Whether a stored value passes one field filter
fn evaluate(value: &Value, op: FilterOp, operands: &[Value]) -> Result<bool> {
    let candidates: Vec<&Value> = match value {
        Value::List(items) => items.iter().collect(),
        other => vec![other],
    };

    Ok(match op {
        FilterOp::Equal => candidates
            .iter()
            .any(|c| operands.iter().any(|o| loosely_equal(c, o))),
        FilterOp::NotEqual => !candidates
            .iter()
            .any(|c| operands.iter().any(|o| loosely_equal(c, o))),
        FilterOp::IsNull => value.is_null(),
        FilterOp::Contains => any_text(value, operands, |t, o| t.contains(o)),
        FilterOp::StartsWith => any_text(value, operands, |t, o| t.starts_with(o)),
        FilterOp::EndsWith => any_text(value, operands, |t, o| t.ends_with(o)),
        FilterOp::AtLeast => {
            !value.is_null() && operands.iter().all(|o| value.compare(o) != Ordering::Less)
        }
        FilterOp::AtMost => {
            !value.is_null() && operands.iter().all(|o| value.compare(o) != Ordering::Greater)
        }
        FilterOp::Matches | FilterOp::NotMatches => {
            let pattern = operands.first().map(Value::to_text).unwrap_or_default();
            let matched = Regex::new(&pattern)?.is_match(&value.to_text());
            matched == (op == FilterOp::Matches)
        }
        FilterOp::Distance => match (point(value), operands) {
            (Some((lat, lng)), [origin_lat, origin_lng, max]) => {
                match (origin_lat.as_f64(), origin_lng.as_f64(), max.as_f64()) {
                    (Some(olat), Some(olng), Some(max)) => haversine_km(lat, lng, olat, olng) <= max,
                    _ => false,
                }
            }
            _ => false,
        },
    })
}

/// Case-insensitive text test against any operand
fn any_text(value: &Value, operands: &[Value], test: fn(&str, &str) -> bool) -> bool {
    let text = value.to_text().to_lowercase();
    operands
        .iter()
        .any(|o| test(&text, &o.to_text().to_lowercase()))
}

/// `{lat, lng}` or `[lat, lng]`
fn point(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Map(map) => Some((map.get("lat")?.as_f64()?, map.get("lng")?.as_f64()?)),
        Value::List(items) => match items.as_slice() {
            [lat, lng] => Some((lat.as_f64()?, lng.as_f64()?)),
            _ => None,
        },
        _ => None,
    }
}

fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
