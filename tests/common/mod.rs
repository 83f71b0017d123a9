//! Shared fixture: users and cities in the in-memory store behind a
//! `TestServer`

#![allow(dead_code)]

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestRequest, TestServer};
use restack::core::MemoryGuard;
use restack::core::operation::OperationKind;
use restack::prelude::*;
use std::sync::Arc;

pub const HOST: &str = "https://api.example.com";
pub const ANN_TOKEN: &str = "token-ann";
/// Caller whose read filter hides user 42
pub const RESTRICTED_TOKEN: &str = "token-99";

pub struct StaticTokens;

#[async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> Result<Option<Caller>> {
        Ok(match token {
            ANN_TOKEN => Some(Caller::User {
                user_id: 1,
                roles: vec!["member".to_string()],
            }),
            RESTRICTED_TOKEN => Some(Caller::User {
                user_id: 99,
                roles: vec![],
            }),
            _ => None,
        })
    }
}

pub struct Fixture {
    pub server: TestServer,
    pub users: Arc<InMemoryProvider>,
    pub cities: Arc<InMemoryProvider>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_guard(None)
    }

    /// Fixture whose shaping guard always reports `used` bytes against a
    /// 100 byte ceiling
    pub fn with_memory_usage(used: u64) -> Self {
        Self::with_guard(Some(MemoryGuard::with_probe(
            Some(100),
            1,
            Arc::new(move || Some(used)),
        )))
    }

    fn with_guard(guard: Option<MemoryGuard>) -> Self {
        let store = InMemoryStore::new();
        let cities = Arc::new(city_provider(&store));
        let users = Arc::new(user_provider(&store));
        seed(&users, &cities).expect("Failed to seed store");

        let config = RestConfig {
            host: HOST.to_string(),
            public_paths: vec!["cities*".to_string()],
            ..RestConfig::default()
        }
        .with_path("users", "user")
        .with_path("cities", "city")
        .with_path("things", "thing");

        let mut builder = ServerBuilder::new()
            .with_config(config)
            .with_provider_ref(users.clone())
            .with_provider_ref(cities.clone())
            .with_provider(thing_provider(&store))
            .with_authenticator(StaticTokens);
        if let Some(guard) = guard {
            builder = builder.with_memory_guard(guard);
        }
        let app = builder.build().expect("Failed to build app");
        let server = TestServer::new(app);

        Self {
            server,
            users,
            cities,
        }
    }

    pub fn get(&self, path: &str) -> TestRequest {
        self.server.get(path).add_header(auth_name(), bearer(ANN_TOKEN))
    }

    pub fn post(&self, path: &str) -> TestRequest {
        self.server.post(path).add_header(auth_name(), bearer(ANN_TOKEN))
    }

    pub fn put(&self, path: &str) -> TestRequest {
        self.server.put(path).add_header(auth_name(), bearer(ANN_TOKEN))
    }

    pub fn delete(&self, path: &str) -> TestRequest {
        self.server.delete(path).add_header(auth_name(), bearer(ANN_TOKEN))
    }
}

pub fn auth_name() -> HeaderName {
    header::AUTHORIZATION
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).expect("valid header value")
}

pub fn href(endpoint: &str, id: i64) -> String {
    format!("{}/v1/{}/{}", HOST, endpoint, id)
}

/// Names of the elements of a JSON array body
pub fn names(body: &serde_json::Value) -> Vec<String> {
    body.as_array()
        .expect("expected an array body")
        .iter()
        .map(|item| item["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn city_provider(store: &InMemoryStore) -> InMemoryProvider {
    store.provider(
        RecordSchema::new("city")
            .property("name", ParamType::Text)
            .property("location", ParamType::Any),
    )
}

fn user_provider(store: &InMemoryStore) -> InMemoryProvider {
    let schema = RecordSchema::new("user")
        .property("name", ParamType::Text)
        .property("email", ParamType::Text)
        .property("age", ParamType::Integer)
        .reference("city", "city")
        .references("friends", "user")
        .read_only("seen", ParamType::Boolean)
        .specifications("notifications")
        .named_by("name")
        .operation(Operation::new("markSeen", OperationKind::Action), |record, _| {
            record.set_value("seen", Value::Bool(true))?;
            Ok(Value::Null)
        })
        .operation(
            Operation::getter("getGreeting").param(Parameter::optional(
                "salutation",
                ParamType::Text,
                Value::from("Hello"),
            )),
            |record, args| {
                let salutation = args.get("salutation").map(Value::to_text).unwrap_or_default();
                Ok(Value::from(format!(
                    "{} {}",
                    salutation,
                    record.value("name")?.to_text()
                )))
            },
        )
        .operation(Operation::getter("getAdult"), |record, _| {
            Ok(Value::Bool(record.value("age")?.as_i64().unwrap_or(0) >= 18))
        })
        .after_get(|_, values| {
            let initial = values
                .get("name")
                .and_then(|name| name.to_text().chars().next())
                .map(|c| Value::from(c.to_string()))
                .unwrap_or_default();
            values.insert("initial".to_string(), initial);
        });

    store
        .provider(schema)
        .with_operation(Operation::getter("getAdults"), |users, _| {
            let adults = users.query(
                &[Filter::field(
                    "age",
                    FilterOp::AtLeast,
                    vec![Value::Int(18)],
                )],
                true,
            )?;
            Ok(Value::List(adults.into_iter().map(Value::Entity).collect()))
        })
        .with_operation(Operation::getter("getCount"), |users, _| {
            Ok(Value::Int(users.query(&[], true)?.len() as i64))
        })
        .with_operation(Operation::getter("newest").marked_getter(), |users, _| {
            let newest = users.query(
                &[
                    Filter::Sort(vec![SortKey::descending("id")]),
                    Filter::MaxRowCount(1),
                ],
                true,
            )?;
            Ok(newest.into_iter().next().map(Value::Entity).unwrap_or_default())
        })
        .with_operation(Operation::getter("getEveryone").self_paginating(), |users, _| {
            let everyone = users.query(&[], false)?;
            Ok(Value::List(everyone.into_iter().map(Value::Entity).collect()))
        })
        .with_operation(
            Operation::new("createInvite", OperationKind::Creator)
                .param(Parameter::required("email", ParamType::Text)),
            |users, args| {
                let email = args.get("email").cloned().unwrap_or_default();
                Ok(Value::Entity(users.insert([("email", email)])?))
            },
        )
        .with_operation(
            Operation::new("setDefaults", OperationKind::StaticSetter)
                .param(Parameter::required("defaults", ParamType::Any)),
            |_, _| Ok(Value::Null),
        )
        .with_operation(Operation::new("setFrozen", OperationKind::Action), |_, _| {
            Ok(Value::from("frozen"))
        })
        .with_read_filter(|caller| match caller.user_id() {
            Some(99) => vec![Filter::field(
                "id",
                FilterOp::NotEqual,
                vec![Value::Int(42)],
            )],
            _ => Vec::new(),
        })
}

/// Non-entity results, one per representation an object can offer
struct Sample {
    name: &'static str,
    capability: Capability,
}

impl RestObject for Sample {
    fn type_name(&self) -> &str {
        self.name
    }

    fn capability(&self) -> Capability {
        self.capability.clone()
    }
}

fn sample(name: &'static str, capability: Capability) -> Value {
    Value::Object(Arc::new(Sample { name, capability }))
}

/// Getters `texts`, `counts`, `pair`, `opaque`, `wrapped` and `hidden` on the
/// `things` path
fn thing_provider(store: &InMemoryStore) -> InMemoryProvider {
    let text = || sample("Label", Capability::Text("hi".to_string()));
    let blob = || sample("Blob", Capability::Opaque);

    store
        .provider(RecordSchema::new("thing"))
        .with_operation(Operation::getter("getTexts"), move |_, _| {
            Ok(Value::List(vec![text(), text()]))
        })
        .with_operation(Operation::getter("getCounts"), |_, _| {
            Ok(Value::List(vec![
                sample("Counter", Capability::Integer(1)),
                sample("Counter", Capability::Integer(2)),
            ]))
        })
        .with_operation(Operation::getter("getPair"), |_, _| {
            let mut values = indexmap::IndexMap::new();
            values.insert("left".to_string(), Value::Int(1));
            values.insert("right".to_string(), Value::from("r"));
            Ok(sample("Pair", Capability::Array(values)))
        })
        .with_operation(Operation::getter("getOpaque"), move |_, _| Ok(blob()))
        .with_operation(Operation::getter("getWrapped"), move |_, _| {
            let mut values = indexmap::IndexMap::new();
            values.insert("label".to_string(), text());
            Ok(Value::Map(values))
        })
        .with_operation(Operation::getter("getHidden"), move |_, _| {
            let mut values = indexmap::IndexMap::new();
            values.insert("blob".to_string(), blob());
            Ok(Value::Map(values))
        })
}

fn location(lat: f64, lng: f64) -> Value {
    let mut map = indexmap::IndexMap::new();
    map.insert("lat".to_string(), Value::Float(lat));
    map.insert("lng".to_string(), Value::Float(lng));
    Value::Map(map)
}

/// Users 1 Ann, 2 Bob, 3 Cy, 42 Dee and the deleted 5 Eve; cities 1 Delft
/// and 2 Paris
fn seed(users: &InMemoryProvider, cities: &InMemoryProvider) -> Result<()> {
    cities.insert([
        ("id", Value::Int(1)),
        ("name", Value::from("Delft")),
        ("location", location(52.01, 4.36)),
    ])?;
    cities.insert([
        ("id", Value::Int(2)),
        ("name", Value::from("Paris")),
        ("location", location(48.85, 2.35)),
    ])?;

    users.insert([
        ("id", Value::Int(1)),
        ("name", Value::from("Ann")),
        ("email", Value::from("ann@example.com")),
        ("age", Value::Int(30)),
        ("city", Value::Int(1)),
        ("friends", Value::List(vec![Value::Int(2), Value::Int(3)])),
    ])?;
    users.insert([
        ("id", Value::Int(2)),
        ("name", Value::from("Bob")),
        ("email", Value::from("bob@example.com")),
        ("age", Value::Int(17)),
        ("city", Value::Int(2)),
    ])?;
    users.insert([
        ("id", Value::Int(3)),
        ("name", Value::from("Cy")),
        ("age", Value::Int(45)),
        ("city", Value::Int(1)),
    ])?;
    users.insert([
        ("id", Value::Int(42)),
        ("name", Value::from("Dee")),
        ("age", Value::Int(30)),
    ])?;
    users.insert([
        ("id", Value::Int(5)),
        ("name", Value::from("Eve")),
        ("age", Value::Int(50)),
        ("state", Value::Int(STATE_DELETED)),
    ])?;
    Ok(())
}
