//! Explicit operation registry
//!
//! Providers and entities declare the operations they expose once, as a table
//! keyed by operation name. Dispatch resolves path words against this table
//! instead of inspecting types at runtime.

use crate::core::error::RequestError;
use crate::core::value::Value;
use indexmap::IndexMap;

/// What an operation does, as far as dispatch is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Reads a value (`get*`)
    Getter,
    /// Writes a property (`set*`)
    Setter,
    /// Appends to a collection (`add*`)
    Adder,
    /// Creates a new instance (`create*`)
    Creator,
    /// Provider-level setter that takes the raw body
    StaticSetter,
    /// Anything else callable by name
    Action,
}

impl OperationKind {
    /// Naming convention prefix resolved from a path word
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            OperationKind::Getter => Some("get"),
            OperationKind::Setter | OperationKind::StaticSetter => Some("set"),
            OperationKind::Adder => Some("add"),
            OperationKind::Creator => Some("create"),
            OperationKind::Action => None,
        }
    }
}

/// Declared type of an operation parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Integer,
    Boolean,
    Text,
    /// An entity of the given kind, addressed by id or `{href}`
    Entity(String),
    /// Passed through unchanged
    Any,
}

impl ParamType {
    /// Coerce a scalar value to this type
    ///
    /// Entity parameters are left untouched; resolving them needs the provider
    /// registry and happens during dispatch.
    pub fn coerce(&self, argument: &str, value: Value) -> Result<Value, RequestError> {
        let invalid = |message: &str| RequestError::InvalidArgument {
            argument: argument.to_string(),
            message: message.to_string(),
        };

        match self {
            ParamType::Any | ParamType::Entity(_) => Ok(value),
            _ if value.is_null() => Ok(Value::Null),
            ParamType::Float => value
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| invalid("expected a number")),
            ParamType::Integer => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| invalid("expected an integer")),
            ParamType::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::Str(s) => match s.as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" | "" => Ok(Value::Bool(false)),
                    _ => Err(invalid("expected a boolean")),
                },
                other => Ok(Value::Bool(other.is_truthy())),
            },
            ParamType::Text => match value {
                Value::Str(_) => Ok(value),
                Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                    Ok(Value::Str(value.to_text()))
                }
                _ => Err(invalid("expected a string")),
            },
        }
    }
}

/// A declared operation parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: ParamType,
    /// Value used when the caller omits an optional parameter
    pub default: Option<Value>,
    pub required: bool,
}

impl Parameter {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
            required: false,
        }
    }
}

/// A named operation and its parameter descriptors
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    /// Explicitly marked as a getter callable under its exact name
    pub is_getter: bool,
    pub params: Vec<Parameter>,
    /// The operation honors limit/offset itself; its result is not sliced
    pub self_paginating: bool,
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_getter: false,
            params: Vec::new(),
            self_paginating: false,
        }
    }

    pub fn getter(name: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Getter)
    }

    pub fn setter(name: impl Into<String>, param: Parameter) -> Self {
        Self::new(name, OperationKind::Setter).param(param)
    }

    pub fn adder(name: impl Into<String>, param: Parameter) -> Self {
        Self::new(name, OperationKind::Adder).param(param)
    }

    /// Mark as callable by its exact name from a path word
    pub fn marked_getter(mut self) -> Self {
        self.is_getter = true;
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn self_paginating(mut self) -> Self {
        self.self_paginating = true;
        self
    }

    pub fn first_param(&self) -> Option<&Parameter> {
        self.params.first()
    }
}

/// Per-type table of operations, built once
#[derive(Debug, Clone, Default)]
pub struct Operations {
    by_name: IndexMap<String, Operation>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, operation: Operation) -> Self {
        self.insert(operation);
        self
    }

    pub fn insert(&mut self, operation: Operation) {
        self.by_name.insert(operation.name.clone(), operation);
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Arguments bound to an operation's parameters, in declaration order
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, value: Value) -> Self {
        let mut args = Self::new();
        args.push(name, value);
        args
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.get_index(0).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Property name mapped to the operations that read and write it
#[derive(Debug, Clone, Default)]
pub struct RestProperties {
    by_name: IndexMap<String, PropertyAccess>,
}

/// Getter/setter pair of one REST property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAccess {
    pub getter: Option<String>,
    pub setter: Option<String>,
}

impl RestProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        getter: Option<&str>,
        setter: Option<&str>,
    ) -> Self {
        self.by_name.insert(
            name.into(),
            PropertyAccess {
                getter: getter.map(str::to_string),
                setter: setter.map(str::to_string),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyAccess> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyAccess)> {
        self.by_name.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
