//! Argument collection.
//!
//! Every RPC method declares a [`ParamSchema`]. [`collect`] merges a request's
//! positional and named arguments against it into one [`NamedArgs`] map that
//! both the local write and the fan-out read from.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use wserver_protocol::defaults::DESTINATION_PARAM;

/// Parameter name -> value, iterated in key order.
pub type NamedArgs = BTreeMap<String, Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Missing required argument: {0}")]
    Missing(String),

    #[error("Too many positional arguments: expected at most {expected}, got {got}")]
    TooManyPositional { expected: usize, got: usize },
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Option<Value>,
    pub required: bool,
}

/// Ordered parameter list of one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter that must be supplied.
    pub fn required(mut self, name: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            default: None,
            required: true,
        });
        self
    }

    /// Parameter that falls back to `default` when not supplied.
    pub fn with_default(mut self, name: &'static str, default: impl Into<Value>) -> Self {
        self.params.push(ParamSpec {
            name,
            default: Some(default.into()),
            required: false,
        });
        self
    }

    /// Parameter that is simply left out when not supplied.
    pub fn optional(mut self, name: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            default: None,
            required: false,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Merge positional and named arguments against `schema`.
///
/// Positional values bind in declaration order, named values override or
/// extend them, and defaults fill whatever is still unset. An unsupplied
/// destination selector becomes `null`, meaning "every broadcast polygon".
pub fn collect(
    schema: &ParamSchema,
    positional: &[Value],
    named: &Map<String, Value>,
) -> Result<NamedArgs, ArgsError> {
    if positional.len() > schema.len() {
        return Err(ArgsError::TooManyPositional {
            expected: schema.len(),
            got: positional.len(),
        });
    }

    let mut args: NamedArgs = schema
        .params
        .iter()
        .zip(positional)
        .map(|(spec, value)| (spec.name.to_string(), value.clone()))
        .collect();

    for (name, value) in named {
        args.insert(name.clone(), value.clone());
    }

    for spec in &schema.params {
        if args.contains_key(spec.name) {
            continue;
        }
        if let Some(default) = &spec.default {
            args.insert(spec.name.to_string(), default.clone());
        } else if spec.name == DESTINATION_PARAM {
            args.insert(spec.name.to_string(), Value::Null);
        } else if spec.required {
            return Err(ArgsError::Missing(spec.name.to_string()));
        }
    }

    Ok(args)
}
