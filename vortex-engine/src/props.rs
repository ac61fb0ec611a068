//! Typed property bag passed to a node constructor at `init` (§4.2).
//!
//! The compiler (`compiler.rs`) turns each pipeline stage's `.method(args)`
//! chain into a flat `Properties` map before constructing the node; this
//! keeps node constructors free of parsing concerns.

use std::collections::HashMap;

use vortex_grammar::{parse, Expr};
use vortex_shared::VortexError;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Expr(Expr),
    List(Vec<PropertyValue>),
}

#[derive(Debug, Clone, Default)]
pub struct Properties(pub HashMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, key: &str, value: PropertyValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<&str, VortexError> {
        match self.0.get(key) {
            Some(PropertyValue::Str(s)) => Ok(s.as_str()),
            Some(other) => Err(VortexError::ValidationError(format!(
                "property {key} expected str, found {other:?}"
            ))),
            None => Err(VortexError::ValidationError(format!("missing property {key}"))),
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, VortexError> {
        match self.0.get(key) {
            Some(PropertyValue::Num(n)) => Ok(*n),
            Some(other) => Err(VortexError::ValidationError(format!(
                "property {key} expected num, found {other:?}"
            ))),
            None => Err(VortexError::ValidationError(format!("missing property {key}"))),
        }
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        match self.0.get(key) {
            Some(PropertyValue::Num(n)) => *n,
            _ => default,
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(PropertyValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn get_expr(&self, key: &str) -> Result<Expr, VortexError> {
        match self.0.get(key) {
            Some(PropertyValue::Expr(e)) => Ok(e.clone()),
            Some(PropertyValue::Str(s)) => {
                parse(s).map_err(|e| VortexError::ValidationError(format!("{key}: {e}")))
            }
            Some(other) => Err(VortexError::ValidationError(format!(
                "property {key} expected expr, found {other:?}"
            ))),
            None => Err(VortexError::ValidationError(format!("missing property {key}"))),
        }
    }

    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>, VortexError> {
        match self.0.get(key) {
            Some(PropertyValue::List(items)) => items
                .iter()
                .map(|v| match v {
                    PropertyValue::Str(s) => Ok(s.clone()),
                    other => Err(VortexError::ValidationError(format!(
                        "property {key} expects a list of str, found {other:?}"
                    ))),
                })
                .collect(),
            Some(PropertyValue::Str(s)) => Ok(vec![s.clone()]),
            None => Ok(Vec::new()),
            Some(other) => Err(VortexError::ValidationError(format!(
                "property {key} expected list, found {other:?}"
            ))),
        }
    }
}
