//! Minimal JSON-Schema subset registry and validator.
//!
//! Two registries exist at runtime: one owned per-bus-instance (created
//! fresh with each [`crate::bus::PubSubBus`]) and a process-wide global
//! instance behind a `OnceLock<Mutex<_>>` for advanced callers — the two
//! never share state, satisfying spec §4.3/§9's "global registry remains
//! available... but must not affect per-instance registries."

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, OnceLock},
};

use regex::Regex;
use serde_json::Value;

/// Maximum pattern length accepted at registration or validation time.
pub const MAX_PATTERN_LENGTH: usize = 256;
/// Maximum string length a `pattern` is tested against.
pub const MAX_REGEX_TEST_STRING_LENGTH: usize = 10_000;

const DANGEROUS_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// A registered schema: a JSON object describing the validated subset of
/// JSON Schema (`type`, `properties`, `required`, `additionalProperties`,
/// `enum`, `minimum`/`maximum`, `minLength`/`maxLength`, `pattern`,
/// `items`). Unknown keywords are ignored, matching JSON Schema's
/// "ignore unknown keywords" stance.
pub type Schema = Value;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Errors raised at schema registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object")]
    NotAnObject,
    #[error("schema property name '{0}' is not allowed")]
    DangerousKey(String),
    #[error("schema pattern is classified unsafe: {0}")]
    UnsafePattern(String),
    #[error("no schema registered for id '{0}'")]
    NotFound(String),
}

/// Per-instance (or global) schema registry.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` under `id`.
    ///
    /// # Errors
    ///
    /// Rejects a non-object schema, any `properties` key that is
    /// `__proto__`/`constructor`/`prototype`, and any `pattern`
    /// classified unsafe by [`is_unsafe_pattern`].
    pub fn register<S: Into<String>>(&mut self, id: S, schema: Schema) -> Result<(), SchemaError> {
        check_schema_safety(&schema)?;
        self.schemas.insert(id.into(), schema);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    /// Validates `payload` against the schema registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] if no schema is registered.
    pub fn validate(&self, id: &str, payload: &Value) -> Result<Vec<ValidationError>, SchemaError> {
        let schema = self
            .schemas
            .get(id)
            .ok_or_else(|| SchemaError::NotFound(id.to_string()))?;
        Ok(validate_value(schema, payload, "$"))
    }
}

fn check_schema_safety(schema: &Schema) -> Result<(), SchemaError> {
    let Value::Object(map) = schema else {
        return Err(SchemaError::NotAnObject);
    };

    if let Some(Value::Object(properties)) = map.get("properties") {
        for (key, sub_schema) in properties {
            if DANGEROUS_KEYS.contains(&key.as_str()) {
                return Err(SchemaError::DangerousKey(key.clone()));
            }
            check_schema_safety(sub_schema)?;
        }
    }

    if let Some(Value::String(pattern)) = map.get("pattern") {
        if is_unsafe_pattern(pattern) {
            return Err(SchemaError::UnsafePattern(pattern.clone()));
        }
    }

    if let Some(items) = map.get("items") {
        check_schema_safety(items)?;
    }

    Ok(())
}

/// Evaluates a single JSON value against a schema, returning every
/// violation found (not just the first).
fn validate_value(schema: &Schema, value: &Value, path: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let Value::Object(map) = schema else {
        return errors;
    };

    if let Some(Value::String(ty)) = map.get("type") {
        if !matches_type(ty, value) {
            errors.push(ValidationError {
                path: path.to_string(),
                message: format!("expected type '{ty}'"),
            });
            return errors;
        }
    }

    if let Some(Value::Array(allowed)) = map.get("enum") {
        if !allowed.contains(value) {
            errors.push(ValidationError {
                path: path.to_string(),
                message: "value is not one of the allowed enum values".to_string(),
            });
        }
    }

    match value {
        Value::Object(obj) => {
            validate_object(map, obj, path, &mut errors);
        }
        Value::Array(items) => {
            validate_array(map, items, path, &mut errors);
        }
        Value::String(s) => {
            validate_string(map, s, path, &mut errors);
        }
        Value::Number(n) => {
            validate_number(map, n.as_f64().unwrap_or(f64::NAN), path, &mut errors);
        }
        _ => {}
    }

    errors
}

fn validate_object(
    schema: &serde_json::Map<String, Value>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    // Own-property checks only: inherited properties never satisfy
    // `required`, and a serde_json::Map has no prototype chain anyway,
    // so own-property semantics are the only semantics here — but a
    // dangerous own key is still rejected immediately on sight.
    for key in obj.keys() {
        if DANGEROUS_KEYS.contains(&key.as_str()) {
            errors.push(ValidationError {
                path: format!("{path}.{key}"),
                message: format!("property name '{key}' is not allowed"),
            });
        }
    }

    let properties = match schema.get("properties") {
        Some(Value::Object(p)) => Some(p),
        _ => None,
    };

    if let Some(Value::Array(required)) = schema.get("required") {
        for req in required {
            if let Value::String(key) = req {
                if !obj.contains_key(key) {
                    errors.push(ValidationError {
                        path: format!("{path}.{key}"),
                        message: "missing required property".to_string(),
                    });
                }
            }
        }
    }

    if let Some(properties) = properties {
        for (key, sub_schema) in properties {
            if let Some(v) = obj.get(key) {
                errors.extend(validate_value(sub_schema, v, &format!("{path}.{key}")));
            }
        }
    }

    if matches!(schema.get("additionalProperties"), Some(Value::Bool(false))) {
        let allowed: BTreeMap<&str, ()> = properties
            .map(|p| p.keys().map(|k| (k.as_str(), ())).collect())
            .unwrap_or_default();
        for key in obj.keys() {
            if !allowed.contains_key(key.as_str()) {
                errors.push(ValidationError {
                    path: format!("{path}.{key}"),
                    message: "additional property is not allowed".to_string(),
                });
            }
        }
    }
}

fn validate_array(
    schema: &serde_json::Map<String, Value>,
    items: &[Value],
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            errors.extend(validate_value(item_schema, item, &format!("{path}[{i}]")));
        }
    }
}

fn validate_string(
    schema: &serde_json::Map<String, Value>,
    s: &str,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(Value::Number(n)) = schema.get("minLength") {
        if let Some(min) = n.as_u64() {
            if (s.chars().count() as u64) < min {
                errors.push(ValidationError {
                    path: path.to_string(),
                    message: format!("string shorter than minLength {min}"),
                });
            }
        }
    }
    if let Some(Value::Number(n)) = schema.get("maxLength") {
        if let Some(max) = n.as_u64() {
            if (s.chars().count() as u64) > max {
                errors.push(ValidationError {
                    path: path.to_string(),
                    message: format!("string longer than maxLength {max}"),
                });
            }
        }
    }
    if let Some(Value::String(pattern)) = schema.get("pattern") {
        if pattern.len() > MAX_PATTERN_LENGTH || s.len() > MAX_REGEX_TEST_STRING_LENGTH {
            return;
        }
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => errors.push(ValidationError {
                path: path.to_string(),
                message: format!("string does not match pattern '{pattern}'"),
            }),
            _ => {}
        }
    }
}

fn validate_number(
    schema: &serde_json::Map<String, Value>,
    n: f64,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(Value::Number(min)) = schema.get("minimum") {
        if let Some(min) = min.as_f64() {
            if n < min {
                errors.push(ValidationError {
                    path: path.to_string(),
                    message: format!("value below minimum {min}"),
                });
            }
        }
    }
    if let Some(Value::Number(max)) = schema.get("maximum") {
        if let Some(max) = max.as_f64() {
            if n > max {
                errors.push(ValidationError {
                    path: path.to_string(),
                    message: format!("value above maximum {max}"),
                });
            }
        }
    }
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Known-evil patterns rejected outright regardless of the structural
/// heuristics below.
const EVIL_PATTERNS: [&str; 5] = [
    r"(.*)+",
    r"(.+)+",
    r"(\s+)+",
    r"(\w+)+",
    r"(\d+)+",
];

/// Classifies a regex pattern as unsafe (ReDoS-prone) using structural
/// heuristics rather than running it: nested quantifiers, alternation
/// inside a quantified group whose branches share a prefix, a quantified
/// character class inside a quantified group, and a table of well-known
/// evil patterns.
#[must_use]
pub fn is_unsafe_pattern(pattern: &str) -> bool {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return true;
    }
    if EVIL_PATTERNS.iter().any(|evil| pattern.contains(evil)) {
        return true;
    }
    if has_nested_quantifiers(pattern) {
        return true;
    }
    if has_quantified_alternation_with_shared_prefix(pattern) {
        return true;
    }
    if has_quantified_class_inside_quantified_group(pattern) {
        return true;
    }
    false
}

/// Finds a parenthesized group immediately followed by a quantifier,
/// where the group's own contents end in a quantified token — i.e.
/// `(...[+*])[+*?]` or `(...[+*?])[+*]`.
fn has_nested_quantifiers(pattern: &str) -> bool {
    for (group, trailing_quantifier) in iter_quantified_groups(pattern) {
        if trailing_quantifier {
            let trimmed = group.trim_end_matches(['+', '*', '?']);
            if trimmed.len() < group.len() && trimmed.ends_with(['+', '*']) {
                return true;
            }
            // Also catch a bare inner quantifier anywhere followed by
            // more quantified content, e.g. "a+b+" inside a quantified
            // group: any quantifier char preceding another quantified
            // atom is already risky combined with the outer repetition.
            if group.chars().filter(|c| matches!(c, '+' | '*')).count() >= 2 {
                return true;
            }
        }
    }
    false
}

/// Finds `(a|ab)+`-shaped groups: an alternation inside a quantified
/// group where two branches share a non-empty prefix.
fn has_quantified_alternation_with_shared_prefix(pattern: &str) -> bool {
    for (group, trailing_quantifier) in iter_quantified_groups(pattern) {
        if !trailing_quantifier || !group.contains('|') {
            continue;
        }
        let branches: Vec<&str> = group.split('|').collect();
        for i in 0..branches.len() {
            for j in (i + 1)..branches.len() {
                if shares_nonempty_prefix(branches[i], branches[j]) {
                    return true;
                }
            }
        }
    }
    false
}

fn shares_nonempty_prefix(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches('(');
    let b = b.trim_start_matches('(');
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.chars().next() == b.chars().next()
}

/// Finds a quantified character class (`[...]+`/`[...]*`) nested inside
/// an outer quantified group.
fn has_quantified_class_inside_quantified_group(pattern: &str) -> bool {
    for (group, trailing_quantifier) in iter_quantified_groups(pattern) {
        if !trailing_quantifier {
            continue;
        }
        let bytes = group.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'[' {
                if let Some(close) = group[i..].find(']') {
                    let after = i + close + 1;
                    if after < bytes.len() && matches!(bytes[after], b'+' | b'*') {
                        return true;
                    }
                    i = after;
                    continue;
                }
            }
            i += 1;
        }
    }
    false
}

/// Yields `(group_inner_text, has_trailing_quantifier)` for every
/// top-level parenthesized group in `pattern`.
fn iter_quantified_groups(pattern: &str) -> Vec<(&str, bool)> {
    let bytes = pattern.as_bytes();
    let mut groups = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            let mut depth = 1;
            let mut j = i + 1;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                let inner = &pattern[i + 1..j - 1];
                let trailing = j < bytes.len() && matches!(bytes[j], b'+' | b'*');
                groups.push((inner, trailing));
                i = j;
                continue;
            }
        }
        i += 1;
    }
    groups
}

static GLOBAL_REGISTRY: OnceLock<Mutex<SchemaRegistry>> = OnceLock::new();

/// The process-wide schema registry. Shares no state with any
/// per-instance [`SchemaRegistry`] a bus owns.
pub fn global_registry() -> &'static Mutex<SchemaRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| Mutex::new(SchemaRegistry::new()))
}
