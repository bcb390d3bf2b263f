//! Request validation from catalog rules. Rule keys are dotted field paths.

use crate::config::{FieldKind, ValidationRule};
use crate::error::AppError;
use crate::query::parse_timestamp;
use crate::store::lookup_path;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-field rules. All required fields must be present.
    pub fn validate(body: &Map<String, Value>, rules: &HashMap<String, ValidationRule>) -> Result<(), AppError> {
        for (path, rule) in sorted(rules) {
            check(body, path, rule)?;
        }
        Ok(())
    }

    /// Validate a PATCH body. A rule applies when its top-level field is present in the patch;
    /// since the merge replaces that field whole, nested required fields are enforced under it.
    pub fn validate_partial(
        body: &Map<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        for (path, rule) in sorted(rules) {
            let top = path.split('.').next().unwrap_or(path);
            if body.contains_key(top) {
                check(body, path, rule)?;
            }
        }
        Ok(())
    }
}

/// Rules in path order so the first reported error is stable.
fn sorted(rules: &HashMap<String, ValidationRule>) -> Vec<(&str, &ValidationRule)> {
    let mut v: Vec<_> = rules.iter().map(|(k, r)| (k.as_str(), r)).collect();
    v.sort_by(|a, b| a.0.cmp(b.0));
    v
}

fn check(body: &Map<String, Value>, path: &str, rule: &ValidationRule) -> Result<(), AppError> {
    let val = lookup_path(body, path);
    if rule.required == Some(true) && (val.is_none() || val == Some(&Value::Null)) {
        return Err(AppError::Validation(format!("{} is required", path)));
    }
    match val {
        Some(v) => validate_field(path, v, rule),
        None => Ok(()),
    }
}

fn kind_matches(v: &Value, kind: FieldKind) -> bool {
    match kind {
        FieldKind::String => v.is_string(),
        FieldKind::Number => v.is_number(),
        FieldKind::Boolean => v.is_boolean(),
        FieldKind::Object => v.is_object(),
        FieldKind::Array => v.is_array(),
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "string",
        FieldKind::Number => "number",
        FieldKind::Boolean => "boolean",
        FieldKind::Object => "object",
        FieldKind::Array => "array",
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(kind) = rule.kind {
        if !kind_matches(v, kind) {
            return Err(AppError::Validation(format!("{} must be of type {}", col, kind_name(kind))));
        }
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!("{} must be at least {} characters", col, min)));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err(AppError::Validation(format!("{} must be a valid email", col)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(AppError::Validation(format!("{} must be a valid UUID", col)));
            }
        }
        "date-time" => {
            if parse_timestamp(s).is_none() {
                return Err(AppError::Validation(format!(
                    "{} must be an RFC 3339 timestamp or YYYY-MM-DD",
                    col
                )));
            }
        }
        _ => {}
    }
    Ok(())
}
