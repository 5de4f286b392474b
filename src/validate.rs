//! Structural validation of a raw spec document.
//!
//! Walks the untyped JSON and reports every shape violation in one pass:
//! missing fields, wrong primitive types, pattern mismatches, bound
//! collisions, duplicate ids, unknown keys. Semantic cross-reference checks
//! live in the normalizer; callers get the full report either way.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::collections::HashSet;

use crate::spec::REST_SHIFT;

/// Outcome of a structural validation pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

const TOP_LEVEL_KEYS: [&str; 6] = [
    "sets",
    "shifts",
    "employees",
    "demand",
    "constraints",
    "objective",
];

const SCOPE_KEYS: [&str; 7] = [
    "employees",
    "skills_any",
    "skills_all",
    "roles_any",
    "roles_all",
    "sites_any",
    "contracts_any",
];

pub fn is_date(v: &str) -> bool {
    NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok() && v.len() == 10
}

pub fn is_hhmm(v: &str) -> bool {
    NaiveTime::parse_from_str(v, "%H:%M").is_ok() && v.len() == 5
}

fn dupes(items: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if !seen.insert(*item) && !out.iter().any(|d| d == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Reads `key` as a string array, reporting shape problems.
/// Returns the extracted strings (best effort) for downstream checks.
fn string_list<'a>(
    parent: &'a Value,
    path: &str,
    key: &str,
    required: bool,
    errors: &mut Vec<String>,
) -> Vec<&'a str> {
    match parent.get(key) {
        None => {
            if required {
                errors.push(format!("{path}.{key} is required"));
            }
            Vec::new()
        }
        Some(Value::Array(items)) => {
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s),
                    None => errors.push(format!("{path}.{key}[{i}] must be a string")),
                }
            }
            out
        }
        Some(_) => {
            errors.push(format!("{path}.{key} must be an array of strings"));
            Vec::new()
        }
    }
}

fn check_count(v: &Value, path: &str, field: &str, errors: &mut Vec<String>) -> Option<i64> {
    match v.get(field) {
        None => None,
        Some(n) => match n.as_i64() {
            Some(n) if n >= 0 => Some(n),
            _ => {
                errors.push(format!("{path}.{field} must be an integer >= 0"));
                None
            }
        },
    }
}

/// Validates the raw document. Never short-circuits on the first offense
/// except when the document itself is not an object.
pub fn validate_document(doc: &Value) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(root) = doc.as_object() else {
        return Validation {
            valid: false,
            errors: vec!["spec must be a JSON object".to_string()],
            warnings,
        };
    };

    for key in root.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            errors.push(format!("unknown top-level key '{key}'"));
        }
    }

    // --- sets ---
    let (employees, days, shifts, sites);
    match root.get("sets") {
        None => {
            errors.push("sets is required".to_string());
            return Validation {
                valid: false,
                errors,
                warnings,
            };
        }
        Some(sets) => {
            if !sets.is_object() {
                errors.push("sets must be an object".to_string());
            }
            if let Some(obj) = sets.as_object() {
                for key in obj.keys() {
                    if !["employees", "days", "shifts", "sites"].contains(&key.as_str()) {
                        errors.push(format!("unknown key 'sets.{key}'"));
                    }
                }
            }
            employees = string_list(sets, "sets", "employees", true, &mut errors);
            days = string_list(sets, "sets", "days", true, &mut errors);
            shifts = string_list(sets, "sets", "shifts", true, &mut errors);
            sites = string_list(sets, "sets", "sites", false, &mut errors);
        }
    }

    for (name, list) in [
        ("sets.employees", &employees),
        ("sets.days", &days),
        ("sets.shifts", &shifts),
        ("sets.sites", &sites),
    ] {
        for d in dupes(list) {
            errors.push(format!("duplicate id '{d}' in {name}"));
        }
    }
    for day in &days {
        if !is_date(day) {
            errors.push(format!("sets.days entry '{day}' must match YYYY-MM-DD"));
        }
    }
    if !shifts.is_empty() && !shifts.contains(&REST_SHIFT) {
        errors.push(format!("sets.shifts must contain the rest label '{REST_SHIFT}'"));
    }

    // --- shifts definitions ---
    match root.get("shifts") {
        None => errors.push("shifts is required".to_string()),
        Some(Value::Object(defs)) => {
            for (label, def) in defs {
                let Some(def) = def.as_object() else {
                    errors.push(format!("shifts['{label}'] must be an object"));
                    continue;
                };
                for key in def.keys() {
                    if !["start", "end", "minutes", "is_work"].contains(&key.as_str()) {
                        errors.push(format!("unknown key shifts['{label}'].{key}"));
                    }
                }
                for field in ["start", "end"] {
                    match def.get(field).and_then(Value::as_str) {
                        Some(v) if is_hhmm(v) => {}
                        Some(v) => {
                            errors.push(format!("shifts['{label}'].{field} '{v}' must match HH:MM"))
                        }
                        None => errors.push(format!("shifts['{label}'].{field} is required")),
                    }
                }
                match def.get("minutes").and_then(Value::as_i64) {
                    Some(m) if m >= 0 => {}
                    Some(m) => errors.push(format!("shifts['{label}'].minutes {m} must be >= 0")),
                    None => errors.push(format!(
                        "shifts['{label}'].minutes must be a non-negative integer"
                    )),
                }
                if def.get("is_work").and_then(Value::as_bool).is_none() {
                    errors.push(format!("shifts['{label}'].is_work must be a boolean"));
                }
            }
            for shift in &shifts {
                if *shift != REST_SHIFT && !defs.contains_key(*shift) {
                    errors.push(format!("shifts['{shift}'] definition is missing"));
                }
            }
        }
        Some(_) => errors.push("shifts must be an object".to_string()),
    }

    // --- employees metadata ---
    let mut declared_skills: HashSet<String> = HashSet::new();
    let mut declared_roles: HashSet<String> = HashSet::new();
    match root.get("employees") {
        None => {}
        Some(Value::Object(defs)) => {
            for (id, def) in defs {
                let Some(def) = def.as_object() else {
                    errors.push(format!("employees['{id}'] must be an object"));
                    continue;
                };
                for key in def.keys() {
                    if !["skills", "roles", "site_home", "contract"].contains(&key.as_str()) {
                        errors.push(format!("unknown key employees['{id}'].{key}"));
                    }
                }
                for (field, declared) in [
                    ("skills", &mut declared_skills),
                    ("roles", &mut declared_roles),
                ] {
                    match def.get(field) {
                        None => {}
                        Some(Value::Array(items)) => {
                            for (i, item) in items.iter().enumerate() {
                                match item.as_str() {
                                    Some(s) => {
                                        declared.insert(s.to_string());
                                    }
                                    None => errors.push(format!(
                                        "employees['{id}'].{field}[{i}] must be a string"
                                    )),
                                }
                            }
                        }
                        Some(_) => errors.push(format!(
                            "employees['{id}'].{field} must be an array of strings"
                        )),
                    }
                }
                if let Some(site) = def.get("site_home") {
                    if !site.is_string() {
                        errors.push(format!("employees['{id}'].site_home must be a string"));
                    }
                }
                if let Some(contract) = def.get("contract") {
                    match contract.as_object() {
                        Some(c) => {
                            if c.get("type").map(|t| !t.is_string()).unwrap_or(false) {
                                errors.push(format!("employees['{id}'].contract.type must be a string"));
                            }
                        }
                        None => errors.push(format!("employees['{id}'].contract must be an object")),
                    }
                }
            }
        }
        Some(_) => errors.push("employees must be an object".to_string()),
    }

    // --- demand ---
    match root.get("demand") {
        None => {}
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                let path = format!("demand[{i}]");
                let Some(obj) = entry.as_object() else {
                    errors.push(format!("{path} must be an object"));
                    continue;
                };
                for key in obj.keys() {
                    if !["day", "site", "shift", "eq", "min", "max", "requirements"]
                        .contains(&key.as_str())
                    {
                        errors.push(format!("unknown key {path}.{key}"));
                    }
                }
                for field in ["day", "shift"] {
                    if obj.get(field).map(|v| !v.is_string()).unwrap_or(true) {
                        errors.push(format!("{path}.{field} must be a string"));
                    }
                }
                if obj.get("site").map(|v| !v.is_string()).unwrap_or(false) {
                    errors.push(format!("{path}.site must be a string"));
                }

                let eq = check_count(entry, &path, "eq", &mut errors);
                let min = check_count(entry, &path, "min", &mut errors);
                let max = check_count(entry, &path, "max", &mut errors);
                if eq.is_some() && (obj.contains_key("min") || obj.contains_key("max")) {
                    errors.push(format!("{path} must not combine eq with min/max"));
                }
                if eq.is_none() && !obj.contains_key("min") && !obj.contains_key("max") {
                    errors.push(format!("{path} needs eq or min/max"));
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        errors.push(format!("{path} has min > max"));
                    }
                }

                if let Some(req) = obj.get("requirements") {
                    validate_requirements(req, &path, &declared_skills, &declared_roles, &mut errors, &mut warnings);
                }
            }
        }
        Some(_) => errors.push("demand must be an array".to_string()),
    }

    // --- constraints ---
    match root.get("constraints") {
        None => {}
        Some(Value::Array(entries)) => {
            let mut ids: Vec<&str> = Vec::new();
            for (i, entry) in entries.iter().enumerate() {
                let path = format!("constraints[{i}]");
                let Some(obj) = entry.as_object() else {
                    errors.push(format!("{path} must be an object"));
                    continue;
                };
                for key in obj.keys() {
                    if !["id", "type", "kind", "scope", "data", "penalty"].contains(&key.as_str()) {
                        errors.push(format!("unknown key {path}.{key}"));
                    }
                }
                match obj.get("id").and_then(Value::as_str) {
                    Some(id) => ids.push(id),
                    None => errors.push(format!("{path}.id must be a string")),
                }
                let rule_type = obj.get("type").and_then(Value::as_str);
                if !matches!(rule_type, Some("hard") | Some("soft")) {
                    errors.push(format!("{path}.type must be 'hard' or 'soft'"));
                }
                if obj.get("kind").and_then(Value::as_str).is_none() {
                    errors.push(format!("{path}.kind must be a string"));
                }
                if let Some(scope) = obj.get("scope") {
                    validate_scope(scope, &path, &mut errors);
                }
                if let Some(data) = obj.get("data") {
                    if !data.is_object() {
                        errors.push(format!("{path}.data must be an object"));
                    }
                }
                match obj.get("penalty") {
                    Some(pen) => match pen.get("weight").and_then(Value::as_i64) {
                        Some(w) if w >= 0 => {}
                        _ => errors.push(format!("{path}.penalty.weight must be an integer >= 0")),
                    },
                    None => {
                        if rule_type == Some("soft") {
                            let id = obj.get("id").and_then(Value::as_str).unwrap_or("?");
                            warnings.push(format!(
                                "{id}: soft rule has no penalty.weight (acts like weight 0)"
                            ));
                        }
                    }
                }
            }
            for d in dupes(&ids) {
                errors.push(format!("duplicate constraint id '{d}'"));
            }
        }
        Some(_) => errors.push("constraints must be an array".to_string()),
    }

    // --- objective ---
    match root.get("objective") {
        None => {}
        Some(obj) => {
            if obj.get("mode").and_then(Value::as_str) != Some("minimize") {
                errors.push("objective.mode must be 'minimize'".to_string());
            }
            match obj.get("terms").and_then(Value::as_array) {
                Some(terms) if terms.len() == 1 => {
                    let term = &terms[0];
                    if term.get("kind").and_then(Value::as_str) != Some("soft_penalties_total") {
                        errors.push(
                            "objective.terms[0].kind must be 'soft_penalties_total'".to_string(),
                        );
                    }
                    match term.get("weight").and_then(Value::as_i64) {
                        Some(w) if w >= 0 => {}
                        _ => errors
                            .push("objective.terms[0].weight must be an integer >= 0".to_string()),
                    }
                }
                _ => errors.push("objective.terms must contain exactly one term".to_string()),
            }
        }
    }

    Validation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn validate_requirements(
    req: &Value,
    path: &str,
    declared_skills: &HashSet<String>,
    declared_roles: &HashSet<String>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let Some(obj) = req.as_object() else {
        errors.push(format!("{path}.requirements must be an object"));
        return;
    };
    for key in obj.keys() {
        if !["skills_min", "roles_min"].contains(&key.as_str()) {
            errors.push(format!("unknown key {path}.requirements.{key}"));
        }
    }
    for (field, id_key, declared) in [
        ("skills_min", "skill", declared_skills),
        ("roles_min", "role", declared_roles),
    ] {
        let Some(rows) = obj.get(field) else { continue };
        let Some(rows) = rows.as_array() else {
            errors.push(format!("{path}.requirements.{field} must be an array"));
            continue;
        };
        for (j, row) in rows.iter().enumerate() {
            let row_path = format!("{path}.requirements.{field}[{j}]");
            match row.get(id_key).and_then(Value::as_str) {
                Some(name) => {
                    if !declared.contains(name) {
                        warnings.push(format!(
                            "{row_path} requires '{name}' but no employee declares it"
                        ));
                    }
                }
                None => errors.push(format!("{row_path}.{id_key} must be a string")),
            }
            match row.get("min").and_then(Value::as_i64) {
                Some(m) if m >= 0 => {}
                _ => errors.push(format!("{row_path}.min must be an integer >= 0")),
            }
        }
    }
}

fn validate_scope(scope: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(obj) = scope.as_object() else {
        errors.push(format!("{path}.scope must be an object"));
        return;
    };
    for key in obj.keys() {
        if !SCOPE_KEYS.contains(&key.as_str()) {
            errors.push(format!("unknown key {path}.scope.{key}"));
        }
    }
    match obj.get("employees") {
        None => {}
        Some(Value::String(kw)) if kw == "ALL" => {}
        Some(Value::String(kw)) => {
            errors.push(format!("{path}.scope.employees keyword '{kw}' must be 'ALL'"))
        }
        Some(Value::Array(ids)) => {
            for (i, id) in ids.iter().enumerate() {
                if !id.is_string() {
                    errors.push(format!("{path}.scope.employees[{i}] must be a string"));
                }
            }
        }
        Some(_) => errors.push(format!("{path}.scope.employees must be 'ALL' or a list")),
    }
    for key in &SCOPE_KEYS[1..] {
        if let Some(v) = obj.get(*key) {
            if !v.is_array() || v.as_array().unwrap().iter().any(|x| !x.is_string()) {
                errors.push(format!("{path}.scope.{key} must be an array of strings"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_spec() -> Value {
        json!({
            "sets": {
                "employees": ["P1"],
                "days": ["2026-03-02"],
                "shifts": ["M", "OFF"],
                "sites": ["A"]
            },
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            },
            "employees": {
                "P1": {"skills": [], "roles": [], "site_home": "A", "contract": {"type": "full"}}
            },
            "demand": [
                {"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1}
            ],
            "constraints": [],
            "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
        })
    }

    #[test]
    fn minimal_spec_is_valid() {
        let v = validate_document(&minimal_spec());
        assert!(v.valid, "errors: {:?}", v.errors);
    }

    #[test]
    fn reports_all_violations_at_once() {
        let mut doc = minimal_spec();
        doc["sets"]["days"] = json!(["2026-13-40"]);
        doc["shifts"]["M"]["minutes"] = json!(-5);
        doc["demand"][0]["min"] = json!(1);
        let v = validate_document(&doc);
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("YYYY-MM-DD")));
        assert!(v.errors.iter().any(|e| e.contains("minutes")));
        assert!(v.errors.iter().any(|e| e.contains("eq with min/max")
            || e.contains("must not combine eq")));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let mut doc = minimal_spec();
        doc["extras"] = json!({});
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("unknown top-level key 'extras'")));
    }

    #[test]
    fn requires_rest_label() {
        let mut doc = minimal_spec();
        doc["sets"]["shifts"] = json!(["M"]);
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("rest label")));
    }

    #[test]
    fn rejects_bad_time_pattern() {
        let mut doc = minimal_spec();
        doc["shifts"]["M"]["start"] = json!("6:00");
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("HH:MM")));
    }

    #[test]
    fn rejects_duplicate_employee_ids() {
        let mut doc = minimal_spec();
        doc["sets"]["employees"] = json!(["P1", "P1"]);
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("duplicate id 'P1'")));
    }

    #[test]
    fn rejects_duplicate_constraint_ids() {
        let mut doc = minimal_spec();
        doc["constraints"] = json!([
            {"id": "c", "type": "hard", "kind": "max_consecutive_work_days", "data": {"max": 3}},
            {"id": "c", "type": "hard", "kind": "max_consecutive_work_days", "data": {"max": 4}}
        ]);
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("duplicate constraint id 'c'")));
    }

    #[test]
    fn rejects_malformed_objective() {
        let mut doc = minimal_spec();
        doc["objective"] = json!({"mode": "maximize", "terms": []});
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("objective.mode")));
        assert!(v.errors.iter().any(|e| e.contains("exactly one term")));
    }

    #[test]
    fn rejects_unknown_scope_key() {
        let mut doc = minimal_spec();
        doc["constraints"] = json!([
            {"id": "c", "type": "hard", "kind": "max_consecutive_work_days",
             "scope": {"employees": "ALL", "team": ["alpha"]}, "data": {"max": 3}}
        ]);
        let v = validate_document(&doc);
        assert!(v.errors.iter().any(|e| e.contains("scope.team")));
    }

    #[test]
    fn warns_on_undeclared_required_skill() {
        let mut doc = minimal_spec();
        doc["demand"][0]["requirements"] = json!({"skills_min": [{"skill": "welding", "min": 1}]});
        let v = validate_document(&doc);
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("welding")));
    }

    #[test]
    fn missing_sets_short_circuits() {
        let v = validate_document(&json!({"shifts": {}}));
        assert_eq!(v.errors.len(), 1);
        assert!(v.errors[0].contains("sets is required"));
    }
}
