//! Semantic normalization of a validated spec.
//!
//! Everything the schema walk cannot express lands here: id resolution,
//! the rest-shift contract, calendar ordering, the recognized rule-kind
//! catalog, and scope expansion. Emits a [`NormalizedSpec`] in which every
//! rule carries typed parameters and an explicit employee id list.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::Value;

use crate::spec::{
    DayOffRequestsParams, DemandEntry, EmployeeDef, ExactlyOneParams, FairDistributionParams,
    ForbidSequencesParams, MaxConsecutiveParams, MaxShiftsParams, MaxWorkMinutesParams,
    MinDaysOffParams, MinRestParams, Objective, PenalizeDaysParams, PenalizeShiftsParams,
    RuleEntry, RuleKind, RuleType, Scope, ScopeEmployees, ShiftDef, SpecDoc, DEFAULT_SITE,
    REST_SHIFT,
};

/// A shift template with clock fields resolved to minutes-from-midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftInfo {
    pub start_min: i64,
    pub end_min: i64,
    pub minutes: i64,
    pub is_work: bool,
}

impl ShiftInfo {
    /// End of the shift on an absolute axis where its own day starts at 0.
    /// A clock end at or before the start means the shift runs past
    /// midnight and ends on the following day.
    pub fn end_abs(&self) -> i64 {
        if self.end_min > self.start_min {
            self.end_min
        } else {
            self.end_min + 24 * 60
        }
    }
}

/// Rest minutes between `prev` worked on day d and `next` worked on day d+1.
pub fn rest_gap_minutes(prev: &ShiftInfo, next: &ShiftInfo) -> i64 {
    24 * 60 + next.start_min - prev.end_abs()
}

/// A rule after normalization: typed parameters, expanded scope.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub rule_type: RuleType,
    pub kind: RuleKind,
    /// Employees the rule applies to, in spec order.
    pub employees: Vec<String>,
    pub weight: i64,
}

/// The canonical, solver-ready form of a spec.
#[derive(Debug, Clone)]
pub struct NormalizedSpec {
    pub employees: Vec<String>,
    pub days: Vec<String>,
    pub shifts: Vec<String>,
    /// Work shifts only, in spec order.
    pub work_shifts: Vec<String>,
    pub sites: Vec<String>,
    pub shift_defs: BTreeMap<String, ShiftInfo>,
    pub employee_defs: BTreeMap<String, EmployeeDef>,
    pub demand: Vec<DemandEntry>,
    pub rules: Vec<Rule>,
    /// Global multiplier from `objective.terms[0].weight`.
    pub objective_weight: i64,
    emp_index: HashMap<String, usize>,
    day_index: HashMap<String, usize>,
    shift_index: HashMap<String, usize>,
}

impl NormalizedSpec {
    pub fn employee_index(&self, id: &str) -> Option<usize> {
        self.emp_index.get(id).copied()
    }

    pub fn day_index(&self, day: &str) -> Option<usize> {
        self.day_index.get(day).copied()
    }

    pub fn shift_position(&self, label: &str) -> Option<usize> {
        self.shift_index.get(label).copied()
    }

    pub fn shift_info(&self, label: &str) -> &ShiftInfo {
        &self.shift_defs[label]
    }

    /// Whether `employee` may serve demand at `site`. Absent `site_home`
    /// means no site restriction.
    pub fn eligible_for_site(&self, employee: &str, site: &str) -> bool {
        match self.employee_defs.get(employee).and_then(|e| e.site_home.as_deref()) {
            Some(home) => home == site,
            None => true,
        }
    }
}

fn hhmm_minutes(v: &str) -> i64 {
    let (hh, mm) = v.split_once(':').unwrap_or(("0", "0"));
    hh.parse::<i64>().unwrap_or(0) * 60 + mm.parse::<i64>().unwrap_or(0)
}

/// Normalizes a structurally valid document. All detected problems are
/// accumulated; the caller receives either the full canonical spec or the
/// full error list.
pub fn normalize(mut doc: SpecDoc) -> Result<NormalizedSpec, Vec<String>> {
    let mut errors = Vec::new();

    // Default injection.
    if doc.sets.sites.is_empty() {
        doc.sets.sites = vec![DEFAULT_SITE.to_string()];
    }
    doc.shifts
        .entry(REST_SHIFT.to_string())
        .or_insert_with(ShiftDef::rest);
    let objective = doc.objective.clone().unwrap_or_else(Objective::soft_penalties);
    let objective_weight = objective.terms.first().map(|t| t.weight).unwrap_or(1);

    let rest = &doc.shifts[REST_SHIFT];
    if *rest != ShiftDef::rest() {
        errors.push(format!(
            "shifts['{REST_SHIFT}'] must be the exact rest shape 00:00/00:00/0/false"
        ));
    }

    // Calendar ordering.
    let mut parsed_days: Vec<NaiveDate> = Vec::with_capacity(doc.sets.days.len());
    for day in &doc.sets.days {
        match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            Ok(d) => parsed_days.push(d),
            Err(_) => errors.push(format!("sets.days entry '{day}' is not a calendar day")),
        }
    }
    for pair in parsed_days.windows(2) {
        if pair[0] >= pair[1] {
            errors.push(format!(
                "sets.days must be strictly increasing ({} then {})",
                pair[0], pair[1]
            ));
        }
    }

    let employee_set: HashSet<&str> = doc.sets.employees.iter().map(String::as_str).collect();
    let day_set: HashSet<&str> = doc.sets.days.iter().map(String::as_str).collect();
    let shift_set: HashSet<&str> = doc.sets.shifts.iter().map(String::as_str).collect();
    let site_set: HashSet<&str> = doc.sets.sites.iter().map(String::as_str).collect();

    // Shift templates.
    let mut shift_defs = BTreeMap::new();
    for label in &doc.sets.shifts {
        match doc.shifts.get(label) {
            Some(def) => {
                shift_defs.insert(
                    label.clone(),
                    ShiftInfo {
                        start_min: hhmm_minutes(&def.start),
                        end_min: hhmm_minutes(&def.end),
                        minutes: def.minutes,
                        is_work: def.is_work,
                    },
                );
            }
            None => errors.push(format!("shifts['{label}'] definition is missing")),
        }
    }
    let work_shifts: Vec<String> = doc
        .sets
        .shifts
        .iter()
        .filter(|s| {
            s.as_str() != REST_SHIFT && shift_defs.get(*s).map(|d| d.is_work).unwrap_or(false)
        })
        .cloned()
        .collect();
    let work_set: HashSet<&str> = work_shifts.iter().map(String::as_str).collect();

    // Employee metadata references.
    for (id, def) in &doc.employees {
        if let Some(home) = &def.site_home {
            if !site_set.contains(home.as_str()) {
                errors.push(format!(
                    "employees['{id}'].site_home '{home}' not in sets.sites"
                ));
            }
        }
    }

    // Demand references.
    let mut demand = doc.demand.clone();
    for (i, entry) in demand.iter_mut().enumerate() {
        if !day_set.contains(entry.day.as_str()) {
            errors.push(format!("demand[{i}].day '{}' not in sets.days", entry.day));
        }
        if !shift_set.contains(entry.shift.as_str()) {
            errors.push(format!(
                "demand[{i}].shift '{}' not in sets.shifts",
                entry.shift
            ));
        } else if !work_set.contains(entry.shift.as_str()) {
            errors.push(format!(
                "demand[{i}].shift '{}' must be a work shift",
                entry.shift
            ));
        }
        match &entry.site {
            Some(site) => {
                if !site_set.contains(site.as_str()) {
                    errors.push(format!("demand[{i}].site '{site}' not in sets.sites"));
                }
            }
            None => entry.site = Some(doc.sets.sites[0].clone()),
        }
    }

    // Rules: typed parsing + scope expansion.
    let mut rules = Vec::with_capacity(doc.constraints.len());
    for entry in &doc.constraints {
        let employees = expand_scope(&doc, &entry.scope, &employee_set, &mut errors, &entry.id);
        match parse_kind(entry, &day_set, &work_set, &shift_set, &mut errors) {
            Some(kind) => {
                let expects_soft = kind.is_soft();
                let is_soft = entry.r#type == RuleType::Soft;
                if expects_soft != is_soft {
                    errors.push(format!(
                        "{}: kind '{}' must be declared {}",
                        entry.id,
                        entry.kind,
                        if expects_soft { "soft" } else { "hard" }
                    ));
                }
                rules.push(Rule {
                    id: entry.id.clone(),
                    rule_type: entry.r#type,
                    kind,
                    employees,
                    weight: entry.penalty.map(|p| p.weight).unwrap_or(0),
                });
            }
            None => {}
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let emp_index = doc
        .sets
        .employees
        .iter()
        .enumerate()
        .map(|(i, e)| (e.clone(), i))
        .collect();
    let day_index = doc
        .sets
        .days
        .iter()
        .enumerate()
        .map(|(i, d)| (d.clone(), i))
        .collect();
    let shift_index = doc
        .sets
        .shifts
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), i))
        .collect();

    Ok(NormalizedSpec {
        employees: doc.sets.employees,
        days: doc.sets.days,
        shifts: doc.sets.shifts,
        work_shifts,
        sites: doc.sets.sites,
        shift_defs,
        employee_defs: doc.employees,
        demand,
        rules,
        objective_weight,
        emp_index,
        day_index,
        shift_index,
    })
}

/// Expands a scope into the concrete employee list, spec order preserved.
/// Filters apply with AND semantics on top of the base selection.
fn expand_scope(
    doc: &SpecDoc,
    scope: &Scope,
    employee_set: &HashSet<&str>,
    errors: &mut Vec<String>,
    rule_id: &str,
) -> Vec<String> {
    let mut selected: HashSet<&str> = match &scope.employees {
        ScopeEmployees::Keyword(kw) => {
            if kw != "ALL" {
                errors.push(format!(
                    "{rule_id}: scope.employees keyword '{kw}' must be 'ALL'"
                ));
            }
            employee_set.clone()
        }
        ScopeEmployees::Ids(ids) => {
            let mut set = HashSet::new();
            for id in ids {
                if employee_set.contains(id.as_str()) {
                    set.insert(id.as_str());
                } else {
                    errors.push(format!(
                        "{rule_id}: scope.employees contains unknown id '{id}'"
                    ));
                }
            }
            set
        }
    };

    let lookup = |id: &str| doc.employees.get(id);
    let has_any = |vals: &[String], pool: &[String]| vals.iter().any(|v| pool.contains(v));
    let has_all = |vals: &[String], pool: &[String]| vals.iter().all(|v| pool.contains(v));

    if !scope.skills_any.is_empty() {
        selected.retain(|e| lookup(e).is_some_and(|d| has_any(&scope.skills_any, &d.skills)));
    }
    if !scope.skills_all.is_empty() {
        selected.retain(|e| lookup(e).is_some_and(|d| has_all(&scope.skills_all, &d.skills)));
    }
    if !scope.roles_any.is_empty() {
        selected.retain(|e| lookup(e).is_some_and(|d| has_any(&scope.roles_any, &d.roles)));
    }
    if !scope.roles_all.is_empty() {
        selected.retain(|e| lookup(e).is_some_and(|d| has_all(&scope.roles_all, &d.roles)));
    }
    if !scope.sites_any.is_empty() {
        selected.retain(|e| {
            lookup(e)
                .and_then(|d| d.site_home.as_ref())
                .is_some_and(|home| scope.sites_any.contains(home))
        });
    }
    if !scope.contracts_any.is_empty() {
        selected.retain(|e| {
            lookup(e)
                .and_then(|d| d.contract.r#type.as_ref())
                .is_some_and(|t| scope.contracts_any.contains(t))
        });
    }

    doc.sets
        .employees
        .iter()
        .filter(|e| selected.contains(e.as_str()))
        .cloned()
        .collect()
}

fn parse_params<T: serde::de::DeserializeOwned>(
    entry: &RuleEntry,
    errors: &mut Vec<String>,
) -> Option<T> {
    let data = if entry.data.is_null() {
        Value::Object(Default::default())
    } else {
        entry.data.clone()
    };
    match serde_json::from_value(data) {
        Ok(params) => Some(params),
        Err(e) => {
            errors.push(format!("{}: invalid data for '{}': {e}", entry.id, entry.kind));
            None
        }
    }
}

fn check_shift_refs(
    rule_id: &str,
    shifts: &[String],
    work_set: &HashSet<&str>,
    errors: &mut Vec<String>,
) {
    for s in shifts {
        if !work_set.contains(s.as_str()) {
            errors.push(format!("{rule_id}: shift '{s}' is not a work shift"));
        }
    }
}

fn check_day_refs(
    rule_id: &str,
    days: &[String],
    day_set: &HashSet<&str>,
    errors: &mut Vec<String>,
) {
    for d in days {
        if !day_set.contains(d.as_str()) {
            errors.push(format!("{rule_id}: day '{d}' not in sets.days"));
        }
    }
}

fn check_window(rule_id: &str, window_days: usize, errors: &mut Vec<String>) {
    if window_days == 0 {
        errors.push(format!("{rule_id}: window_days must be > 0"));
    }
}

fn check_rolling(rule_id: &str, mode: &Option<String>, errors: &mut Vec<String>) {
    if let Some(mode) = mode {
        if mode != "rolling" {
            errors.push(format!("{rule_id}: only mode 'rolling' is supported"));
        }
    }
}

fn parse_kind(
    entry: &RuleEntry,
    day_set: &HashSet<&str>,
    work_set: &HashSet<&str>,
    shift_set: &HashSet<&str>,
    errors: &mut Vec<String>,
) -> Option<RuleKind> {
    let id = entry.id.as_str();
    match entry.kind.as_str() {
        "exactly_one_assignment_per_day" => {
            let p: ExactlyOneParams = parse_params(entry, errors)?;
            let mut declared: Vec<&str> = p.shifts.iter().map(String::as_str).collect();
            declared.sort_unstable();
            let mut all: Vec<&str> = shift_set.iter().copied().collect();
            all.sort_unstable();
            if declared != all {
                errors.push(format!(
                    "{id}: data.shifts must list every shift in sets.shifts exactly once"
                ));
            }
            Some(RuleKind::ExactlyOneAssignmentPerDay { shifts: p.shifts })
        }
        "forbid_shift_sequences" => {
            let p: ForbidSequencesParams = parse_params(entry, errors)?;
            if p.forbidden_pairs.is_empty() {
                errors.push(format!("{id}: forbidden_pairs must not be empty"));
            }
            for pair in &p.forbidden_pairs {
                check_shift_refs(id, &[pair.prev_shift.clone(), pair.next_shift.clone()], work_set, errors);
            }
            Some(RuleKind::ForbidShiftSequences {
                forbidden_pairs: p.forbidden_pairs,
            })
        }
        "max_shifts_in_window" => {
            let p: MaxShiftsParams = parse_params(entry, errors)?;
            check_window(id, p.window_days, errors);
            check_rolling(id, &p.mode, errors);
            if p.max < 0 {
                errors.push(format!("{id}: max must be >= 0"));
            }
            if let Some(shifts) = &p.shifts {
                check_shift_refs(id, shifts, work_set, errors);
            }
            Some(RuleKind::MaxShiftsInWindow {
                window_days: p.window_days,
                shifts: p.shifts,
                max: p.max,
            })
        }
        "min_rest_minutes_between_shifts" => {
            let p: MinRestParams = parse_params(entry, errors)?;
            if p.minutes < 0 {
                errors.push(format!("{id}: minutes must be >= 0"));
            }
            Some(RuleKind::MinRestMinutesBetweenShifts { minutes: p.minutes })
        }
        "max_work_minutes_in_window" => {
            let p: MaxWorkMinutesParams = parse_params(entry, errors)?;
            check_window(id, p.window_days, errors);
            check_rolling(id, &p.mode, errors);
            if p.max < 0 {
                errors.push(format!("{id}: max must be >= 0"));
            }
            Some(RuleKind::MaxWorkMinutesInWindow {
                window_days: p.window_days,
                max: p.max,
            })
        }
        "max_consecutive_work_days" => {
            let p: MaxConsecutiveParams = parse_params(entry, errors)?;
            Some(RuleKind::MaxConsecutiveWorkDays { max: p.max })
        }
        "min_consecutive_days_off" => {
            let p: MinDaysOffParams = parse_params(entry, errors)?;
            if p.min == 0 {
                errors.push(format!("{id}: min must be > 0"));
            }
            Some(RuleKind::MinConsecutiveDaysOff { min: p.min })
        }
        "penalize_work_on_days" => {
            let p: PenalizeDaysParams = parse_params(entry, errors)?;
            check_day_refs(id, &p.days, day_set, errors);
            Some(RuleKind::PenalizeWorkOnDays { days: p.days })
        }
        "penalize_work_on_shifts" => {
            let p: PenalizeShiftsParams = parse_params(entry, errors)?;
            check_shift_refs(id, &p.shifts, work_set, errors);
            Some(RuleKind::PenalizeWorkOnShifts { shifts: p.shifts })
        }
        "penalize_unmet_day_off_requests" => {
            let p: DayOffRequestsParams = parse_params(entry, errors)?;
            for req in &p.requests {
                check_day_refs(id, std::slice::from_ref(&req.day), day_set, errors);
            }
            Some(RuleKind::PenalizeUnmetDayOffRequests { requests: p.requests })
        }
        "fair_distribution" => {
            let p: FairDistributionParams = parse_params(entry, errors)?;
            if let Some(measure) = &p.measure {
                if measure != "count" {
                    errors.push(format!("{id}: only measure 'count' is supported"));
                }
            }
            if let Some(target) = &p.target {
                if target != "auto_mean" {
                    errors.push(format!("{id}: only target 'auto_mean' is supported"));
                }
            }
            if let Some(penalize) = &p.penalize {
                if penalize != "absolute_deviation" {
                    errors.push(format!("{id}: only penalize 'absolute_deviation' is supported"));
                }
            }
            if p.shifts.is_empty() {
                errors.push(format!("{id}: fair_distribution requires data.shifts"));
            }
            check_shift_refs(id, &p.shifts, work_set, errors);
            if let Some(w) = p.window_days {
                check_window(id, w, errors);
            }
            Some(RuleKind::FairDistribution {
                shifts: p.shifts,
                window_days: p.window_days,
            })
        }
        other => {
            errors.push(format!("{id}: unrecognized rule kind '{other}'"));
            None
        }
    }
}

/// Checks whether requested employee ids in rule payloads resolve. Runs
/// after parsing because the requests live inside typed parameters.
pub fn check_request_refs(norm: &NormalizedSpec) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    for rule in &norm.rules {
        if let RuleKind::PenalizeUnmetDayOffRequests { requests } = &rule.kind {
            for req in requests {
                if norm.employee_index(&req.employee).is_none() {
                    errors.push(format!(
                        "{}: request employee '{}' not in sets.employees",
                        rule.id, req.employee
                    ));
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_doc() -> SpecDoc {
        serde_json::from_value(json!({
            "sets": {
                "employees": ["P1", "P2", "P3"],
                "days": ["2026-03-02", "2026-03-03", "2026-03-04"],
                "shifts": ["M", "N", "OFF"],
                "sites": ["A"]
            },
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            },
            "employees": {
                "P1": {"skills": ["certified"], "roles": ["lead"], "site_home": "A",
                        "contract": {"type": "full_time"}},
                "P2": {"skills": [], "roles": [], "site_home": "A",
                        "contract": {"type": "part_time"}},
                "P3": {"skills": ["certified"], "roles": [], "contract": {"type": "full_time"}}
            },
            "demand": [
                {"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1}
            ],
            "constraints": []
        }))
        .unwrap()
    }

    #[test]
    fn normalizes_base_doc() {
        let norm = normalize(base_doc()).unwrap();
        assert_eq!(norm.work_shifts, vec!["M", "N"]);
        assert_eq!(norm.objective_weight, 1);
        assert_eq!(norm.day_index("2026-03-03"), Some(1));
    }

    #[test]
    fn injects_missing_rest_definition() {
        let mut doc = base_doc();
        doc.shifts.remove(REST_SHIFT);
        let norm = normalize(doc).unwrap();
        assert_eq!(norm.shift_info(REST_SHIFT).minutes, 0);
    }

    #[test]
    fn rejects_non_rest_off_shape() {
        let mut doc = base_doc();
        doc.shifts.get_mut(REST_SHIFT).unwrap().minutes = 60;
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("rest shape")));
    }

    #[test]
    fn rejects_unsorted_days() {
        let mut doc = base_doc();
        doc.sets.days = vec!["2026-03-03".into(), "2026-03-02".into()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("strictly increasing")));
    }

    #[test]
    fn rejects_duplicate_day_via_ordering() {
        let mut doc = base_doc();
        doc.sets.days = vec!["2026-03-02".into(), "2026-03-02".into()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("strictly increasing")));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "mystery",
            "type": "hard",
            "kind": "forbid_mondays",
            "data": {}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unrecognized rule kind")));
    }

    #[test]
    fn rejects_unknown_data_key() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "max_consecutive_work_days",
            "data": {"max": 3, "bogus": 1}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("invalid data")));
    }

    #[test]
    fn rejects_non_rolling_mode() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "max_shifts_in_window",
            "data": {"window_days": 7, "max": 5, "mode": "calendar"}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("rolling")));
    }

    #[test]
    fn rejects_soft_kind_declared_hard() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "penalize_work_on_shifts",
            "data": {"shifts": ["N"]},
            "penalty": {"weight": 2}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("must be declared soft")));
    }

    #[test]
    fn rejects_unknown_scope_id() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "max_consecutive_work_days",
            "scope": {"employees": ["P1", "GHOST"]},
            "data": {"max": 3}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unknown id 'GHOST'")));
    }

    #[test]
    fn scope_filters_compose_with_and() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "max_consecutive_work_days",
            "scope": {"skills_any": ["certified"], "contracts_any": ["full_time"]},
            "data": {"max": 3}
        }))
        .unwrap()];
        let norm = normalize(doc).unwrap();
        assert_eq!(norm.rules[0].employees, vec!["P1", "P3"]);
    }

    #[test]
    fn scope_sites_any_requires_declared_home() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "r1",
            "type": "hard",
            "kind": "max_consecutive_work_days",
            "scope": {"sites_any": ["A"]},
            "data": {"max": 3}
        }))
        .unwrap()];
        let norm = normalize(doc).unwrap();
        // P3 has no site_home and is filtered out by an explicit site filter.
        assert_eq!(norm.rules[0].employees, vec!["P1", "P2"]);
    }

    #[test]
    fn exactly_one_requires_full_shift_list() {
        let mut doc = base_doc();
        doc.constraints = vec![serde_json::from_value(json!({
            "id": "one",
            "type": "hard",
            "kind": "exactly_one_assignment_per_day",
            "data": {"shifts": ["M", "OFF"]}
        }))
        .unwrap()];
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("every shift in sets.shifts")));
    }

    #[test]
    fn demand_site_defaults_to_first() {
        let mut doc = base_doc();
        doc.demand[0].site = None;
        let norm = normalize(doc).unwrap();
        assert_eq!(norm.demand[0].site.as_deref(), Some("A"));
    }

    #[test]
    fn demand_rejects_rest_shift() {
        let mut doc = base_doc();
        doc.demand[0].shift = REST_SHIFT.to_string();
        let errors = normalize(doc).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("must be a work shift")));
    }

    #[test]
    fn overnight_rest_gap() {
        // N ends 06:00 next day; M starts 07:00 the day after N's day.
        let n = ShiftInfo { start_min: 22 * 60, end_min: 6 * 60, minutes: 480, is_work: true };
        let m = ShiftInfo { start_min: 7 * 60, end_min: 15 * 60, minutes: 480, is_work: true };
        assert_eq!(rest_gap_minutes(&n, &m), 60);
    }

    #[test]
    fn same_day_rest_gap() {
        let early = ShiftInfo { start_min: 6 * 60, end_min: 14 * 60, minutes: 480, is_work: true };
        let late = ShiftInfo { start_min: 14 * 60, end_min: 22 * 60, minutes: 480, is_work: true };
        // early ends 14:00, late starts 14:00 next day: 24h gap.
        assert_eq!(rest_gap_minutes(&early, &late), 24 * 60);
    }
}
