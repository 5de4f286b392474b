//! Roster spec document model.
//!
//! Mirrors the wire shape of the declarative scheduling spec: identifier
//! sets, shift templates, employee metadata, coverage demand, rules, and
//! the objective. Rule payloads arrive as raw JSON and are parsed into the
//! closed [`RuleKind`] catalog during normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The distinguished rest label. Must be present in `sets.shifts`.
pub const REST_SHIFT: &str = "OFF";

/// Site injected when `sets.sites` is omitted.
pub const DEFAULT_SITE: &str = "SITE_DEFAULT";

/// Top-level spec document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDoc {
    pub sets: Sets,
    pub shifts: BTreeMap<String, ShiftDef>,
    #[serde(default)]
    pub employees: BTreeMap<String, EmployeeDef>,
    #[serde(default)]
    pub demand: Vec<DemandEntry>,
    #[serde(default)]
    pub constraints: Vec<RuleEntry>,
    #[serde(default)]
    pub objective: Option<Objective>,
}

/// Identifier sets. Order is significant: scope expansion and result
/// projection follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sets {
    pub employees: Vec<String>,
    pub days: Vec<String>,
    pub shifts: Vec<String>,
    #[serde(default)]
    pub sites: Vec<String>,
}

/// A shift template. `minutes` is authoritative; `start`/`end` are used
/// only for rest-gap arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftDef {
    pub start: String,
    pub end: String,
    pub minutes: i64,
    pub is_work: bool,
}

impl ShiftDef {
    /// The exact shape required for the rest label.
    pub fn rest() -> Self {
        Self {
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            minutes: 0,
            is_work: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmployeeDef {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_home: Option<String>,
    #[serde(default)]
    pub contract: Contract,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// A coverage demand row. `eq` and `min`/`max` are mutually exclusive;
/// bounds are inclusive. `shift` must name a work shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandEntry {
    pub day: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub shift: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirements {
    #[serde(default)]
    pub skills_min: Vec<SkillMin>,
    #[serde(default)]
    pub roles_min: Vec<RoleMin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillMin {
    pub skill: String,
    pub min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleMin {
    pub role: String,
    pub min: i64,
}

/// One rule row as it appears in `constraints`. `data` stays raw until the
/// normalizer parses it against the kind's parameter shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    pub id: String,
    pub r#type: RuleType,
    pub kind: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Penalty>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Penalty {
    pub weight: i64,
}

/// Employee selection for a rule. Filters compose with AND semantics on
/// top of the base `employees` selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scope {
    #[serde(default)]
    pub employees: ScopeEmployees,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills_any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills_all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles_any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles_all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sites_any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts_any: Vec<String>,
}

/// `"ALL"` or an explicit id list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeEmployees {
    Keyword(String),
    Ids(Vec<String>),
}

impl Default for ScopeEmployees {
    fn default() -> Self {
        ScopeEmployees::Keyword("ALL".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub mode: String,
    pub terms: Vec<ObjectiveTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveTerm {
    pub kind: String,
    pub weight: i64,
}

impl Objective {
    /// The default objective: minimize the soft penalty total, weight 1.
    pub fn soft_penalties() -> Self {
        Self {
            mode: "minimize".to_string(),
            terms: vec![ObjectiveTerm {
                kind: "soft_penalties_total".to_string(),
                weight: 1,
            }],
        }
    }
}

// ============================================================================
// Typed rule catalog
// ============================================================================

/// The closed set of recognized rule kinds with their typed parameters.
///
/// Adding a kind means adding a variant here, its parameter shape below,
/// and one lowering arm; nothing dispatches on strings past this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    ExactlyOneAssignmentPerDay {
        shifts: Vec<String>,
    },
    ForbidShiftSequences {
        forbidden_pairs: Vec<ShiftPair>,
    },
    MaxShiftsInWindow {
        window_days: usize,
        shifts: Option<Vec<String>>,
        max: i64,
    },
    MinRestMinutesBetweenShifts {
        minutes: i64,
    },
    MaxWorkMinutesInWindow {
        window_days: usize,
        max: i64,
    },
    MaxConsecutiveWorkDays {
        max: usize,
    },
    MinConsecutiveDaysOff {
        min: usize,
    },
    PenalizeWorkOnDays {
        days: Vec<String>,
    },
    PenalizeWorkOnShifts {
        shifts: Vec<String>,
    },
    PenalizeUnmetDayOffRequests {
        requests: Vec<DayOffRequest>,
    },
    FairDistribution {
        shifts: Vec<String>,
        window_days: Option<usize>,
    },
}

impl RuleKind {
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            RuleKind::PenalizeWorkOnDays { .. }
                | RuleKind::PenalizeWorkOnShifts { .. }
                | RuleKind::PenalizeUnmetDayOffRequests { .. }
                | RuleKind::FairDistribution { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftPair {
    pub prev_shift: String,
    pub next_shift: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayOffRequest {
    pub employee: String,
    pub day: String,
}

// Parameter shapes, one per kind. `deny_unknown_fields` turns a stray key
// into a reported violation rather than a silent ignore.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExactlyOneParams {
    pub shifts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForbidSequencesParams {
    pub forbidden_pairs: Vec<ShiftPair>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaxShiftsParams {
    pub window_days: usize,
    #[serde(default)]
    pub shifts: Option<Vec<String>>,
    pub max: i64,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinRestParams {
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaxWorkMinutesParams {
    pub window_days: usize,
    pub max: i64,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaxConsecutiveParams {
    pub max: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinDaysOffParams {
    pub min: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PenalizeDaysParams {
    pub days: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PenalizeShiftsParams {
    pub shifts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayOffRequestsParams {
    pub requests: Vec<DayOffRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FairDistributionParams {
    #[serde(default)]
    pub measure: Option<String>,
    pub shifts: Vec<String>,
    #[serde(default)]
    pub window_days: Option<usize>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub penalize: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_defaults_to_all() {
        let scope: Scope = serde_json::from_value(json!({})).unwrap();
        match scope.employees {
            ScopeEmployees::Keyword(k) => assert_eq!(k, "ALL"),
            _ => panic!("expected keyword"),
        }
    }

    #[test]
    fn scope_accepts_id_list() {
        let scope: Scope = serde_json::from_value(json!({"employees": ["P1", "P2"]})).unwrap();
        match scope.employees {
            ScopeEmployees::Ids(ids) => assert_eq!(ids, vec!["P1", "P2"]),
            _ => panic!("expected ids"),
        }
    }

    #[test]
    fn scope_rejects_unknown_filter() {
        let err = serde_json::from_value::<Scope>(json!({"shoe_size": [42]}));
        assert!(err.is_err());
    }

    #[test]
    fn rule_entry_roundtrip() {
        let entry: RuleEntry = serde_json::from_value(json!({
            "id": "one-per-day",
            "type": "hard",
            "kind": "exactly_one_assignment_per_day",
            "scope": {"employees": "ALL"},
            "data": {"shifts": ["M", "OFF"]}
        }))
        .unwrap();
        assert_eq!(entry.r#type, RuleType::Hard);
        assert_eq!(entry.kind, "exactly_one_assignment_per_day");
    }

    #[test]
    fn fair_distribution_params_reject_extras() {
        let err = serde_json::from_value::<FairDistributionParams>(json!({
            "shifts": ["N"],
            "window_days": 7,
            "jitter": true
        }));
        assert!(err.is_err());
    }

    #[test]
    fn rest_shape_is_fixed() {
        let rest = ShiftDef::rest();
        assert_eq!(rest.minutes, 0);
        assert!(!rest.is_work);
        assert_eq!(rest.start, "00:00");
        assert_eq!(rest.end, "00:00");
    }
}
