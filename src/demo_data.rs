//! Demo spec generators for the rostering service.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }
}

pub fn list_demo_data() -> Vec<&'static str> {
    vec![DemoData::Small.as_str(), DemoData::Large.as_str()]
}

struct DemoParameters {
    employee_count: usize,
    days_in_schedule: usize,
    sites: Vec<&'static str>,
    skills: Vec<&'static str>,
}

/// Generates a deterministic demo spec.
pub fn generate(demo: DemoData) -> Value {
    let params = match demo {
        DemoData::Small => DemoParameters {
            employee_count: 5,
            days_in_schedule: 7,
            sites: vec!["MAIN"],
            skills: vec!["certified"],
        },
        DemoData::Large => DemoParameters {
            employee_count: 12,
            days_in_schedule: 14,
            sites: vec!["NORTH", "SOUTH"],
            skills: vec!["certified", "senior"],
        },
    };
    let mut rng = StdRng::seed_from_u64(37);

    let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let days: Vec<String> = (0..params.days_in_schedule)
        .map(|i| (start + Duration::days(i as i64)).format("%Y-%m-%d").to_string())
        .collect();

    let employee_ids: Vec<String> = (1..=params.employee_count).map(|i| format!("P{i}")).collect();
    let mut employees = serde_json::Map::new();
    for (i, id) in employee_ids.iter().enumerate() {
        let mut skills: Vec<&str> = Vec::new();
        for skill in &params.skills {
            if rng.gen_bool(0.4) {
                skills.push(skill);
            }
        }
        let site = params.sites[i % params.sites.len()];
        employees.insert(
            id.clone(),
            json!({
                "skills": skills,
                "roles": if i == 0 { vec!["team_lead"] } else { Vec::<&str>::new() },
                "site_home": site,
                "contract": {"type": if rng.gen_bool(0.8) { "full_time" } else { "part_time" }}
            }),
        );
    }

    let mut demand = Vec::new();
    for day in &days {
        for site in &params.sites {
            demand.push(json!({"day": day, "site": site, "shift": "E", "eq": 1}));
            demand.push(json!({"day": day, "site": site, "shift": "L", "min": 0, "max": 1}));
            demand.push(json!({"day": day, "site": site, "shift": "N", "eq": 1}));
        }
    }

    let weekend_days: Vec<&String> = days
        .iter()
        .filter(|d| {
            let date = NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap();
            matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        })
        .collect();

    let mut constraints = vec![
        json!({
            "id": "one-assignment-per-day",
            "type": "hard",
            "kind": "exactly_one_assignment_per_day",
            "scope": {"employees": "ALL"},
            "data": {"shifts": ["E", "L", "N", "OFF"]}
        }),
        json!({
            "id": "rest-11h",
            "type": "hard",
            "kind": "min_rest_minutes_between_shifts",
            "scope": {"employees": "ALL"},
            "data": {"minutes": 660}
        }),
        json!({
            "id": "max-5-consecutive",
            "type": "hard",
            "kind": "max_consecutive_work_days",
            "scope": {"employees": "ALL"},
            "data": {"max": 5}
        }),
        json!({
            "id": "fair-nights",
            "type": "soft",
            "kind": "fair_distribution",
            "scope": {"employees": "ALL"},
            "data": {"measure": "count", "shifts": ["N"],
                     "window_days": params.days_in_schedule,
                     "target": "auto_mean", "penalize": "absolute_deviation"},
            "penalty": {"weight": 1}
        }),
    ];
    if !weekend_days.is_empty() {
        constraints.push(json!({
            "id": "avoid-weekends",
            "type": "soft",
            "kind": "penalize_work_on_days",
            "scope": {"employees": "ALL"},
            "data": {"days": weekend_days},
            "penalty": {"weight": 2}
        }));
    }

    json!({
        "sets": {
            "employees": employee_ids,
            "days": days,
            "shifts": ["E", "L", "N", "OFF"],
            "sites": params.sites
        },
        "shifts": {
            "E": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
            "L": {"start": "14:00", "end": "22:00", "minutes": 480, "is_work": true},
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true},
            "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
        },
        "employees": employees,
        "demand": demand,
        "constraints": constraints,
        "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
    })
}
