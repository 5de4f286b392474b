//! Projection of a raw solver assignment into the reported schedule.
//!
//! Two views are emitted side by side: the nested
//! `data[day][site][shift] = [employees]` grouping with a parallel rest
//! map, and the flat row form ordered by (date, site, shift, employee) in
//! spec order. Rest assignments never enter the site grouping.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::cp::Assignment;
use crate::lower::Compiled;
use crate::normalize::NormalizedSpec;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlatRow {
    pub date: String,
    pub site: String,
    pub shift: String,
    pub employee: String,
}

/// Nested view plus the rest map.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    pub rest: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub minutes_worked: BTreeMap<String, i64>,
    pub shift_counts: BTreeMap<String, BTreeMap<String, i64>>,
}

/// Everything the projector derives from one assignment.
#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub schedule: ScheduleView,
    pub flat: Vec<FlatRow>,
    pub penalties: BTreeMap<String, i64>,
    pub metrics: Metrics,
}

/// Site a work assignment is reported under: the employee's home site
/// when declared, otherwise the first spec-ordered site with demand for
/// that (day, shift), otherwise the first site.
fn attributed_site<'a>(
    norm: &'a NormalizedSpec,
    employee: &str,
    day: &str,
    shift: &str,
) -> &'a str {
    if let Some(home) = norm
        .employee_defs
        .get(employee)
        .and_then(|def| def.site_home.as_deref())
    {
        return home;
    }
    for site in &norm.sites {
        let demanded = norm.demand.iter().any(|entry| {
            entry.day == day && entry.shift == shift && entry.site.as_deref() == Some(site)
        });
        if demanded {
            return site;
        }
    }
    &norm.sites[0]
}

pub fn project(norm: &NormalizedSpec, compiled: &Compiled, solution: &Assignment) -> Projection {
    let lat = &compiled.lattice;

    // Prefill the grouping so every (day, site, work shift) cell exists.
    let mut data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>> =
        BTreeMap::new();
    let mut rest: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for day in &norm.days {
        let sites = data.entry(day.clone()).or_default();
        for site in &norm.sites {
            let shifts = sites.entry(site.clone()).or_default();
            for shift in &norm.work_shifts {
                shifts.entry(shift.clone()).or_default();
            }
        }
        rest.entry(day.clone()).or_default();
    }

    let mut minutes_worked: BTreeMap<String, i64> = BTreeMap::new();
    let mut shift_counts: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for employee in &norm.employees {
        minutes_worked.insert(employee.clone(), 0);
        shift_counts.insert(
            employee.clone(),
            norm.work_shifts.iter().map(|s| (s.clone(), 0)).collect(),
        );
    }

    let rest_idx = norm.shift_position(crate::spec::REST_SHIFT).unwrap();
    for (e, employee) in norm.employees.iter().enumerate() {
        for (d, day) in norm.days.iter().enumerate() {
            if solution.value(lat.x(e, d, rest_idx)) == 1 {
                rest.get_mut(day).unwrap().push(employee.clone());
            }
            for (s, shift) in norm.shifts.iter().enumerate() {
                if s == rest_idx || !norm.shift_info(shift).is_work {
                    continue;
                }
                if solution.value(lat.x(e, d, s)) != 1 {
                    continue;
                }
                let site = attributed_site(norm, employee, day, shift).to_string();
                data.get_mut(day)
                    .unwrap()
                    .get_mut(&site)
                    .unwrap()
                    .get_mut(shift)
                    .unwrap()
                    .push(employee.clone());
                *minutes_worked.get_mut(employee).unwrap() += norm.shift_info(shift).minutes;
                *shift_counts
                    .get_mut(employee)
                    .unwrap()
                    .get_mut(shift)
                    .unwrap() += 1;
            }
        }
    }

    // Flat rows walk the grouping in spec order, so the contract ordering
    // (date, site, shift, employee) falls out of construction.
    let mut flat = Vec::new();
    for day in &norm.days {
        for site in &norm.sites {
            for shift in &norm.work_shifts {
                for employee in &data[day][site][shift] {
                    flat.push(FlatRow {
                        date: day.clone(),
                        site: site.clone(),
                        shift: shift.clone(),
                        employee: employee.clone(),
                    });
                }
            }
        }
    }

    let penalties = compiled
        .penalties
        .iter()
        .map(|p| (p.id.clone(), solution.eval(&p.violations)))
        .collect();

    Projection {
        schedule: ScheduleView { data, rest },
        flat,
        penalties,
        metrics: Metrics {
            minutes_worked,
            shift_counts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::SolveParams;
    use crate::lower::compile;
    use crate::normalize::normalize;
    use serde_json::json;
    use std::time::Duration;

    fn solved_projection() -> (NormalizedSpec, Projection) {
        let doc = serde_json::from_value(json!({
            "sets": {
                "employees": ["P1", "P2"],
                "days": ["2026-03-02", "2026-03-03"],
                "shifts": ["M", "OFF"],
                "sites": ["A"]
            },
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            },
            "employees": {"P1": {"site_home": "A"}, "P2": {"site_home": "A"}},
            "demand": [
                {"day": "2026-03-02", "site": "A", "shift": "M", "eq": 2},
                {"day": "2026-03-03", "site": "A", "shift": "M", "eq": 1}
            ],
            "constraints": [
                {
                    "id": "one-per-day",
                    "type": "hard",
                    "kind": "exactly_one_assignment_per_day",
                    "scope": {"employees": "ALL"},
                    "data": {"shifts": ["M", "OFF"]}
                },
                {
                    "id": "avoid-monday",
                    "type": "soft",
                    "kind": "penalize_work_on_days",
                    "scope": {"employees": "ALL"},
                    "data": {"days": ["2026-03-02"]},
                    "penalty": {"weight": 1}
                }
            ]
        }))
        .unwrap();
        let norm = normalize(doc).unwrap();
        let compiled = compile(&norm).unwrap();
        let out = compiled.lattice.model.solve(SolveParams {
            max_time: Duration::from_secs(10),
            workers: 1,
        });
        let projection = project(&norm, &compiled, out.assignment.as_ref().unwrap());
        (norm, projection)
    }

    #[test]
    fn nested_view_groups_by_day_site_shift() {
        let (_, p) = solved_projection();
        assert_eq!(
            p.schedule.data["2026-03-02"]["A"]["M"],
            vec!["P1".to_string(), "P2".to_string()]
        );
        assert_eq!(p.schedule.data["2026-03-03"]["A"]["M"].len(), 1);
    }

    #[test]
    fn rest_map_holds_off_employees() {
        let (_, p) = solved_projection();
        assert!(p.schedule.rest["2026-03-02"].is_empty());
        assert_eq!(p.schedule.rest["2026-03-03"].len(), 1);
    }

    #[test]
    fn flat_rows_sorted_by_contract_order() {
        let (_, p) = solved_projection();
        assert_eq!(p.flat.len(), 3);
        assert_eq!(p.flat[0].date, "2026-03-02");
        assert_eq!(p.flat[0].employee, "P1");
        assert_eq!(p.flat[1].employee, "P2");
        assert_eq!(p.flat[2].date, "2026-03-03");
    }

    #[test]
    fn flat_and_nested_agree() {
        let (_, p) = solved_projection();
        let mut from_nested = Vec::new();
        for (day, sites) in &p.schedule.data {
            for (site, shifts) in sites {
                for (shift, employees) in shifts {
                    for employee in employees {
                        from_nested.push((day.clone(), site.clone(), shift.clone(), employee.clone()));
                    }
                }
            }
        }
        let mut from_flat: Vec<_> = p
            .flat
            .iter()
            .map(|r| (r.date.clone(), r.site.clone(), r.shift.clone(), r.employee.clone()))
            .collect();
        from_nested.sort();
        from_flat.sort();
        assert_eq!(from_nested, from_flat);
    }

    #[test]
    fn penalties_report_unweighted_counts() {
        let (_, p) = solved_projection();
        // Both employees must work the penalized day: two violations.
        assert_eq!(p.penalties["avoid-monday"], 2);
    }

    #[test]
    fn metrics_count_minutes_and_shifts() {
        let (_, p) = solved_projection();
        let total: i64 = p.metrics.minutes_worked.values().sum();
        assert_eq!(total, 3 * 480);
        let m_counts: i64 = p.metrics.shift_counts.values().map(|c| c["M"]).sum();
        assert_eq!(m_counts, 3);
    }
}
