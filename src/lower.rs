//! Lowering from the normalized spec into the CP model.
//!
//! Demand coverage is always emitted; each declared rule lowers through
//! one arm of the match on [`RuleKind`]. Soft rules wire their violation
//! expressions into a penalty ledger, which the objective assembly folds
//! into a single weighted minimization.
//!
//! Window conventions: every start position yields a window, truncated at
//! the calendar tail, never wrapped. The rest shift contributes nothing
//! to work counts, minutes sums, rest-gap pairs, or consecutive runs.

use crate::cp::LinExpr;
use crate::lattice::{BuildError, Lattice};
use crate::normalize::{rest_gap_minutes, NormalizedSpec};
use crate::spec::RuleKind;

/// One soft rule's contribution: the unweighted violation expression and
/// the weight it enters the objective with.
pub struct PenaltyRule {
    pub id: String,
    pub weight: i64,
    pub violations: LinExpr,
}

/// The fully lowered model, ready for the solver driver.
pub struct Compiled {
    pub lattice: Lattice,
    pub penalties: Vec<PenaltyRule>,
}

/// Every window start over `n_days`, truncated at the tail.
fn rolling_windows(n_days: usize, width: usize) -> impl Iterator<Item = std::ops::Range<usize>> {
    (0..n_days).map(move |start| start..(start + width).min(n_days))
}

/// Windows for fair distribution: a width covering the whole horizon
/// collapses to the single full window instead of a fan of suffixes.
fn fairness_windows(n_days: usize, width: usize) -> Vec<std::ops::Range<usize>> {
    if width >= n_days {
        vec![0..n_days]
    } else {
        rolling_windows(n_days, width).collect()
    }
}

/// Compiles the normalized spec into a CP model plus penalty ledger.
pub fn compile(norm: &NormalizedSpec) -> Result<Compiled, BuildError> {
    let mut lat = Lattice::build(norm)?;
    let n_days = norm.days.len();

    lower_demand(norm, &mut lat);

    let mut penalties = Vec::new();
    for rule in &norm.rules {
        let scope: Vec<usize> = rule
            .employees
            .iter()
            .filter_map(|id| norm.employee_index(id))
            .collect();

        match &rule.kind {
            RuleKind::ExactlyOneAssignmentPerDay { .. } => {
                for &e in &scope {
                    for d in 0..n_days {
                        let mut row = LinExpr::new();
                        for s in 0..norm.shifts.len() {
                            row.push(1, lat.x(e, d, s));
                        }
                        lat.model.add_eq(row, 1);
                    }
                }
            }

            RuleKind::ForbidShiftSequences { forbidden_pairs } => {
                for pair in forbidden_pairs {
                    let prev = norm.shift_position(&pair.prev_shift).unwrap();
                    let next = norm.shift_position(&pair.next_shift).unwrap();
                    for &e in &scope {
                        for d in 0..n_days.saturating_sub(1) {
                            let mut row = LinExpr::var(lat.x(e, d, prev));
                            row.push(1, lat.x(e, d + 1, next));
                            lat.model.add_le(row, 1);
                        }
                    }
                }
            }

            RuleKind::MaxShiftsInWindow {
                window_days,
                shifts,
                max,
            } => {
                let counted: Vec<usize> = match shifts {
                    Some(labels) => labels
                        .iter()
                        .filter_map(|s| norm.shift_position(s))
                        .collect(),
                    None => lat.work_shift_indices().to_vec(),
                };
                for &e in &scope {
                    for window in rolling_windows(n_days, *window_days) {
                        let mut row = LinExpr::new();
                        for d in window {
                            for &s in &counted {
                                row.push(1, lat.x(e, d, s));
                            }
                        }
                        lat.model.add_le(row, *max);
                    }
                }
            }

            RuleKind::MinRestMinutesBetweenShifts { minutes } => {
                // Precompute the work-shift pairs whose day-boundary gap is
                // too short; only those become binary exclusions.
                let work: Vec<usize> = lat.work_shift_indices().to_vec();
                let mut short_pairs = Vec::new();
                for &s1 in &work {
                    for &s2 in &work {
                        let gap = rest_gap_minutes(
                            norm.shift_info(&norm.shifts[s1]),
                            norm.shift_info(&norm.shifts[s2]),
                        );
                        if gap < *minutes {
                            short_pairs.push((s1, s2));
                        }
                    }
                }
                for &e in &scope {
                    for d in 0..n_days.saturating_sub(1) {
                        for &(s1, s2) in &short_pairs {
                            let mut row = LinExpr::var(lat.x(e, d, s1));
                            row.push(1, lat.x(e, d + 1, s2));
                            lat.model.add_le(row, 1);
                        }
                    }
                }
            }

            RuleKind::MaxWorkMinutesInWindow { window_days, max } => {
                for &e in &scope {
                    for window in rolling_windows(n_days, *window_days) {
                        let mut row = LinExpr::new();
                        for d in window {
                            row.add(&lat.minutes(e, d));
                        }
                        lat.model.add_le(row, *max);
                    }
                }
            }

            RuleKind::MaxConsecutiveWorkDays { max } => {
                let span = max + 1;
                for &e in &scope {
                    for start in 0..n_days.saturating_sub(span - 1) {
                        let mut row = LinExpr::new();
                        for d in start..start + span {
                            row.add(&lat.work(e, d));
                        }
                        lat.model.add_le(row, *max as i64);
                    }
                }
            }

            RuleKind::MinConsecutiveDaysOff { min } => {
                // Forbid "work, off for exactly L days, work" for every run
                // shorter than the minimum:
                //   work[d-1] + work[d+L] - Σ_{j in run} work[j] <= 1.
                for &e in &scope {
                    for d in 1..n_days {
                        for len in 1..*min {
                            if d + len >= n_days {
                                break;
                            }
                            let mut row = LinExpr::new();
                            row.add(&lat.work(e, d - 1));
                            row.add(&lat.work(e, d + len));
                            for j in d..d + len {
                                row.add_scaled(-1, &lat.work(e, j));
                            }
                            lat.model.add_le(row, 1);
                        }
                    }
                }
            }

            RuleKind::PenalizeWorkOnDays { days } => {
                let mut violations = LinExpr::new();
                for &e in &scope {
                    for day in days {
                        let d = norm.day_index(day).unwrap();
                        violations.add(&lat.work(e, d));
                    }
                }
                penalties.push(PenaltyRule {
                    id: rule.id.clone(),
                    weight: rule.weight,
                    violations,
                });
            }

            RuleKind::PenalizeWorkOnShifts { shifts } => {
                let counted: Vec<usize> = shifts
                    .iter()
                    .filter_map(|s| norm.shift_position(s))
                    .collect();
                let mut violations = LinExpr::new();
                for &e in &scope {
                    for d in 0..n_days {
                        for &s in &counted {
                            violations.push(1, lat.x(e, d, s));
                        }
                    }
                }
                penalties.push(PenaltyRule {
                    id: rule.id.clone(),
                    weight: rule.weight,
                    violations,
                });
            }

            RuleKind::PenalizeUnmetDayOffRequests { requests } => {
                let mut violations = LinExpr::new();
                for req in requests {
                    let e = norm.employee_index(&req.employee).unwrap();
                    let d = norm.day_index(&req.day).unwrap();
                    violations.add(&lat.work(e, d));
                }
                penalties.push(PenaltyRule {
                    id: rule.id.clone(),
                    weight: rule.weight,
                    violations,
                });
            }

            RuleKind::FairDistribution {
                shifts,
                window_days,
            } => {
                if scope.is_empty() {
                    continue;
                }
                let counted: Vec<usize> = shifts
                    .iter()
                    .filter_map(|s| norm.shift_position(s))
                    .collect();
                let n = scope.len() as i64;
                let mut violations = LinExpr::new();

                for window in fairness_windows(n_days, window_days.unwrap_or(n_days)) {
                    let span = window.len() as i64;

                    // Per-employee count inside the window.
                    let mut counts = Vec::with_capacity(scope.len());
                    for &e in &scope {
                        let c = lat.model.new_int(0, span);
                        let mut row = LinExpr::new();
                        for d in window.clone() {
                            for &s in &counted {
                                row.push(1, lat.x(e, d, s));
                            }
                        }
                        row.push(-1, c);
                        lat.model.add_eq(row, 0);
                        counts.push(c);
                    }

                    // mu = floor(Σ counts / n), held inside the model:
                    //   0 <= Σ counts - n·mu <= n - 1.
                    let mu = lat.model.new_int(0, span);
                    let mut total = LinExpr::new();
                    for &c in &counts {
                        total.push(1, c);
                    }
                    total.push(-n, mu);
                    lat.model.add_range(total, 0, n - 1);

                    // |c_e - mu| through a pair of non-negative slacks.
                    for &c in &counts {
                        let up = lat.model.new_int(0, span);
                        let dn = lat.model.new_int(0, span);
                        let mut balance = LinExpr::var(c);
                        balance.push(-1, mu);
                        balance.push(-1, up);
                        balance.push(1, dn);
                        lat.model.add_eq(balance, 0);
                        violations.push(1, up);
                        violations.push(1, dn);
                    }
                }

                penalties.push(PenaltyRule {
                    id: rule.id.clone(),
                    weight: rule.weight,
                    violations,
                });
            }
        }
    }

    // Objective assembly: one weighted sum over the ledger.
    let mut objective = LinExpr::new();
    for penalty in &penalties {
        objective.add_scaled(norm.objective_weight * penalty.weight, &penalty.violations);
    }
    lat.model.minimize(objective);

    Ok(Compiled {
        lattice: lat,
        penalties,
    })
}

/// Demand coverage, always enforced: eligible headcount per entry, plus
/// per-skill and per-role minimums.
fn lower_demand(norm: &NormalizedSpec, lat: &mut Lattice) {
    for entry in &norm.demand {
        let d = norm.day_index(&entry.day).unwrap();
        let s = norm.shift_position(&entry.shift).unwrap();
        let site = entry.site.as_deref().unwrap();

        let eligible: Vec<usize> = norm
            .employees
            .iter()
            .enumerate()
            .filter(|(_, id)| norm.eligible_for_site(id, site))
            .map(|(i, _)| i)
            .collect();

        let mut headcount = LinExpr::new();
        for &e in &eligible {
            headcount.push(1, lat.x(e, d, s));
        }
        if let Some(eq) = entry.eq {
            lat.model.add_eq(headcount, eq);
        } else {
            if let Some(min) = entry.min {
                lat.model.add_ge(headcount.clone(), min);
            }
            if let Some(max) = entry.max {
                lat.model.add_le(headcount, max);
            }
        }

        let Some(req) = &entry.requirements else {
            continue;
        };
        for skill in &req.skills_min {
            let mut covered = LinExpr::new();
            for &e in &eligible {
                let has = norm
                    .employee_defs
                    .get(&norm.employees[e])
                    .is_some_and(|def| def.skills.contains(&skill.skill));
                if has {
                    covered.push(1, lat.x(e, d, s));
                }
            }
            lat.model.add_ge(covered, skill.min);
        }
        for role in &req.roles_min {
            let mut covered = LinExpr::new();
            for &e in &eligible {
                let has = norm
                    .employee_defs
                    .get(&norm.employees[e])
                    .is_some_and(|def| def.roles.contains(&role.role));
                if has {
                    covered.push(1, lat.x(e, d, s));
                }
            }
            lat.model.add_ge(covered, role.min);
        }
    }
}
