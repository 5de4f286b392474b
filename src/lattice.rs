//! Assignment lattice: the Boolean decision table `X[e, d, s]`.
//!
//! One Boolean per (employee, day, shift) cell, allocated in a fixed
//! (e, d, s) order so the engine's forward branching walks employee by
//! employee. Derived `work` and `minutes` rows are built on first use and
//! cached, so every rule that needs them shares one expression.

use thiserror::Error;

use crate::cp::{CpModel, LinExpr, VarId};
use crate::normalize::NormalizedSpec;

/// Upper bound on lattice cells; larger specs are rejected before any
/// variable is allocated.
pub const MAX_LATTICE_CELLS: usize = 250_000;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("lattice of {cells} cells exceeds the {MAX_LATTICE_CELLS} cell ceiling")]
    LatticeTooLarge { cells: usize },
}

pub struct Lattice {
    pub model: CpModel,
    x: Vec<VarId>,
    n_days: usize,
    n_shifts: usize,
    /// Shift indices with `is_work`, ascending.
    work_shift_idx: Vec<usize>,
    /// Minutes per shift index (0 for rest).
    shift_minutes: Vec<i64>,
    work_cache: Vec<Option<LinExpr>>,
    minutes_cache: Vec<Option<LinExpr>>,
}

impl Lattice {
    pub fn build(norm: &NormalizedSpec) -> Result<Self, BuildError> {
        let n_emps = norm.employees.len();
        let n_days = norm.days.len();
        let n_shifts = norm.shifts.len();
        let cells = n_emps
            .saturating_mul(n_days)
            .saturating_mul(n_shifts);
        if cells > MAX_LATTICE_CELLS {
            return Err(BuildError::LatticeTooLarge { cells });
        }

        let mut model = CpModel::new();
        let x: Vec<VarId> = (0..cells).map(|_| model.new_bool()).collect();

        let work_shift_idx = norm
            .shifts
            .iter()
            .enumerate()
            .filter(|(_, s)| norm.shift_info(s).is_work)
            .map(|(i, _)| i)
            .collect();
        let shift_minutes = norm
            .shifts
            .iter()
            .map(|s| norm.shift_info(s).minutes)
            .collect();

        Ok(Self {
            model,
            x,
            n_days,
            n_shifts,
            work_shift_idx,
            shift_minutes,
            work_cache: vec![None; n_emps * n_days],
            minutes_cache: vec![None; n_emps * n_days],
        })
    }

    /// The decision variable for (employee, day, shift), all by index.
    pub fn x(&self, emp: usize, day: usize, shift: usize) -> VarId {
        self.x[(emp * self.n_days + day) * self.n_shifts + shift]
    }

    /// `Σ_{s work} X[e,d,s]`: 1 iff the employee works that day.
    pub fn work(&mut self, emp: usize, day: usize) -> LinExpr {
        let key = emp * self.n_days + day;
        if self.work_cache[key].is_none() {
            let mut expr = LinExpr::new();
            for &s in &self.work_shift_idx {
                expr.push(1, self.x(emp, day, s));
            }
            self.work_cache[key] = Some(expr);
        }
        self.work_cache[key].clone().unwrap()
    }

    /// `Σ_s minutes(s) · X[e,d,s]`.
    pub fn minutes(&mut self, emp: usize, day: usize) -> LinExpr {
        let key = emp * self.n_days + day;
        if self.minutes_cache[key].is_none() {
            let mut expr = LinExpr::new();
            for &s in &self.work_shift_idx {
                expr.push(self.shift_minutes[s], self.x(emp, day, s));
            }
            self.minutes_cache[key] = Some(expr);
        }
        self.minutes_cache[key].clone().unwrap()
    }

    pub fn work_shift_indices(&self) -> &[usize] {
        &self.work_shift_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn small_norm() -> NormalizedSpec {
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
            "employees": {},
            "demand": [],
            "constraints": []
        }))
        .unwrap();
        normalize(doc).unwrap()
    }

    #[test]
    fn allocates_full_cross_product() {
        let norm = small_norm();
        let lat = Lattice::build(&norm).unwrap();
        assert_eq!(lat.model.num_vars(), 2 * 2 * 2);
    }

    #[test]
    fn distinct_cells_distinct_vars() {
        let norm = small_norm();
        let lat = Lattice::build(&norm).unwrap();
        assert_ne!(lat.x(0, 0, 0), lat.x(0, 0, 1));
        assert_ne!(lat.x(0, 1, 0), lat.x(1, 0, 0));
    }

    #[test]
    fn work_excludes_rest_shift() {
        let norm = small_norm();
        let mut lat = Lattice::build(&norm).unwrap();
        // M is the only work shift, so the row has exactly one term.
        assert_eq!(lat.work(0, 0).len(), 1);
        assert_eq!(lat.minutes(0, 0).len(), 1);
    }

    #[test]
    fn rejects_oversized_lattice() {
        let mut doc: crate::spec::SpecDoc = serde_json::from_value(json!({
            "sets": {
                "employees": [],
                "days": ["2026-03-02"],
                "shifts": ["M", "OFF"],
                "sites": ["A"]
            },
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            }
        }))
        .unwrap();
        doc.sets.employees = (0..200_000).map(|i| format!("E{i}")).collect();
        let norm = normalize(doc).unwrap();
        assert!(matches!(
            Lattice::build(&norm),
            Err(BuildError::LatticeTooLarge { .. })
        ));
    }
}
