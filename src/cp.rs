//! A compact CP engine over integer variables and linear constraints.
//!
//! The model is a plain value: interval domains, `lo <= Σ c·x <= hi` rows,
//! and a single minimization objective. Solving runs bounds-consistency
//! propagation inside a depth-first branch-and-bound, with a small
//! portfolio of search strategies sharing one incumbent across rayon
//! workers. Statuses distinguish a proven optimum, a deadline-bounded
//! feasible solution, proven infeasibility, and a deadline with nothing
//! found.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

const NEG_INF: i64 = i64::MIN / 4;
const POS_INF: i64 = i64::MAX / 4;

/// Handle to a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

/// A linear expression `Σ c_i · x_i + k`.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    terms: Vec<(i64, VarId)>,
    constant: i64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(k: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: k,
        }
    }

    pub fn var(v: VarId) -> Self {
        Self {
            terms: vec![(1, v)],
            constant: 0,
        }
    }

    pub fn push(&mut self, coef: i64, var: VarId) {
        if coef != 0 {
            self.terms.push((coef, var));
        }
    }

    pub fn add(&mut self, other: &LinExpr) {
        self.terms.extend_from_slice(&other.terms);
        self.constant += other.constant;
    }

    /// Adds `k · other`.
    pub fn add_scaled(&mut self, k: i64, other: &LinExpr) {
        if k == 0 {
            return;
        }
        self.terms
            .extend(other.terms.iter().map(|&(c, v)| (c * k, v)));
        self.constant += k * other.constant;
    }

    pub fn offset(&mut self, k: i64) {
        self.constant += k;
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of (coefficient, variable) terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Merges duplicate variables and drops zero coefficients.
    fn coalesced(mut self) -> Self {
        self.terms.sort_unstable_by_key(|(_, v)| v.0);
        let mut merged: Vec<(i64, VarId)> = Vec::with_capacity(self.terms.len());
        for (coef, var) in self.terms {
            match merged.last_mut() {
                Some((c, v)) if *v == var => *c += coef,
                _ => merged.push((coef, var)),
            }
        }
        merged.retain(|(c, _)| *c != 0);
        self.terms = merged;
        self
    }
}

#[derive(Debug, Clone)]
struct LinCon {
    terms: Vec<(i64, VarId)>,
    lo: i64,
    hi: i64,
}

/// A constraint model owned by a single solve.
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    lb: Vec<i64>,
    ub: Vec<i64>,
    cons: Vec<LinCon>,
    objective: LinExpr,
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_bool(&mut self) -> VarId {
        self.new_int(0, 1)
    }

    pub fn new_int(&mut self, lo: i64, hi: i64) -> VarId {
        let id = VarId(self.lb.len());
        self.lb.push(lo);
        self.ub.push(hi);
        id
    }

    pub fn num_vars(&self) -> usize {
        self.lb.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.cons.len()
    }

    /// Adds `lo <= expr <= hi`.
    pub fn add_range(&mut self, expr: LinExpr, lo: i64, hi: i64) {
        let expr = expr.coalesced();
        let lo = if lo <= NEG_INF { NEG_INF } else { lo - expr.constant };
        let hi = if hi >= POS_INF { POS_INF } else { hi - expr.constant };
        self.cons.push(LinCon {
            terms: expr.terms,
            lo,
            hi,
        });
    }

    pub fn add_eq(&mut self, expr: LinExpr, k: i64) {
        self.add_range(expr, k, k);
    }

    pub fn add_le(&mut self, expr: LinExpr, k: i64) {
        self.add_range(expr, NEG_INF, k);
    }

    pub fn add_ge(&mut self, expr: LinExpr, k: i64) {
        self.add_range(expr, k, POS_INF);
    }

    pub fn minimize(&mut self, expr: LinExpr) {
        self.objective = expr.coalesced();
    }
}

/// Limits for one solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveParams {
    pub max_time: Duration,
    pub workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Incumbent proven optimal (or satisfiability proven for a constant
    /// objective).
    Optimal,
    /// Deadline expired with an incumbent in hand.
    Feasible,
    /// Search exhausted without any solution.
    Infeasible,
    /// Deadline expired before any solution was found.
    Timeout,
}

/// Values for every variable in a feasible assignment.
#[derive(Debug, Clone)]
pub struct Assignment {
    values: Vec<i64>,
}

impl Assignment {
    pub fn value(&self, var: VarId) -> i64 {
        self.values[var.0]
    }

    pub fn eval(&self, expr: &LinExpr) -> i64 {
        expr.terms
            .iter()
            .map(|(c, v)| c * self.values[v.0])
            .sum::<i64>()
            + expr.constant
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub status: SolveStatus,
    pub assignment: Option<Assignment>,
    pub objective: Option<i64>,
    /// Best-known lower bound on the objective.
    pub bound: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
enum VarOrder {
    Forward,
    Reverse,
    SmallestDomain,
}

#[derive(Debug, Clone, Copy)]
struct Strategy {
    order: VarOrder,
    low_first: bool,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy { order: VarOrder::Forward, low_first: true },
    Strategy { order: VarOrder::SmallestDomain, low_first: true },
    Strategy { order: VarOrder::Reverse, low_first: true },
    Strategy { order: VarOrder::Forward, low_first: false },
];

struct Shared {
    /// Objective of the incumbent; `POS_INF` until one exists.
    best_obj: AtomicI64,
    best: Mutex<Option<Vec<i64>>>,
    proven: AtomicBool,
}

impl Shared {
    fn record(&self, obj: i64, values: &[i64]) {
        let mut best = self.best.lock();
        if obj < self.best_obj.load(Ordering::SeqCst) {
            *best = Some(values.to_vec());
            self.best_obj.store(obj, Ordering::SeqCst);
        }
    }
}

enum Abort {
    Deadline,
    Done,
}

fn div_floor(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

fn div_ceil(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    -(-a).div_euclid(b)
}

struct Search<'a> {
    model: &'a CpModel,
    shared: &'a Shared,
    watchers: &'a [Vec<usize>],
    strategy: Strategy,
    deadline: Instant,
    lb: Vec<i64>,
    ub: Vec<i64>,
    trail: Vec<(usize, i64, i64)>,
    nodes: u64,
}

impl<'a> Search<'a> {
    fn set_lb(&mut self, var: usize, val: i64, queue: &mut Vec<usize>) -> bool {
        if val > self.lb[var] {
            self.trail.push((var, self.lb[var], self.ub[var]));
            self.lb[var] = val;
            if self.lb[var] > self.ub[var] {
                return false;
            }
            queue.extend_from_slice(&self.watchers[var]);
        }
        true
    }

    fn set_ub(&mut self, var: usize, val: i64, queue: &mut Vec<usize>) -> bool {
        if val < self.ub[var] {
            self.trail.push((var, self.lb[var], self.ub[var]));
            self.ub[var] = val;
            if self.lb[var] > self.ub[var] {
                return false;
            }
            queue.extend_from_slice(&self.watchers[var]);
        }
        true
    }

    /// Propagates the queued rows to a fixpoint. The row index equal to
    /// `cons.len()` denotes the objective cut `obj <= best - 1`.
    fn propagate(&mut self, queue: &mut Vec<usize>) -> bool {
        let model = self.model;
        while let Some(idx) = queue.pop() {
            let (terms, lo, hi): (&[(i64, VarId)], i64, i64) = if idx == model.cons.len() {
                let best = self.shared.best_obj.load(Ordering::Relaxed);
                if best >= POS_INF {
                    continue;
                }
                (
                    &model.objective.terms,
                    NEG_INF,
                    best - 1 - model.objective.constant,
                )
            } else {
                let con = &model.cons[idx];
                (&con.terms, con.lo, con.hi)
            };

            let mut smin: i64 = 0;
            let mut smax: i64 = 0;
            for &(c, VarId(v)) in terms {
                if c > 0 {
                    smin += c * self.lb[v];
                    smax += c * self.ub[v];
                } else {
                    smin += c * self.ub[v];
                    smax += c * self.lb[v];
                }
            }
            if smin > hi || smax < lo {
                return false;
            }

            // Term-wise tightening against both bounds:
            // c·x <= hi - rest_min  and  c·x >= lo - rest_max.
            for &(c, VarId(v)) in terms {
                let (tmin, tmax) = if c > 0 {
                    (c * self.lb[v], c * self.ub[v])
                } else {
                    (c * self.ub[v], c * self.lb[v])
                };
                let rest_min = smin - tmin;
                let rest_max = smax - tmax;
                let ok = if c > 0 {
                    self.set_ub(v, div_floor(hi - rest_min, c), queue)
                        && self.set_lb(v, div_ceil(lo - rest_max, c), queue)
                } else {
                    let p = -c;
                    self.set_lb(v, div_ceil(-(hi - rest_min), p), queue)
                        && self.set_ub(v, div_floor(-(lo - rest_max), p), queue)
                };
                if !ok {
                    return false;
                }
            }
        }
        true
    }

    fn pick_var(&self) -> Option<usize> {
        match self.strategy.order {
            VarOrder::Forward => (0..self.lb.len()).find(|&v| self.lb[v] < self.ub[v]),
            VarOrder::Reverse => (0..self.lb.len()).rev().find(|&v| self.lb[v] < self.ub[v]),
            VarOrder::SmallestDomain => (0..self.lb.len())
                .filter(|&v| self.lb[v] < self.ub[v])
                .min_by_key(|&v| self.ub[v] - self.lb[v]),
        }
    }

    fn checkpoint(&self) -> usize {
        self.trail.len()
    }

    fn rollback(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let (var, lo, hi) = self.trail.pop().unwrap();
            self.lb[var] = lo;
            self.ub[var] = hi;
        }
    }

    fn objective_min(&self) -> i64 {
        let mut lo = self.model.objective.constant;
        for &(c, VarId(v)) in &self.model.objective.terms {
            lo += if c > 0 { c * self.lb[v] } else { c * self.ub[v] };
        }
        lo
    }

    fn dfs(&mut self, mut queue: Vec<usize>) -> Result<(), Abort> {
        self.nodes += 1;
        if self.nodes % 256 == 0 {
            if Instant::now() >= self.deadline {
                return Err(Abort::Deadline);
            }
            if self.shared.proven.load(Ordering::Relaxed) {
                return Err(Abort::Done);
            }
        }

        // The objective cut may have moved since this subtree was entered.
        queue.push(self.model.cons.len());
        if !self.propagate(&mut queue) {
            return Ok(());
        }

        let Some(var) = self.pick_var() else {
            let obj = self.objective_min();
            self.shared.record(obj, &self.lb);
            return Ok(());
        };

        let (first, rest_lo, rest_hi) = if self.strategy.low_first {
            (self.lb[var], self.lb[var] + 1, self.ub[var])
        } else {
            (self.ub[var], self.lb[var], self.ub[var] - 1)
        };

        // Left branch: pin the variable.
        let mark = self.checkpoint();
        self.trail.push((var, self.lb[var], self.ub[var]));
        self.lb[var] = first;
        self.ub[var] = first;
        let mut q = self.watchers[var].clone();
        q.push(self.model.cons.len());
        self.dfs(q)?;
        self.rollback(mark);

        // Right branch: exclude it.
        let mark = self.checkpoint();
        self.trail.push((var, self.lb[var], self.ub[var]));
        self.lb[var] = rest_lo;
        self.ub[var] = rest_hi;
        if self.lb[var] <= self.ub[var] {
            let mut q = self.watchers[var].clone();
            q.push(self.model.cons.len());
            self.dfs(q)?;
        }
        self.rollback(mark);
        Ok(())
    }
}

impl CpModel {
    /// Runs the portfolio search. The model is borrowed immutably; all
    /// search state lives on the workers.
    pub fn solve(&self, params: SolveParams) -> Outcome {
        let deadline = Instant::now() + params.max_time;

        let mut watchers: Vec<Vec<usize>> = vec![Vec::new(); self.lb.len()];
        for (idx, con) in self.cons.iter().enumerate() {
            for &(_, VarId(v)) in &con.terms {
                watchers[v].push(idx);
            }
        }
        for &(_, VarId(v)) in &self.objective.terms {
            watchers[v].push(self.cons.len());
        }

        let shared = Shared {
            best_obj: AtomicI64::new(POS_INF),
            best: Mutex::new(None),
            proven: AtomicBool::new(false),
        };

        // Root propagation: infeasibility and the objective bound fall out
        // before any worker starts.
        let mut root = Search {
            model: self,
            shared: &shared,
            watchers: &watchers,
            strategy: STRATEGIES[0],
            deadline,
            lb: self.lb.clone(),
            ub: self.ub.clone(),
            trail: Vec::new(),
            nodes: 0,
        };
        let mut queue: Vec<usize> = (0..self.cons.len()).collect();
        if !root.propagate(&mut queue) {
            return Outcome {
                status: SolveStatus::Infeasible,
                assignment: None,
                objective: None,
                bound: None,
            };
        }
        let root_bound = root.objective_min();
        let root_lb = root.lb.clone();
        let root_ub = root.ub.clone();

        let n_workers = params.workers.max(1).min(STRATEGIES.len());
        rayon::scope(|scope| {
            for w in 0..n_workers {
                let shared = &shared;
                let watchers = &watchers;
                let root_lb = &root_lb;
                let root_ub = &root_ub;
                scope.spawn(move |_| {
                    let mut search = Search {
                        model: self,
                        shared,
                        watchers,
                        strategy: STRATEGIES[w % STRATEGIES.len()],
                        deadline,
                        lb: root_lb.clone(),
                        ub: root_ub.clone(),
                        trail: Vec::new(),
                        nodes: 0,
                    };
                    match search.dfs((0..self.cons.len()).collect()) {
                        Ok(()) => shared.proven.store(true, Ordering::SeqCst),
                        Err(_) => {}
                    }
                });
            }
        });

        let proven = shared.proven.load(Ordering::SeqCst);
        let best = shared.best.lock().take();
        match best {
            Some(values) => {
                let assignment = Assignment { values };
                let objective = assignment.eval(&self.objective);
                Outcome {
                    status: if proven {
                        SolveStatus::Optimal
                    } else {
                        SolveStatus::Feasible
                    },
                    bound: Some(if proven { objective } else { root_bound }),
                    objective: Some(objective),
                    assignment: Some(assignment),
                }
            }
            None => Outcome {
                status: if proven {
                    SolveStatus::Infeasible
                } else {
                    SolveStatus::Timeout
                },
                assignment: None,
                objective: None,
                bound: if proven { None } else { Some(root_bound) },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SolveParams {
        SolveParams {
            max_time: Duration::from_secs(10),
            workers: 2,
        }
    }

    #[test]
    fn minimizes_simple_sum() {
        let mut m = CpModel::new();
        let x = m.new_int(0, 10);
        let y = m.new_int(0, 10);
        let mut sum = LinExpr::var(x);
        sum.push(1, y);
        m.add_ge(sum.clone(), 7);
        m.minimize(sum);
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Optimal);
        assert_eq!(out.objective, Some(7));
    }

    #[test]
    fn exactly_one_forces_complement() {
        let mut m = CpModel::new();
        let a = m.new_bool();
        let b = m.new_bool();
        let mut sum = LinExpr::var(a);
        sum.push(1, b);
        m.add_eq(sum, 1);
        m.add_eq(LinExpr::var(a), 1);
        m.minimize(LinExpr::new());
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Optimal);
        let sol = out.assignment.unwrap();
        assert_eq!(sol.value(a), 1);
        assert_eq!(sol.value(b), 0);
    }

    #[test]
    fn detects_infeasibility() {
        let mut m = CpModel::new();
        let a = m.new_bool();
        let b = m.new_bool();
        let mut sum = LinExpr::var(a);
        sum.push(1, b);
        m.add_eq(sum, 3);
        m.minimize(LinExpr::new());
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert!(out.assignment.is_none());
    }

    #[test]
    fn weighted_objective_prefers_cheap_vars() {
        let mut m = CpModel::new();
        let cheap = m.new_bool();
        let dear = m.new_bool();
        let mut cover = LinExpr::var(cheap);
        cover.push(1, dear);
        m.add_ge(cover, 1);
        let mut obj = LinExpr::new();
        obj.push(1, cheap);
        obj.push(5, dear);
        m.minimize(obj);
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Optimal);
        assert_eq!(out.objective, Some(1));
        assert_eq!(out.assignment.unwrap().value(cheap), 1);
    }

    #[test]
    fn negative_coefficients_propagate() {
        let mut m = CpModel::new();
        let x = m.new_int(0, 10);
        let y = m.new_int(0, 10);
        // x - y = 4, y >= 3 → x >= 7
        let mut diff = LinExpr::var(x);
        diff.push(-1, y);
        m.add_eq(diff, 4);
        m.add_ge(LinExpr::var(y), 3);
        m.minimize(LinExpr::var(x));
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Optimal);
        assert_eq!(out.objective, Some(7));
    }

    #[test]
    fn absolute_deviation_slack_pattern() {
        // c - mu = up - dn, minimize up + dn with c fixed to 5 and mu to 3.
        let mut m = CpModel::new();
        let c = m.new_int(5, 5);
        let mu = m.new_int(3, 3);
        let up = m.new_int(0, 20);
        let dn = m.new_int(0, 20);
        let mut balance = LinExpr::var(c);
        balance.push(-1, mu);
        balance.push(-1, up);
        balance.push(1, dn);
        m.add_eq(balance, 0);
        let mut obj = LinExpr::var(up);
        obj.push(1, dn);
        m.minimize(obj);
        let out = m.solve(params());
        assert_eq!(out.objective, Some(2));
    }

    #[test]
    fn duplicate_terms_coalesce() {
        let mut m = CpModel::new();
        let x = m.new_int(0, 10);
        let mut twice = LinExpr::var(x);
        twice.push(1, x);
        m.add_eq(twice, 8);
        m.minimize(LinExpr::var(x));
        let out = m.solve(params());
        assert_eq!(out.objective, Some(4));
    }

    #[test]
    fn zero_deadline_times_out() {
        let mut m = CpModel::new();
        let vars: Vec<_> = (0..12).map(|_| m.new_bool()).collect();
        let mut sum = LinExpr::new();
        for v in &vars {
            sum.push(1, *v);
        }
        m.add_eq(sum, 6);
        m.minimize(LinExpr::new());
        let out = m.solve(SolveParams {
            max_time: Duration::ZERO,
            workers: 1,
        });
        assert!(matches!(
            out.status,
            SolveStatus::Timeout | SolveStatus::Feasible | SolveStatus::Optimal
        ));
    }

    #[test]
    fn constant_objective_still_reports_optimal() {
        let mut m = CpModel::new();
        let a = m.new_bool();
        m.add_eq(LinExpr::var(a), 1);
        m.minimize(LinExpr::new());
        let out = m.solve(params());
        assert_eq!(out.status, SolveStatus::Optimal);
        assert_eq!(out.objective, Some(0));
    }
}
