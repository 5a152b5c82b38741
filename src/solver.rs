use crate::model_builder::{DispatchModel, VariableGrid};
use good_lp::{Expression, ResolutionError, Solution, SolverModel};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-solve budgets. Both are forwarded to CBC when the `cbc` feature is
/// active; the pure-Rust default backend solves to optimality and ignores
/// them.
#[derive(Debug, Clone, Default)]
pub struct SolveSettings {
    pub time_limit_secs: Option<u64>,
    pub mip_gap: Option<f64>,
}

/// Outcome classification for one horizon's solve. Callers branch on this
/// instead of catching solver errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Solved to optimality, or to within the configured gap tolerance.
    Optimal,
    Infeasible,
    Unbounded,
    /// The time budget ran out before a usable solution was proven.
    TimedOut,
    Error(String),
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::Unbounded => write!(f, "unbounded"),
            SolveStatus::TimedOut => write!(f, "timed out"),
            SolveStatus::Error(message) => write!(f, "solver error: {}", message),
        }
    }
}

/// Solved variable values read back out of the model.
#[derive(Debug, Clone)]
pub struct SolvedAssignment {
    /// `state[t][p]` indicator values in `ALL_PRODUCTS` ordering.
    pub state: Vec<Vec<f64>>,
    pub soc: Vec<f64>,
    /// (product index, magnitude) pairs, mirroring the grid's flow layout.
    pub flow: Vec<Vec<(usize, f64)>>,
    pub objective: f64,
}

pub struct HorizonSolve {
    pub status: SolveStatus,
    pub assignment: Option<SolvedAssignment>,
}

/// Hands the assembled model to the backend and maps the result onto an
/// explicit status. Never panics on solver failure.
pub fn solve(model: DispatchModel, settings: &SolveSettings) -> HorizonSolve {
    match attempt(model, settings) {
        Ok(assignment) => HorizonSolve {
            status: SolveStatus::Optimal,
            assignment: Some(assignment),
        },
        Err(error) => {
            let status = classify(error);
            warn!("solve failed: {}", status);
            HorizonSolve {
                status,
                assignment: None,
            }
        }
    }
}

fn classify(error: ResolutionError) -> SolveStatus {
    match error {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        ResolutionError::Unbounded => SolveStatus::Unbounded,
        other => {
            let message = other.to_string();
            // CBC reports a time-limit stop as a generic "Stopped" status.
            if message.contains("Stopped") {
                SolveStatus::TimedOut
            } else {
                SolveStatus::Error(message)
            }
        }
    }
}

#[cfg(not(feature = "cbc"))]
fn attempt(
    model: DispatchModel,
    settings: &SolveSettings,
) -> Result<SolvedAssignment, ResolutionError> {
    use good_lp::default_solver;

    if settings.time_limit_secs.is_some() || settings.mip_gap.is_some() {
        debug!("time/gap budgets are ignored by the pure-Rust backend");
    }

    let DispatchModel {
        variables,
        objective,
        constraints,
        grid,
        ..
    } = model;

    let mut problem = variables.maximise(objective.clone()).using(default_solver);
    for constraint in constraints {
        problem = problem.with(constraint);
    }
    let solution = problem.solve()?;
    Ok(read_assignment(&grid, &objective, &solution))
}

#[cfg(feature = "cbc")]
fn attempt(
    model: DispatchModel,
    settings: &SolveSettings,
) -> Result<SolvedAssignment, ResolutionError> {
    use good_lp::coin_cbc;

    let DispatchModel {
        variables,
        objective,
        constraints,
        grid,
        ..
    } = model;

    let mut problem = variables.maximise(objective.clone()).using(coin_cbc);
    for constraint in constraints {
        problem = problem.with(constraint);
    }
    if let Some(secs) = settings.time_limit_secs {
        debug!("cbc time budget: {}s", secs);
        problem.set_parameter("sec", &secs.to_string());
    }
    if let Some(gap) = settings.mip_gap {
        debug!("cbc relative gap: {}", gap);
        problem.set_parameter("ratio", &gap.to_string());
    }
    let solution = problem.solve()?;
    Ok(read_assignment(&grid, &objective, &solution))
}

fn read_assignment<S: Solution>(
    grid: &VariableGrid,
    objective: &Expression,
    solution: &S,
) -> SolvedAssignment {
    let state = grid
        .state
        .iter()
        .map(|row| row.iter().map(|&v| solution.value(v)).collect())
        .collect();
    let soc = grid.soc.iter().map(|&v| solution.value(v)).collect();
    let flow = grid
        .flow
        .iter()
        .map(|row| row.iter().map(|&(p, v)| (p, solution.value(v))).collect())
        .collect();
    SolvedAssignment {
        state,
        soc,
        flow,
        objective: objective.eval_with(solution),
    }
}
