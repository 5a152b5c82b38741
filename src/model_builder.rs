use crate::models::{
    BatteryConfig, Formulation, HorizonData, Market, Mode, ALL_PRODUCTS, IDLE_INDEX, N_PRODUCTS,
};
use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use std::collections::BTreeMap;

/// Dense variable arena for one horizon: binary product indicators per slot,
/// the continuous SoC trajectory, and (in the decoupled formulation) the
/// charge-amount magnitudes for the energy products.
pub struct VariableGrid {
    /// `state[t][p]` for p in `ALL_PRODUCTS` ordering.
    pub state: Vec<Vec<Variable>>,
    pub soc: Vec<Variable>,
    /// `flow[t]` holds (product index, magnitude variable) pairs for the
    /// charge/discharge products only; empty in the committed formulation.
    pub flow: Vec<Vec<(usize, Variable)>>,
}

impl VariableGrid {
    pub fn flow_var(&self, t: usize, product: usize) -> Option<Variable> {
        self.flow
            .get(t)?
            .iter()
            .find(|(p, _)| *p == product)
            .map(|(_, v)| *v)
    }
}

/// A complete model instance for one horizon, ready to hand to the solver.
pub struct DispatchModel {
    pub variables: ProblemVariables,
    pub objective: Expression,
    pub constraints: Vec<Constraint>,
    pub grid: VariableGrid,
    pub formulation: Formulation,
}

/// Whether a product's charge quantity is decoupled from its indicator.
/// Only the pure energy products are; reserves and regulation always move
/// their full throughput when committed.
fn carries_flow(product_index: usize) -> bool {
    matches!(ALL_PRODUCTS[product_index].mode, Mode::Charge | Mode::Discharge)
}

/// Builds the full MILP for one horizon.
///
/// `initial_soc` is the boundary value carried in from the previous horizon
/// (or the configured starting charge for the first one).
pub fn build_model(
    horizon: &HorizonData,
    battery: &BatteryConfig,
    formulation: Formulation,
    initial_soc: f64,
) -> DispatchModel {
    let t_len = horizon.len();
    let deltas: Vec<f64> = ALL_PRODUCTS.iter().map(|p| p.energy_delta(battery)).collect();

    let mut variables = ProblemVariables::new();
    let state: Vec<Vec<Variable>> = (0..t_len)
        .map(|_| (0..N_PRODUCTS).map(|_| variables.add(variable().binary())).collect())
        .collect();
    // SoC is bounded by the envelope constraints, not variable bounds, so
    // configurations outside [0, 1] are honored rather than clipped.
    let soc = variables.add_vector(variable(), t_len);
    let flow: Vec<Vec<(usize, Variable)>> = match formulation {
        Formulation::Committed => vec![Vec::new(); t_len],
        Formulation::DecoupledFlow => (0..t_len)
            .map(|_| {
                (0..N_PRODUCTS)
                    .filter(|&p| carries_flow(p))
                    .map(|p| (p, variables.add(variable().min(0.0))))
                    .collect()
            })
            .collect(),
    };
    let grid = VariableGrid { state, soc, flow };

    let objective = build_objective(&grid, horizon);

    let mut constraints = Vec::new();
    constraints.extend(single_assignment(&grid, t_len));
    constraints.extend(flow_gating(&grid, &deltas));
    constraints.extend(soc_dynamics(&grid, horizon, &deltas, battery, initial_soc));
    constraints.extend(daily_cycle_limits(&grid, horizon, &deltas));
    constraints.extend(hourly_commitment(&grid, horizon));
    constraints.extend(chunk_consistency(&mut variables, &grid, horizon));

    DispatchModel {
        variables,
        objective,
        constraints,
        grid,
        formulation,
    }
}

/// Revenue to maximize: price times the indicator, except that decoupled
/// charge/discharge products are paid on the quantity actually moved.
/// Zero-price cells contribute no term.
fn build_objective(grid: &VariableGrid, horizon: &HorizonData) -> Expression {
    let mut objective = Expression::default();
    for t in 0..horizon.len() {
        for p in 0..N_PRODUCTS {
            let price = horizon.prices[t][p];
            if price == 0.0 {
                continue;
            }
            match grid.flow_var(t, p) {
                Some(flow) => objective += price * flow,
                None => objective += price * grid.state[t][p],
            }
        }
    }
    objective
}

/// The battery occupies exactly one product per slot, across both markets.
fn single_assignment(grid: &VariableGrid, t_len: usize) -> Vec<Constraint> {
    (0..t_len)
        .map(|t| {
            let total: Expression = grid.state[t].iter().map(|&v| Expression::from(v)).sum();
            constraint!(total == 1.0)
        })
        .collect()
}

/// Charge-amount gating: a product moves energy only while selected, and
/// never more than its per-slot maximum.
fn flow_gating(grid: &VariableGrid, deltas: &[f64]) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    for (t, slot_flows) in grid.flow.iter().enumerate() {
        for &(p, flow) in slot_flows {
            let max_magnitude = deltas[p].abs();
            constraints.push(constraint!(flow <= max_magnitude * grid.state[t][p]));
        }
    }
    constraints
}

/// Net signed SoC change at slot `t`, over every product's contribution.
fn net_delta_expr(grid: &VariableGrid, deltas: &[f64], t: usize) -> Expression {
    let mut net = Expression::default();
    for p in 0..N_PRODUCTS {
        match grid.flow_var(t, p) {
            Some(flow) => net += ALL_PRODUCTS[p].mode.polarity() * flow,
            None => {
                if deltas[p] != 0.0 {
                    net += deltas[p] * grid.state[t][p];
                }
            }
        }
    }
    net
}

/// Initial boundary, the recursion tying consecutive slots together, and the
/// operational SoC envelope. The envelope is expressed as constraints so an
/// inconsistent configuration surfaces as an infeasible status.
fn soc_dynamics(
    grid: &VariableGrid,
    horizon: &HorizonData,
    deltas: &[f64],
    battery: &BatteryConfig,
    initial_soc: f64,
) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    for t in 0..horizon.len() {
        let net = net_delta_expr(grid, deltas, t);
        if t == 0 {
            constraints.push(constraint!(grid.soc[0] == net + initial_soc));
        } else {
            constraints.push(constraint!(grid.soc[t] == grid.soc[t - 1] + net));
        }
        constraints.push(constraint!(grid.soc[t] >= battery.soc_min));
        constraints.push(constraint!(grid.soc[t] <= battery.soc_cap));
    }
    constraints
}

/// Per calendar day: at most one full cycle of charging throughput and one
/// full cycle of discharging throughput.
fn daily_cycle_limits(
    grid: &VariableGrid,
    horizon: &HorizonData,
    deltas: &[f64],
) -> Vec<Constraint> {
    let mut by_day: BTreeMap<chrono::NaiveDate, Vec<usize>> = BTreeMap::new();
    for (t, slot) in horizon.slots.iter().enumerate() {
        by_day.entry(slot.date).or_default().push(t);
    }

    let mut constraints = Vec::new();
    for slots in by_day.values() {
        let mut charging = Expression::default();
        let mut discharging = Expression::default();
        for &t in slots {
            for p in 0..N_PRODUCTS {
                let mode = ALL_PRODUCTS[p].mode;
                let term = match grid.flow_var(t, p) {
                    Some(flow) => Expression::from(mode.polarity() * flow),
                    None => Expression::from(deltas[p] * grid.state[t][p]),
                };
                if mode.is_charging() {
                    charging += term;
                } else if mode.is_discharging() {
                    discharging += term;
                }
            }
        }
        constraints.push(constraint!(charging <= 1.0));
        constraints.push(constraint!(discharging >= -1.0));
    }
    constraints
}

/// Day-ahead participation binds the whole clock hour: within any hour that
/// spans several base slots, every day-ahead indicator must agree with the
/// hour's first slot.
fn hourly_commitment(grid: &VariableGrid, horizon: &HorizonData) -> Vec<Constraint> {
    let mut by_hour: BTreeMap<(chrono::NaiveDate, u32), Vec<usize>> = BTreeMap::new();
    for (t, slot) in horizon.slots.iter().enumerate() {
        by_hour.entry((slot.date, slot.hour)).or_default().push(t);
    }

    let mut constraints = Vec::new();
    for slots in by_hour.values() {
        if slots.len() < 2 {
            continue;
        }
        let first = slots[0];
        for &t in &slots[1..] {
            for p in 0..N_PRODUCTS {
                if ALL_PRODUCTS[p].market == Market::DayAhead {
                    constraints.push(constraint!(grid.state[t][p] == grid.state[first][p]));
                }
            }
        }
    }
    constraints
}

/// Coarse-interval consistency: when slots are grouped into chunks, a chunk
/// either ignores a non-idle product entirely or commits to it, with every
/// slot serving that product or falling back to idle. One auxiliary binary
/// per (chunk, product) gates both directions: a slot can select the product
/// only in a committed chunk, and a committed chunk leaves no slot on any
/// other non-idle product.
fn chunk_consistency(
    variables: &mut ProblemVariables,
    grid: &VariableGrid,
    horizon: &HorizonData,
) -> Vec<Constraint> {
    let Some(ids) = &horizon.chunks else {
        return Vec::new();
    };

    let mut by_chunk: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (t, &id) in ids.iter().enumerate() {
        by_chunk.entry(id).or_default().push(t);
    }

    let mut constraints = Vec::new();
    for slots in by_chunk.values() {
        if slots.len() < 2 {
            continue;
        }
        for p in 0..N_PRODUCTS {
            if p == IDLE_INDEX {
                continue;
            }
            let committed = variables.add(variable().binary());
            for &t in slots {
                constraints.push(constraint!(grid.state[t][p] <= committed));
                constraints.push(constraint!(
                    grid.state[t][p] + grid.state[t][IDLE_INDEX] >= committed
                ));
            }
        }
    }
    constraints
}
