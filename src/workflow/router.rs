use super::required::RequiredSet;
use super::state::WorkflowState;
use super::step::StepId;

/// Routing decision after each dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Step(StepId),
    Aggregate,
}

/// First required step not yet visited, in canonical order; `Aggregate` once
/// every required step ran (or none was required).
pub fn next_step(state: &WorkflowState) -> Route {
    next_unvisited(state.required(), |id| state.is_visited(id))
}

pub fn next_unvisited(required: &RequiredSet, is_visited: impl Fn(&StepId) -> bool) -> Route {
    required
        .iter()
        .find(|id| !is_visited(id))
        .cloned()
        .map(Route::Step)
        .unwrap_or(Route::Aggregate)
}
