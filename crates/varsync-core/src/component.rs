use serde_json::Value;

/// A UI-side registrant bound to one interpreter value.
///
/// Multiple components may share one `variable_name`; each keeps its own
/// unique `variable_identifier`. The engine holds a shared reference keyed
/// by identifier and delivers updates without holding any internal lock, so
/// implementations are free to re-enter the engine (e.g. push) from
/// `update_view`.
pub trait VariableComponent: Send + Sync {
    /// Unique UI-facing key for this component.
    fn variable_identifier(&self) -> &str;

    /// Interpreter-side name under whose expression the value is evaluated.
    fn variable_name(&self) -> &str;

    /// Expression string evaluated to produce this component's value.
    fn evaluate_expression(&self) -> String;

    /// Receives a structurally independent copy of the new value whenever
    /// the diff step detects a change for this identifier.
    fn update_view(&self, value: Value);
}
