//! Schema-driven plan diffing.
//!
//! Every resource plans the same way, so the provider computes plans from the
//! resource schema instead of asking each resource.

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

/// Plan the change from `prior` to `proposed`.
///
/// - No prior state: a create. Defaults are applied and every set attribute is
///   reported as added.
/// - Null, `""` and `{}` are all unset. State stores empty strings and maps
///   as null, so configuring them must not show a diff.
/// - Null proposed state: a destroy. Every prior attribute is reported as
///   removed and the planned state is null.
/// - Otherwise an update. Computed-only attributes keep their prior values
///   unless a `force_new` attribute changed, in which case they are dropped and
///   the plan requires replacement.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.and_then(Value::as_object);
    let proposed = proposed.as_object();

    match (prior, proposed) {
        (None, None) => PlanResult::no_change(Value::Null),
        (Some(prior), None) => plan_destroy(prior),
        (None, Some(proposed)) => plan_create(schema, proposed),
        (Some(prior), Some(proposed)) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: &Map<String, Value>) -> PlanResult {
    let mut planned = proposed.clone();
    schema.apply_defaults(&mut planned);

    let changes = planned
        .iter()
        .filter(|(_, value)| !is_unset(value))
        .map(|(name, value)| AttributeChange::added(name.clone(), value.clone()))
        .collect();

    PlanResult::with_changes(Value::Object(planned), changes, false)
}

fn plan_destroy(prior: &Map<String, Value>) -> PlanResult {
    let changes = prior
        .iter()
        .filter(|(_, value)| !is_unset(value))
        .map(|(name, value)| AttributeChange::removed(name.clone(), value.clone()))
        .collect();

    PlanResult::with_changes(Value::Null, changes, false)
}

fn plan_update(
    schema: &Schema,
    prior: &Map<String, Value>,
    proposed: &Map<String, Value>,
) -> PlanResult {
    let mut planned = proposed.clone();
    schema.apply_defaults(&mut planned);

    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let before = non_null(prior.get(name));
        let after = non_null(planned.get(name));
        if before != after {
            requires_replace |= attr.force_new;
            changes.push(AttributeChange::new(name.clone(), before, after));
        }
    }

    for (name, attr) in &schema.attributes {
        if !attr.flags.is_computed_only() {
            continue;
        }
        match prior.get(name) {
            Some(value) if !requires_replace && !value.is_null() => {
                planned.insert(name.clone(), value.clone());
            },
            _ => {
                planned.remove(name);
            },
        }
    }

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !is_unset(v)).cloned()
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
