//! Condition tree evaluation against record field values.
//!
//! Evaluation is a pure function of its inputs. Leaves that reference a
//! field the record does not carry evaluate to `false`; nothing here
//! returns an error, so schema drift only makes rules stop matching.

mod operators;

use recordhook_core::FieldMap;

use crate::schema::{Condition, GroupOp};

pub(crate) use operators::as_number;

/// Evaluate `condition` against a record.
///
/// `previous` is the record state before an update; the `changed`
/// operator is false without it.
pub fn evaluate(condition: &Condition, fields: &FieldMap, previous: Option<&FieldMap>) -> bool {
    match condition {
        Condition::Leaf {
            field,
            operator,
            value,
        } => operators::evaluate_leaf(field, *operator, value.as_ref(), fields, previous),
        Condition::Group { op, children } => match op {
            // Both are vacuously true for an empty group.
            GroupOp::And => children.iter().all(|c| evaluate(c, fields, previous)),
            GroupOp::Or => children.is_empty() || children.iter().any(|c| evaluate(c, fields, previous)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operator;
    use recordhook_core::fields_from_json;
    use serde_json::json;

    fn record(v: serde_json::Value) -> FieldMap {
        fields_from_json(v)
    }

    fn truthy() -> Condition {
        Condition::leaf("flag", Operator::Equals, Some(json!(true)))
    }

    fn falsy() -> Condition {
        Condition::leaf("flag", Operator::Equals, Some(json!(false)))
    }

    #[test]
    fn empty_tree_matches_anything() {
        let always = Condition::always();
        assert!(evaluate(&always, &record(json!({})), None));
        assert!(evaluate(&always, &record(json!({"x": 1})), Some(&record(json!({"x": 2})))));
        assert!(evaluate(&Condition::any(vec![]), &record(json!({})), None));
    }

    #[test]
    fn and_or_semantics() {
        let r = record(json!({"flag": true}));
        assert!(!evaluate(&Condition::all(vec![truthy(), falsy()]), &r, None));
        assert!(evaluate(&Condition::any(vec![falsy(), truthy()]), &r, None));
        assert!(!evaluate(&Condition::any(vec![falsy(), falsy()]), &r, None));
        assert!(evaluate(&Condition::all(vec![truthy(), truthy()]), &r, None));
    }

    #[test]
    fn nesting_composes() {
        let r = record(json!({"flag": true}));
        // (T AND (F OR T)) == ((T AND F) OR T) for these inputs.
        let left = Condition::all(vec![truthy(), Condition::any(vec![falsy(), truthy()])]);
        let right = Condition::any(vec![Condition::all(vec![truthy(), falsy()]), truthy()]);
        assert!(evaluate(&left, &r, None));
        assert!(evaluate(&right, &r, None));
        // Associativity of AND: (a AND b) AND c == a AND (b AND c).
        let a = Condition::all(vec![Condition::all(vec![truthy(), truthy()]), falsy()]);
        let b = Condition::all(vec![truthy(), Condition::all(vec![truthy(), falsy()])]);
        assert_eq!(evaluate(&a, &r, None), evaluate(&b, &r, None));
    }

    #[test]
    fn absent_field_never_matches() {
        let r = record(json!({"other": "x"}));
        for op in Operator::ALL {
            let leaf = Condition::leaf("missing", op, Some(json!("x")));
            assert!(!evaluate(&leaf, &r, Some(&r)), "operator {op} matched an absent field");
        }
    }

    #[test]
    fn changed_requires_previous_state() {
        let now = record(json!({"status": "open"}));
        let leaf = Condition::leaf("status", Operator::Changed, None);
        assert!(!evaluate(&leaf, &now, None));
        assert!(!evaluate(&leaf, &now, Some(&record(json!({"status": "open"})))));
        assert!(evaluate(&leaf, &now, Some(&record(json!({"status": "new"})))));
        // Field added by the update counts as a change.
        assert!(evaluate(&leaf, &now, Some(&record(json!({})))));
    }

    #[test]
    fn end_to_end_priority_rule() {
        let rule = Condition::leaf("priority", Operator::Equals, Some(json!("high")));
        assert!(evaluate(&rule, &record(json!({"priority": "high"})), None));
        assert!(!evaluate(&rule, &record(json!({"priority": "low"})), None));
    }

    #[test]
    fn evaluation_is_deterministic_across_threads() {
        let cond = std::sync::Arc::new(Condition::all(vec![
            Condition::leaf("amount", Operator::GreaterThan, Some(json!(10))),
            Condition::leaf("tags", Operator::Contains, Some(json!("vip"))),
        ]));
        let r = std::sync::Arc::new(record(json!({"amount": "12.5", "tags": ["vip", "new"]})));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cond = cond.clone();
                let r = r.clone();
                std::thread::spawn(move || evaluate(&cond, &r, None))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
