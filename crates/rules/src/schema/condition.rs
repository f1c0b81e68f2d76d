//! Condition tree types: leaf clauses combined by AND/OR groups.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum nesting depth accepted for a condition tree.
pub const MAX_DEPTH: usize = 16;

/// Boolean expression over record field values.
///
/// A group with no children matches every record ("always notify").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare one field against a literal.
    Leaf {
        field: String,
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// Combine child conditions.
    Group {
        op: GroupOp,
        #[serde(default)]
        children: Vec<Condition>,
    },
}

/// Logical operators for condition groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupOp {
    And,
    Or,
}

/// Leaf clause operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    IsEmpty,
    IsNotEmpty,
    /// Update-only: previous value differs from the new one.
    Changed,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Contains,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
        Operator::Changed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::Contains => "contains",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::Changed => "changed",
        }
    }

    /// Whether the clause needs a comparison value.
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::GreaterThan
                | Operator::LessThan
                | Operator::Contains
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Operator::GreaterThan | Operator::LessThan)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural problems in a condition tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("malformed condition: {0}")]
    Malformed(String),

    #[error("{path}: field name must not be empty")]
    EmptyField { path: String },

    #[error("{path}: operator '{operator}' requires a comparison value")]
    MissingValue { path: String, operator: Operator },

    #[error("{path}: comparison value must be a string, number or boolean")]
    NonScalarValue { path: String },

    #[error("{path}: operator '{operator}' requires a numeric comparison value")]
    NonNumericValue { path: String, operator: Operator },

    #[error("{path}: condition nested deeper than {max} levels")]
    TooDeep { path: String, max: usize },
}

impl ConditionError {
    /// Location of the offending node, e.g. `condition.children[1]`.
    pub fn path(&self) -> &str {
        match self {
            ConditionError::Malformed(_) => "condition",
            ConditionError::EmptyField { path }
            | ConditionError::MissingValue { path, .. }
            | ConditionError::NonScalarValue { path }
            | ConditionError::NonNumericValue { path, .. }
            | ConditionError::TooDeep { path, .. } => path,
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::always()
    }
}

impl Condition {
    /// The empty tree: matches every record.
    pub fn always() -> Self {
        Condition::Group {
            op: GroupOp::And,
            children: Vec::new(),
        }
    }

    pub fn leaf(field: impl Into<String>, operator: Operator, value: Option<Value>) -> Self {
        Condition::Leaf {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn all(children: Vec<Condition>) -> Self {
        Condition::Group {
            op: GroupOp::And,
            children,
        }
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Condition::Group {
            op: GroupOp::Or,
            children,
        }
    }

    /// Parse a persisted condition and check its structure.
    pub fn compile(raw: &Value) -> Result<Self, ConditionError> {
        let condition: Condition = serde_json::from_value(raw.clone())
            .map_err(|e| ConditionError::Malformed(e.to_string()))?;
        let problems = condition.structural_errors();
        match problems.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(condition),
        }
    }

    pub fn to_value(&self) -> Value {
        // Serializing this enum cannot fail: all keys are strings.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Every structural problem in the tree, in depth-first order.
    pub fn structural_errors(&self) -> Vec<ConditionError> {
        let mut errors = Vec::new();
        collect_errors(self, "condition", 0, &mut errors);
        errors
    }

    /// `(path, field, operator)` for every leaf in the tree.
    pub fn leaves(&self) -> Vec<(String, &str, Operator)> {
        let mut out = Vec::new();
        collect_leaves(self, "condition".to_string(), &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Condition::Group { children, .. } if children.is_empty())
    }
}

fn collect_errors(node: &Condition, path: &str, depth: usize, errors: &mut Vec<ConditionError>) {
    if depth >= MAX_DEPTH {
        errors.push(ConditionError::TooDeep {
            path: path.to_string(),
            max: MAX_DEPTH,
        });
        return;
    }
    match node {
        Condition::Leaf {
            field,
            operator,
            value,
        } => {
            if field.trim().is_empty() {
                errors.push(ConditionError::EmptyField {
                    path: path.to_string(),
                });
            }
            if !operator.requires_value() {
                return;
            }
            match value {
                None => errors.push(ConditionError::MissingValue {
                    path: path.to_string(),
                    operator: *operator,
                }),
                Some(Value::Array(_)) | Some(Value::Object(_)) | Some(Value::Null) => {
                    errors.push(ConditionError::NonScalarValue {
                        path: path.to_string(),
                    })
                }
                Some(v) if operator.is_numeric() && crate::evaluator::as_number(v).is_none() => {
                    errors.push(ConditionError::NonNumericValue {
                        path: path.to_string(),
                        operator: *operator,
                    })
                }
                Some(_) => {}
            }
        }
        Condition::Group { children, .. } => {
            for (i, child) in children.iter().enumerate() {
                collect_errors(child, &format!("{path}.children[{i}]"), depth + 1, errors);
            }
        }
    }
}

fn collect_leaves<'a>(node: &'a Condition, path: String, out: &mut Vec<(String, &'a str, Operator)>) {
    match node {
        Condition::Leaf {
            field, operator, ..
        } => out.push((path, field.as_str(), *operator)),
        Condition::Group { children, .. } => {
            for (i, child) in children.iter().enumerate() {
                collect_leaves(child, format!("{path}.children[{i}]"), out);
            }
        }
    }
}
