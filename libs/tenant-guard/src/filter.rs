//! Typed filter expressions.
//!
//! Application code hands the data layer ORM-style `where` objects. They are
//! parsed once into [`Filter`] so the guard can inspect and rewrite them
//! structurally instead of probing untyped maps.
//!
//! | JSON shape | AST |
//! |------------|-----|
//! | `{ "a": 1, "b": 2 }` | `And([Field(a, Equals 1), Field(b, Equals 2)])` |
//! | `{ "AND": [..] }` / `{ "OR": [..] }` | `And(..)` / `Or(..)` |
//! | `{ "NOT": {..} }` | `Not(..)` |
//! | `{ "NOT": [a, b] }` | `Not(Or([a, b]))`, none of the clauses match |
//! | `{ "a": { "in": [..] } }` | `Field(a, In(..))` |
//! | `{ "a": { "contains": "x" } }` | `Field(a, Op("contains", "x"))` |
//! | `{ "tenant": { "slug": "x" } }` | `Field(tenant, Relation(..))` |

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const AND: &str = "AND";
pub const OR: &str = "OR";
pub const NOT: &str = "NOT";

/// Keys that mark an object as an operator condition rather than a nested
/// relation filter.
const OPERATORS: &[&str] = &[
    "equals",
    "in",
    "notIn",
    "set",
    "not",
    "lt",
    "lte",
    "gt",
    "gte",
    "contains",
    "startsWith",
    "endsWith",
    "mode",
    "search",
    "has",
    "hasEvery",
    "hasSome",
    "isEmpty",
    "isSet",
    "unset",
    "increment",
    "decrement",
    "multiply",
    "divide",
    "push",
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be an object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("`{key}` expects an object or an array of objects")]
    InvalidCombinator { key: &'static str },
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All children must match. `And(vec![])` matches everything.
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field(String, Condition),
}

/// Constraint applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    In(Vec<Value>),
    /// Value assignment (`{ set: .. }`), used by update-with-connect payloads.
    Set(Value),
    /// Operator the guard does not interpret, kept verbatim.
    Op(String, Value),
    /// Several operators on the same field.
    All(Vec<Condition>),
    /// Nested filter on a related model.
    Relation(Box<Filter>),
}

impl Filter {
    #[must_use]
    pub fn field(name: impl Into<String>, condition: Condition) -> Self {
        Self::Field(name.into(), condition)
    }

    /// `{ name: value }`
    #[must_use]
    pub fn equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field(name.into(), Condition::Equals(value.into()))
    }

    /// Matches every row.
    #[must_use]
    pub fn match_all() -> Self {
        Self::And(Vec::new())
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::And(children) if children.is_empty())
    }

    /// Parse an ORM-style filter object.
    ///
    /// # Errors
    /// Returns [`FilterError`] when the value (or a nested combinator) is not
    /// an object, or a combinator holds something other than objects.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let obj = value.as_object().ok_or(FilterError::NotAnObject {
            found: json_kind(value),
        })?;

        let mut clauses = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            let clause = match key.as_str() {
                AND => Self::And(clause_list(AND, val)?),
                OR => Self::Or(clause_list(OR, val)?),
                NOT => Self::Not(Box::new(negated(val)?)),
                _ => Self::Field(key.clone(), Condition::from_json(val)?),
            };
            clauses.push(clause);
        }
        Ok(conjunction(clauses))
    }

    /// Render back into the ORM-style JSON shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::And(children) => {
                if let Some(merged) = merge_disjoint(children) {
                    return Value::Object(merged);
                }
                single_key(AND, Value::Array(children.iter().map(Self::to_json).collect()))
            }
            Self::Or(children) => {
                single_key(OR, Value::Array(children.iter().map(Self::to_json).collect()))
            }
            Self::Not(inner) => match inner.as_ref() {
                Self::Or(children) => single_key(
                    NOT,
                    Value::Array(children.iter().map(Self::to_json).collect()),
                ),
                other => single_key(NOT, other.to_json()),
            },
            Self::Field(name, condition) => single_key(name, condition.to_json()),
        }
    }
}

impl Condition {
    /// Interpret the value a filter object holds for one field.
    ///
    /// # Errors
    /// Returns [`FilterError`] if the value is a relation filter that fails
    /// to parse.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let Value::Object(obj) = value else {
            return Ok(Self::Equals(value.clone()));
        };
        if !obj.keys().all(|k| OPERATORS.contains(&k.as_str())) {
            return Ok(Self::Relation(Box::new(Filter::from_json(value)?)));
        }

        let mut ops: Vec<Self> = obj
            .iter()
            .map(|(op, val)| match (op.as_str(), val) {
                ("equals", v) => Self::Equals(v.clone()),
                ("in", Value::Array(items)) => Self::In(items.clone()),
                ("in", v) => Self::In(vec![v.clone()]),
                ("set", v) => Self::Set(v.clone()),
                (other, v) => Self::Op(other.to_owned(), v.clone()),
            })
            .collect();

        Ok(match ops.len() {
            1 => ops.swap_remove(0),
            _ => Self::All(ops),
        })
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Equals(Value::Object(_))
            | Self::In(_)
            | Self::Set(_)
            | Self::Op(..)
            | Self::All(_) => {
                let mut ops = Map::new();
                self.write_operators(&mut ops);
                Value::Object(ops)
            }
            Self::Equals(value) => value.clone(),
            Self::Relation(filter) => filter.to_json(),
        }
    }

    fn write_operators(&self, ops: &mut Map<String, Value>) {
        match self {
            Self::Equals(value) => {
                ops.insert("equals".to_owned(), value.clone());
            }
            Self::In(values) => {
                ops.insert("in".to_owned(), Value::Array(values.clone()));
            }
            Self::Set(value) => {
                ops.insert("set".to_owned(), value.clone());
            }
            Self::Op(op, value) => {
                ops.insert(op.clone(), value.clone());
            }
            Self::All(conditions) => {
                for condition in conditions {
                    condition.write_operators(ops);
                }
            }
            Self::Relation(filter) => {
                if let Value::Object(nested) = filter.to_json() {
                    ops.extend(nested);
                }
            }
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

fn clause_list(key: &'static str, value: &Value) -> Result<Vec<Filter>, FilterError> {
    match value {
        Value::Object(_) => Ok(vec![Filter::from_json(value)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                if item.is_object() {
                    Filter::from_json(item)
                } else {
                    Err(FilterError::InvalidCombinator { key })
                }
            })
            .collect(),
        _ => Err(FilterError::InvalidCombinator { key }),
    }
}

/// `NOT` with an array excludes rows matching any of its clauses.
fn negated(value: &Value) -> Result<Filter, FilterError> {
    let clauses = clause_list(NOT, value)?;
    Ok(if value.is_array() {
        Filter::Or(clauses)
    } else {
        conjunction(clauses)
    })
}

/// A single clause stands for itself; anything else becomes an `And`.
fn conjunction(mut clauses: Vec<Filter>) -> Filter {
    if clauses.len() == 1 {
        clauses.swap_remove(0)
    } else {
        Filter::And(clauses)
    }
}

/// A conjunction whose children render to objects with disjoint keys is
/// written as one object, the way callers usually write it.
fn merge_disjoint(children: &[Filter]) -> Option<Map<String, Value>> {
    let mut merged = Map::new();
    for child in children {
        let Value::Object(rendered) = child.to_json() else {
            return None;
        };
        for (key, value) in rendered {
            if merged.insert(key, value).is_some() {
                return None;
            }
        }
    }
    Some(merged)
}

fn single_key(key: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_owned(), value);
    Value::Object(obj)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: &Value) -> Filter {
        Filter::from_json(value).unwrap()
    }

    #[test]
    fn test_plain_fields_form_conjunction() {
        let filter = parse(&json!({ "status": "PAID", "tenantId": "t-1" }));
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::equals("status", "PAID"),
                Filter::equals("tenantId", "t-1"),
            ])
        );
    }

    #[test]
    fn test_single_field_is_not_wrapped() {
        assert_eq!(parse(&json!({ "id": 7 })), Filter::equals("id", 7));
    }

    #[test]
    fn test_empty_object_matches_all() {
        let filter = parse(&json!({}));
        assert!(filter.is_match_all());
        assert_eq!(filter.to_json(), json!({}));
    }

    #[test]
    fn test_combinators_accept_object_or_array() {
        let filter = parse(&json!({
            "OR": [{ "a": 1 }, { "b": 2 }],
            "NOT": { "c": 3 },
            "AND": { "d": 4 },
        }));
        let Filter::And(clauses) = filter else {
            panic!("expected conjunction");
        };
        assert!(clauses.contains(&Filter::Or(vec![
            Filter::equals("a", 1),
            Filter::equals("b", 2)
        ])));
        assert!(clauses.contains(&Filter::Not(Box::new(Filter::equals("c", 3)))));
        assert!(clauses.contains(&Filter::And(vec![Filter::equals("d", 4)])));
    }

    #[test]
    fn test_not_array_excludes_every_clause() {
        let filter = parse(&json!({ "NOT": [{ "a": 1 }, { "b": 2 }] }));
        assert_eq!(
            filter,
            Filter::Not(Box::new(Filter::Or(vec![
                Filter::equals("a", 1),
                Filter::equals("b", 2)
            ])))
        );
    }

    #[test]
    fn test_not_array_keeps_list_form() {
        for original in [
            json!({ "NOT": [{ "status": "VOID" }, { "status": "DRAFT" }] }),
            json!({ "NOT": [{ "status": "VOID" }] }),
            json!({ "NOT": { "status": "VOID", "total": 0 } }),
        ] {
            let filter: Filter = serde_json::from_value(original.clone()).unwrap();
            assert_eq!(serde_json::to_value(&filter).unwrap(), original);
        }
    }

    #[test]
    fn test_operator_conditions() {
        assert_eq!(
            Condition::from_json(&json!({ "in": ["a", "b"] })).unwrap(),
            Condition::In(vec![json!("a"), json!("b")])
        );
        assert_eq!(
            Condition::from_json(&json!({ "equals": "a" })).unwrap(),
            Condition::Equals(json!("a"))
        );
        assert_eq!(
            Condition::from_json(&json!({ "set": "a" })).unwrap(),
            Condition::Set(json!("a"))
        );
        assert_eq!(
            Condition::from_json(&json!({ "contains": "@" })).unwrap(),
            Condition::Op("contains".to_owned(), json!("@"))
        );
        assert_eq!(
            Condition::from_json(&json!({ "gte": 1, "lt": 5 })).unwrap(),
            Condition::All(vec![
                Condition::Op("gte".to_owned(), json!(1)),
                Condition::Op("lt".to_owned(), json!(5)),
            ])
        );
    }

    #[test]
    fn test_non_operator_object_is_relation() {
        let cond = Condition::from_json(&json!({ "tenantId": "t-1" })).unwrap();
        assert_eq!(
            cond,
            Condition::Relation(Box::new(Filter::equals("tenantId", "t-1")))
        );
    }

    #[test]
    fn test_rejects_non_objects() {
        assert_eq!(
            Filter::from_json(&json!("tenant")).unwrap_err(),
            FilterError::NotAnObject { found: "string" }
        );
        assert_eq!(
            Filter::from_json(&json!({ "OR": 5 })).unwrap_err(),
            FilterError::InvalidCombinator { key: OR }
        );
        assert_eq!(
            Filter::from_json(&json!({ "AND": [{ "a": 1 }, "b"] })).unwrap_err(),
            FilterError::InvalidCombinator { key: AND }
        );
    }

    #[test]
    fn test_scoped_filter_renders_and_array() {
        let scoped = Filter::And(vec![
            Filter::equals("role", "ADMIN"),
            Filter::equals("role", "OWNER"),
        ]);
        assert_eq!(
            scoped.to_json(),
            json!({ "AND": [{ "role": "ADMIN" }, { "role": "OWNER" }] })
        );
    }

    #[test]
    fn test_json_shape_survives_serde() {
        let original = json!({
            "email": { "contains": "@" },
            "OR": [{ "tenantId": { "in": ["a", "b"] } }, { "tenant": { "slug": "acme" } }],
        });
        let filter: Filter = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&filter).unwrap(), original);
    }
}
