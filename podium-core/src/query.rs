use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::driver::WireRecord;

/// Bind parameters passed along with an AQL fragment.
pub type Params = Map<String, Value>;

/// Variable name a caller's AQL fragment uses for the current document.
pub const DEFAULT_PLACEHOLDER: &str = "doc";

const CONDITION_PARAM_PREFIX: &str = "podium_c";

/// A structured filter condition built by the mapper itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. } | Condition::Ne { field, .. } | Condition::In { field, .. } => {
                field
            }
        }
    }

    /// Evaluates the condition against a record. A missing attribute
    /// compares as `null`.
    pub fn matches(&self, record: &WireRecord) -> bool {
        let actual = record.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq { value, .. } => actual == value,
            Condition::Ne { value, .. } => actual != value,
            Condition::In { values, .. } => values.contains(actual),
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            Condition::Eq { .. } => "==",
            Condition::Ne { .. } => "!=",
            Condition::In { .. } => "IN",
        }
    }

    fn bind_value(&self) -> Value {
        match self {
            Condition::Eq { value, .. } | Condition::Ne { value, .. } => value.clone(),
            Condition::In { values, .. } => Value::Array(values.clone()),
        }
    }
}

/// Filter options supplied by a caller: an optional AQL fragment with its
/// bind parameters and placeholder, structured conditions and a limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    aql: Option<String>,
    params: Params,
    placeholder: String,
    conditions: Vec<Condition>,
    limit: Option<usize>,
}

impl Criteria {
    pub fn new() -> Self {
        Criteria {
            aql: None,
            params: Params::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            conditions: Vec::new(),
            limit: None,
        }
    }

    pub fn aql(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        self.aql = if fragment.trim().is_empty() {
            None
        } else {
            Some(fragment)
        };
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn aql_fragment(&self) -> Option<&str> {
        self.aql.as_deref()
    }

    pub fn bind_params(&self) -> &Params {
        &self.params
    }

    pub fn placeholder_name(&self) -> &str {
        &self.placeholder
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }
}

impl Default for Criteria {
    fn default() -> Self {
        Self::new()
    }
}

/// A filtered read against one collection, as handed to a `QueryEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub criteria: Criteria,
}

impl Query {
    pub fn new(collection: impl Into<String>, criteria: Criteria) -> Self {
        Query {
            collection: collection.into(),
            criteria,
        }
    }

    /// Checks the structured conditions only. The AQL fragment is opaque.
    pub fn matches(&self, record: &WireRecord) -> bool {
        self.criteria.conditions.iter().all(|c| c.matches(record))
    }

    /// Renders the structured conditions as `FILTER` lines, followed by the
    /// caller's fragment.
    pub fn filter_clause(&self) -> String {
        let placeholder = &self.criteria.placeholder;
        let mut clause = String::new();
        for (index, condition) in self.criteria.conditions.iter().enumerate() {
            let _ = writeln!(
                clause,
                "FILTER {placeholder}.`{}` {} @{CONDITION_PARAM_PREFIX}{index}",
                condition.field(),
                condition.operator(),
            );
        }
        if let Some(fragment) = &self.criteria.aql {
            clause.push_str(fragment);
        }
        clause.trim_end().to_string()
    }

    /// Caller parameters merged with the parameters of the structured
    /// conditions.
    pub fn bind_vars(&self) -> Params {
        let mut vars = self.criteria.params.clone();
        for (index, condition) in self.criteria.conditions.iter().enumerate() {
            vars.insert(format!("{CONDITION_PARAM_PREFIX}{index}"), condition.bind_value());
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> WireRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn conditions_match_records() {
        let doc = record(json!({"name": "A", "age": 3}));
        assert!(Condition::Eq { field: "name".into(), value: json!("A") }.matches(&doc));
        assert!(Condition::Ne { field: "age".into(), value: json!(4) }.matches(&doc));
        assert!(Condition::In { field: "age".into(), values: vec![json!(1), json!(3)] }.matches(&doc));
        assert!(Condition::Eq { field: "missing".into(), value: Value::Null }.matches(&doc));
        assert!(!Condition::Eq { field: "name".into(), value: json!("B") }.matches(&doc));
    }

    #[test]
    fn blank_fragment_is_dropped() {
        let criteria = Criteria::new().aql("   ");
        assert_eq!(criteria.aql_fragment(), None);
    }

    #[test]
    fn filter_clause_and_bind_vars() {
        let query = Query::new(
            "edges",
            Criteria::new()
                .eq("_to", "v/1")
                .aql("FILTER e.weight > @min")
                .param("min", 2)
                .placeholder("e"),
        );
        assert_eq!(
            query.filter_clause(),
            "FILTER e.`_to` == @podium_c0\nFILTER e.weight > @min"
        );
        let vars = query.bind_vars();
        assert_eq!(vars.get("min"), Some(&json!(2)));
        assert_eq!(vars.get("podium_c0"), Some(&json!("v/1")));
    }

    #[test]
    fn query_matches_all_conditions() {
        let query = Query::new("users", Criteria::new().eq("a", 1).ne("b", 2));
        assert!(query.matches(&record(json!({"a": 1, "b": 3}))));
        assert!(!query.matches(&record(json!({"a": 1, "b": 2}))));
    }
}
