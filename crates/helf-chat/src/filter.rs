//! Row predicates shared by history queries and live feeds.
//!
//! A [`Filter`] is evaluated locally against JSON rows and can be rendered as
//! PostgREST query parameters, so the store query and the client-side check
//! are always the same predicate.

use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`
    Eq(String, String),
    /// `column <> value`
    Neq(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Neq(column.into(), value.into())
    }

    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Evaluate against a JSON object row. Missing or non-string columns never
    /// equal a value.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(column, value) => column_str(row, column) == Some(value.as_str()),
            Filter::Neq(column, value) => column_str(row, column) != Some(value.as_str()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }

    /// Render as PostgREST query parameters (`col=eq.v`, `or=(...)`).
    pub fn to_postgrest(&self) -> Vec<(String, String)> {
        match self {
            Filter::Eq(column, value) => vec![(column.clone(), format!("eq.{}", quote(value)))],
            Filter::Neq(column, value) => {
                vec![(column.clone(), format!("neq.{}", quote(value)))]
            }
            Filter::And(filters) => filters.iter().flat_map(Filter::to_postgrest).collect(),
            Filter::Or(filters) => vec![("or".to_string(), format!("({})", logic_list(filters)))],
        }
    }

    /// Nested logic-tree syntax used inside `or=(...)`.
    fn to_logic_tree(&self) -> String {
        match self {
            Filter::Eq(column, value) => format!("{column}.eq.{}", quote(value)),
            Filter::Neq(column, value) => format!("{column}.neq.{}", quote(value)),
            Filter::And(filters) => format!("and({})", logic_list(filters)),
            Filter::Or(filters) => format!("or({})", logic_list(filters)),
        }
    }
}

fn logic_list(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::to_logic_tree)
        .collect::<Vec<_>>()
        .join(",")
}

fn column_str<'a>(row: &'a Value, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

/// PostgREST reserves `,.:()` inside filter values; such values are double-quoted.
fn quote(value: &str) -> String {
    if value.contains([',', '.', ':', '(', ')', '"', '\\']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select over one table: optional predicate, ordering and row limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(row))
    }

    /// Full PostgREST parameter list, `select=*` first.
    pub fn to_postgrest(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        if let Some(filter) = &self.filter {
            params.extend(filter.to_postgrest());
        }
        if let Some(order) = &self.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{dir}", order.column)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Apply filter, ordering and limit to an in-memory row set.
    pub fn apply<'a>(&self, rows: impl Iterator<Item = &'a Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.filter(|r| self.matches(r)).cloned().collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare_column(a, b, &order.column);
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn compare_column(a: &Value, b: &Value, column: &str) -> Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(a: &str, b: &str) -> Filter {
        Filter::any(vec![
            Filter::all(vec![Filter::eq("sender_id", a), Filter::eq("receiver_id", b)]),
            Filter::all(vec![Filter::eq("sender_id", b), Filter::eq("receiver_id", a)]),
        ])
    }

    #[test]
    fn pair_filter_matches_both_directions_only() {
        let f = pair("a", "b");
        assert!(f.matches(&json!({"sender_id": "a", "receiver_id": "b"})));
        assert!(f.matches(&json!({"sender_id": "b", "receiver_id": "a"})));
        assert!(!f.matches(&json!({"sender_id": "a", "receiver_id": "c"})));
        assert!(!f.matches(&json!({"sender_id": "c", "receiver_id": "b"})));
    }

    #[test]
    fn missing_column_never_equal() {
        assert!(!Filter::eq("task_id", "t").matches(&json!({"content": "x"})));
        assert!(Filter::neq("user_id", "me").matches(&json!({"name": "x"})));
    }

    #[test]
    fn postgrest_rendering() {
        assert_eq!(
            pair("a", "b").to_postgrest(),
            vec![(
                "or".to_string(),
                "(and(sender_id.eq.a,receiver_id.eq.b),and(sender_id.eq.b,receiver_id.eq.a))"
                    .to_string()
            )]
        );
        assert_eq!(
            Filter::all(vec![Filter::eq("task_id", "t1"), Filter::neq("user_id", "me")])
                .to_postgrest(),
            vec![
                ("task_id".to_string(), "eq.t1".to_string()),
                ("user_id".to_string(), "neq.me".to_string()),
            ]
        );
    }

    #[test]
    fn reserved_characters_are_quoted() {
        assert_eq!(
            Filter::eq("name", "a,b").to_postgrest(),
            vec![("name".to_string(), "eq.\"a,b\"".to_string())]
        );
    }

    #[test]
    fn query_params_and_apply() {
        let q = Query::new()
            .filter(Filter::eq("task_id", "t"))
            .order_by("created_at", true)
            .limit(2);
        assert_eq!(
            q.to_postgrest(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("task_id".to_string(), "eq.t".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
                ("limit".to_string(), "2".to_string()),
            ]
        );

        let rows = [
            json!({"task_id": "t", "created_at": "2024-01-01T00:00:03Z"}),
            json!({"task_id": "x", "created_at": "2024-01-01T00:00:00Z"}),
            json!({"task_id": "t", "created_at": "2024-01-01T00:00:01Z"}),
            json!({"task_id": "t", "created_at": "2024-01-01T00:00:02Z"}),
        ];
        let out = q.apply(rows.iter());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["created_at"], "2024-01-01T00:00:01Z");
        assert_eq!(out[1]["created_at"], "2024-01-01T00:00:02Z");
    }
}
