//! Row query builder
//!
//! A [`Query`] describes one `select` against a table: columns, filters,
//! ordering and an offset/limit window. The HTTP client renders it as
//! PostgREST query parameters; the in-process platform evaluates it directly.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    Lt(String, Value),
    Gt(String, Value),
    IsNull(String),
}

impl Filter {
    pub fn eq<V: Serialize>(column: &str, value: V) -> Self {
        Self::Eq(column.to_string(), to_json(value))
    }

    pub fn neq<V: Serialize>(column: &str, value: V) -> Self {
        Self::Neq(column.to_string(), to_json(value))
    }

    pub fn is_in<V: Serialize>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column.to_string(), values.into_iter().map(to_json).collect())
    }

    pub fn lt<V: Serialize>(column: &str, value: V) -> Self {
        Self::Lt(column.to_string(), to_json(value))
    }

    pub fn gt<V: Serialize>(column: &str, value: V) -> Self {
        Self::Gt(column.to_string(), to_json(value))
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Neq(c, _)
            | Self::In(c, _)
            | Self::Lt(c, _)
            | Self::Gt(c, _)
            | Self::IsNull(c) => c,
        }
    }

    /// PostgREST operator expression, e.g. `eq.42` or `in.(a,b)`
    pub fn to_param(&self) -> (String, String) {
        let expr = match self {
            Self::Eq(_, v) => format!("eq.{}", param_value(v)),
            Self::Neq(_, v) => format!("neq.{}", param_value(v)),
            Self::Lt(_, v) => format!("lt.{}", param_value(v)),
            Self::Gt(_, v) => format!("gt.{}", param_value(v)),
            Self::IsNull(_) => "is.null".to_string(),
            Self::In(_, values) => {
                let items: Vec<String> = values.iter().map(list_item).collect();
                format!("in.({})", items.join(","))
            }
        };
        (self.column().to_string(), expr)
    }

    /// Evaluate against a JSON row; a missing column reads as null
    pub fn matches(&self, row: &Value) -> bool {
        let field = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, v) => compare_values(field, v) == Some(Ordering::Equal),
            Self::Neq(_, v) => !field.is_null() && compare_values(field, v) != Some(Ordering::Equal),
            Self::In(_, values) => values
                .iter()
                .any(|v| compare_values(field, v) == Some(Ordering::Equal)),
            Self::Lt(_, v) => compare_values(field, v) == Some(Ordering::Less),
            Self::Gt(_, v) => compare_values(field, v) == Some(Ordering::Greater),
            Self::IsNull(_) => field.is_null(),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Select query against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq<V: Serialize>(self, column: &str, value: V) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn neq<V: Serialize>(self, column: &str, value: V) -> Self {
        self.filter(Filter::neq(column, value))
    }

    pub fn is_in<V: Serialize>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::is_in(column, values))
    }

    pub fn lt<V: Serialize>(self, column: &str, value: V) -> Self {
        self.filter(Filter::lt(column, value))
    }

    pub fn gt<V: Serialize>(self, column: &str, value: V) -> Self {
        self.filter(Filter::gt(column, value))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::is_null(column))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Inclusive row window, like PostgREST's `range(from, to)`
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from) + 1);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs for `GET /rest/v1/{table}`
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().map(Filter::to_param));

        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| {
                    format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" })
                })
                .collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Apply filters, ordering and window to in-memory rows
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut selected: Vec<Value> = rows
            .iter()
            .filter(|row| self.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();

        if !self.order.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.order {
                    let left = a.get(&key.column).unwrap_or(&Value::Null);
                    let right = b.get(&key.column).unwrap_or(&Value::Null);
                    let ord = compare_values(left, right).unwrap_or(Ordering::Equal);
                    let ord = if key.ascending { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(offset).take(limit).collect()
    }
}

fn to_json<V: Serialize>(value: V) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn list_item(value: &Value) -> String {
    let raw = param_value(value);
    if raw.contains([',', '(', ')', '"']) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw
    }
}

/// Compare two JSON scalars
///
/// Strings that both parse as RFC 3339 timestamps compare as instants, so
/// differing fractional precision does not break ordering.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if raw.len() < 20 {
        return None;
    }
    DateTime::parse_from_rfc3339(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params() {
        let query = Query::table("comments")
            .eq("post_id", "p1")
            .is_in("user_id", ["a", "b"])
            .order("created_at", true)
            .range(20, 39);
        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("post_id".to_string(), "eq.p1".to_string()),
                ("user_id".to_string(), "in.(a,b)".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
                ("offset".to_string(), "20".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_apply_filters_order_and_window() {
        let rows = vec![
            json!({"id": 1, "post_id": "p", "created_at": "2024-01-01T00:00:02Z"}),
            json!({"id": 2, "post_id": "p", "created_at": "2024-01-01T00:00:01.5Z"}),
            json!({"id": 3, "post_id": "q", "created_at": "2024-01-01T00:00:00Z"}),
            json!({"id": 4, "post_id": "p", "created_at": "2024-01-01T00:00:03Z"}),
        ];
        let page = Query::table("comments")
            .eq("post_id", "p")
            .order("created_at", false)
            .range(0, 1)
            .apply(&rows);
        let ids: Vec<i64> = page.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 1]);
    }

    #[test]
    fn test_timestamp_comparison_ignores_precision() {
        let earlier = json!("2024-01-01T00:00:01.5Z");
        let later = json!("2024-01-01T00:00:02Z");
        assert_eq!(compare_values(&earlier, &later), Some(Ordering::Less));
    }

    #[test]
    fn test_null_handling() {
        let row = json!({"parent_id": null});
        assert!(Filter::is_null("parent_id").matches(&row));
        assert!(Filter::is_null("missing").matches(&row));
        assert!(!Filter::eq("parent_id", "x").matches(&row));
        assert!(!Filter::neq("parent_id", "x").matches(&row));
    }
}
