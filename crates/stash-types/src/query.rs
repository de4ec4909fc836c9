use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::key::Key;

/// Comparison operator of a filter clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    /// Parse an operator token such as `"="` or `">="`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Apply this operator to a candidate value and the filter's operand.
    ///
    /// Range operators only match values of the same JSON type.
    pub fn apply(&self, candidate: &Value, operand: &Value) -> bool {
        let ord = compare_values(candidate, operand);
        if *self != Self::Eq && type_rank(candidate) != type_rank(operand) {
            return false;
        }
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One filter clause, written as `"Field op"` (the operator defaults to `=`).
///
/// The expression is kept verbatim for rendering and parsed when the query
/// runs, so a bad operator surfaces as an execution error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub expr: String,
    pub value: Value,
}

impl Filter {
    pub fn new(expr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            expr: expr.into(),
            value: value.into(),
        }
    }

    /// Split the expression into its field name and operator.
    pub fn parts(&self) -> StoreResult<(&str, FilterOp)> {
        let expr = self.expr.trim();
        match expr.rsplit_once(char::is_whitespace) {
            Some((field, token)) => match FilterOp::parse(token) {
                Some(op) => Ok((field.trim(), op)),
                None => Err(StoreError::backend(
                    format!("invalid filter operator {token:?}"),
                    format!("filter {:?}", self.expr),
                )),
            },
            None => Ok((expr, FilterOp::Eq)),
        }
    }
}

/// Sort direction of an order clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Immutable declarative query.
///
/// Built fluently; every builder call consumes the query and returns the
/// updated value, so a constructed query is never mutated in place.
///
/// ```
/// use stash_types::Query;
///
/// let q = Query::new("Flight").filter("Altitude >", 1000).order("-Altitude").limit(5);
/// assert_eq!(q.limit_value(), Some(5));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    kind: String,
    ancestor: Option<Key>,
    filters: Vec<Filter>,
    projection: Vec<String>,
    order: Option<String>,
    limit: Option<usize>,
    keys_only: bool,
    distinct: bool,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Restrict results to `ancestor` and its descendants.
    pub fn ancestor(mut self, ancestor: &Key) -> Self {
        self.ancestor = Some(ancestor.clone());
        self
    }

    /// Add a filter clause such as `filter("Age >=", 21)`.
    pub fn filter(mut self, expr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(expr, value));
        self
    }

    /// Return only the named fields.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Order by a field; a leading `-` means descending.
    pub fn order(mut self, field: impl Into<String>) -> Self {
        self.order = Some(field.into());
        self
    }

    /// Cap the number of results. Zero means no limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit != 0).then_some(limit);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// The raw order clause, as passed to [`Query::order`].
    pub fn order_clause(&self) -> Option<&str> {
        self.order.as_deref()
    }

    /// The order field and its direction.
    pub fn order_field(&self) -> Option<(&str, Direction)> {
        self.order.as_deref().map(|clause| match clause.strip_prefix('-') {
            Some(field) => (field, Direction::Descending),
            None => (clause, Direction::Ascending),
        })
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }
}

/// Deterministic, human-readable dump for logs. Not a parseable format.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NewQuery({:?})", self.kind)?;
        if let Some(ancestor) = &self.ancestor {
            writeln!(f, "  .Ancestor({ancestor})")?;
        }
        for filter in &self.filters {
            writeln!(f, "  .Filter({:?}, {})", filter.expr, filter.value)?;
        }
        if !self.projection.is_empty() {
            let fields: Vec<String> = self.projection.iter().map(|p| format!("{p:?}")).collect();
            writeln!(f, "  .Project[{}]", fields.join(" "))?;
        }
        if let Some(order) = &self.order {
            writeln!(f, "  .Order({order:?})")?;
        }
        if let Some(limit) = self.limit {
            writeln!(f, "  .Limit({limit})")?;
        }
        if self.keys_only {
            writeln!(f, "  .KeysOnly()")?;
        }
        if self.distinct {
            writeln!(f, "  .Distinct()")?;
        }
        Ok(())
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values, used for sorting and range filters.
///
/// Values of different types order by type: null, bool, number, string,
/// array, object. Numbers compare numerically regardless of representation.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare_values(l, r) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Query {
        let parent = Key::named("Owner", "alice", None);
        Query::new("Flight")
            .ancestor(&parent)
            .filter("Altitude >=", 1000)
            .filter("Callsign", "UAL1")
            .project(["Altitude", "Speed"])
            .order("-Altitude")
            .limit(10)
            .keys_only()
            .distinct()
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(sample().to_string(), sample().to_string());
    }

    #[test]
    fn rendering_lists_every_clause() {
        let expected = "NewQuery(\"Flight\")\n\
                        \x20 .Ancestor(/Owner,\"alice\")\n\
                        \x20 .Filter(\"Altitude >=\", 1000)\n\
                        \x20 .Filter(\"Callsign\", \"UAL1\")\n\
                        \x20 .Project[\"Altitude\" \"Speed\"]\n\
                        \x20 .Order(\"-Altitude\")\n\
                        \x20 .Limit(10)\n\
                        \x20 .KeysOnly()\n\
                        \x20 .Distinct()\n";
        assert_eq!(sample().to_string(), expected);
    }

    #[test]
    fn bare_query_renders_one_line() {
        assert_eq!(Query::new("Thing").to_string(), "NewQuery(\"Thing\")\n");
    }

    #[test]
    fn builder_returns_new_values() {
        let base = Query::new("Thing");
        let limited = base.clone().limit(3);
        assert_eq!(base.limit_value(), None);
        assert_eq!(limited.limit_value(), Some(3));
        assert!(!base.is_keys_only());
        assert!(base.clone().keys_only().is_keys_only());
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert_eq!(Query::new("Thing").limit(0).limit_value(), None);
    }

    #[test]
    fn order_field_parses_direction() {
        let asc = Query::new("T").order("I");
        assert_eq!(asc.order_field(), Some(("I", Direction::Ascending)));
        let desc = Query::new("T").order("-I");
        assert_eq!(desc.order_field(), Some(("I", Direction::Descending)));
    }

    #[test]
    fn filter_parts() {
        assert_eq!(Filter::new("I =", 1).parts().unwrap(), ("I", FilterOp::Eq));
        assert_eq!(Filter::new("I", 1).parts().unwrap(), ("I", FilterOp::Eq));
        assert_eq!(Filter::new(" I >= ", 1).parts().unwrap(), ("I", FilterOp::Ge));
        assert!(Filter::new("I !=", 1).parts().is_err());
    }

    #[test]
    fn filter_ops_apply() {
        assert!(FilterOp::Eq.apply(&json!(6), &json!(6.0)));
        assert!(FilterOp::Lt.apply(&json!(3), &json!(6)));
        assert!(FilterOp::Ge.apply(&json!("b"), &json!("a")));
        assert!(!FilterOp::Gt.apply(&json!("z"), &json!(1)));
        assert!(!FilterOp::Eq.apply(&json!(null), &json!(0)));
    }

    #[test]
    fn values_order_by_type_then_value() {
        let mut values = vec![json!("b"), json!(2), json!(null), json!(true), json!(1.5)];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(null), json!(true), json!(1.5), json!(2), json!("b")]);
    }
}
