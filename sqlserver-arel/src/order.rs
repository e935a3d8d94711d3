//! ORDER BY input parsing and expansion.
//!
//! Callers hand `order(...)` a mix of column references, prepared specs and
//! strings. Under SQL Server every input is normalized to [`OrderSpec`] so
//! that orders can be compared, deduplicated and reversed.
//!
//! String inputs are split on commas, except that a fragment shaped like
//! `identifier(...)` with an optional `ASC`/`DESC` is kept whole, so
//! `UPPER(a,b) DESC` survives as one term. Only a single level of parentheses
//! is recognized: nested calls or several calls inside one fragment are still
//! split at their commas.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex_lite::Regex;

use crate::nodes::{Attribute, OrderNode, OrderSpec, SortOrder, SqlLiteral};

/// A function call fragment whose commas must not split it.
static FUNCTION_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\w+\([^()]*,[^()]*\)(\s+(ASC|DESC))?\s*(,|$)")
        .expect("function term pattern is valid")
});

/// Trailing direction keyword.
static DIRECTION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(ASC|DESC)$").expect("direction pattern is valid")
});

/// One argument to `order(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderInput {
    /// A column with its relation.
    Attribute(Attribute),
    /// A prepared spec, passed through unchanged.
    Spec(OrderSpec),
    /// An order string such as `"name ASC, age"`.
    Text(String),
    /// Any other value, used by its string form.
    Other(String),
}

impl OrderInput {
    /// Wrap an arbitrary displayable value (a column position, an enum, ...).
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Other(value.to_string())
    }
}

impl From<Attribute> for OrderInput {
    fn from(attr: Attribute) -> Self {
        Self::Attribute(attr)
    }
}

impl From<&Attribute> for OrderInput {
    fn from(attr: &Attribute) -> Self {
        Self::Attribute(attr.clone())
    }
}

impl From<OrderSpec> for OrderInput {
    fn from(spec: OrderSpec) -> Self {
        Self::Spec(spec)
    }
}

impl From<&str> for OrderInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for OrderInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<SqlLiteral> for OrderInput {
    fn from(sql: SqlLiteral) -> Self {
        Self::Text(sql.into_inner())
    }
}

impl From<i64> for OrderInput {
    fn from(position: i64) -> Self {
        Self::display(position)
    }
}

/// Split an order string into its terms.
///
/// Empty fragments are dropped.
pub fn split_order_text(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(m) = FUNCTION_TERM.find(rest) {
            fragments.push(m.as_str().trim_end().trim_end_matches(',').trim());
            rest = &rest[m.end()..];
            continue;
        }
        match rest.find(',') {
            Some(idx) => {
                fragments.push(rest[..idx].trim());
                rest = &rest[idx + 1..];
            }
            None => {
                fragments.push(rest.trim());
                break;
            }
        }
    }

    fragments.retain(|f| !f.is_empty());
    fragments
}

/// Turn one fragment into a raw SQL spec, reading a trailing direction.
fn parse_fragment(fragment: &str) -> OrderSpec {
    match DIRECTION_SUFFIX.captures(fragment) {
        Some(caps) => {
            let order = caps
                .get(1)
                .and_then(|m| SortOrder::from_keyword(m.as_str()))
                .unwrap_or_default();
            let expr = fragment[..caps.get(0).map_or(fragment.len(), |m| m.start())].trim();
            OrderSpec::new(SqlLiteral::new(expr), order)
        }
        None => OrderSpec::asc(SqlLiteral::new(fragment.trim())),
    }
}

/// Parse an order string into specs, one per term.
///
/// ```rust
/// use sqlserver_arel::{OrderSpec, SqlLiteral, parse_order_text};
///
/// let specs = parse_order_text("name ASC, UPPER(a,b) DESC, age");
/// assert_eq!(specs, vec![
///     OrderSpec::asc(SqlLiteral::new("name")),
///     OrderSpec::desc(SqlLiteral::new("UPPER(a,b)")),
///     OrderSpec::asc(SqlLiteral::new("age")),
/// ]);
/// ```
pub fn parse_order_text(text: &str) -> Vec<OrderSpec> {
    split_order_text(text)
        .into_iter()
        .map(parse_fragment)
        .collect()
}

/// Normalize one input to specs.
pub(crate) fn expand_input(input: OrderInput) -> Vec<OrderSpec> {
    match input {
        OrderInput::Attribute(attr) => vec![attr.asc()],
        OrderInput::Spec(spec) => vec![spec],
        OrderInput::Text(text) => parse_order_text(&text),
        OrderInput::Other(text) => vec![OrderSpec::asc(SqlLiteral::new(text))],
    }
}

/// Generic handling: inputs are kept as given, strings stay raw SQL.
pub(crate) fn passthrough_input(input: OrderInput) -> OrderNode {
    match input {
        OrderInput::Attribute(attr) => OrderNode::Column(attr.to_column_ref()),
        OrderInput::Spec(spec) => OrderNode::Spec(spec),
        OrderInput::Text(text) | OrderInput::Other(text) => OrderNode::Sql(SqlLiteral::new(text)),
    }
}

/// Expand inputs into a flat list of specs, one level deep.
pub fn expand_orders<I>(inputs: I) -> Vec<OrderSpec>
where
    I: IntoIterator,
    I::Item: Into<OrderInput>,
{
    inputs
        .into_iter()
        .flat_map(|input| expand_input(input.into()))
        .collect()
}

/// Remove repeated specs, keeping the first occurrence of each.
pub fn dedup_orders<I>(orders: I) -> Vec<OrderSpec>
where
    I: IntoIterator<Item = OrderSpec>,
{
    orders.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}
