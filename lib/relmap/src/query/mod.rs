//! Fluent SELECT builder with safe parameterization.
//!
//! A [`QueryBuilder`] accumulates a [`Statement`] and a [`ParamMap`]. Every
//! builder method consumes and returns the builder so calls chain; compilation
//! is pure given the current state. Execution methods live in `execute` and
//! streaming accessors in `stream`.
//!
//! ```text
//! let q = QueryBuilder::new()
//!     .select(["id", "name"])
//!     .from("users")
//!     .r#where("age", ">", 18)
//!     .or_where("role", "=", "admin")
//!     .limit(10);
//! // SELECT id, name FROM users WHERE age > :p0 OR role = :p1 LIMIT 10
//! ```

mod compile;
mod execute;
mod params;
mod statement;
mod stream;

pub use execute::Page;
pub use params::{ParamMap, Placeholder, normalize_name, placeholders, rename_placeholders};
pub use statement::{
    Condition, Connector, JoinClause, JoinKind, LockMode, Order, Source, Statement, TableRef,
    UnionClause,
};
pub use stream::{PageStream, RowCursor};

use statement::push_condition;

use crate::identifier::check_reference;
use crate::{MapperError, Params, Value};

/// Comparison operators accepted by `where`/`having`.
const OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", "<=", ">", ">=", "<=>", "LIKE", "NOT LIKE", "REGEXP", "NOT REGEXP",
];

/// SQL text plus the bindings it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Params,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub(crate) statement: Statement,
    pub(crate) params: ParamMap,
    /// First validation failure; surfaced by `compile`.
    pub(crate) error: Option<String>,
    pub(crate) preflighted: bool,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a query against a table reference.
    pub fn table(reference: impl AsRef<str>) -> Self {
        Self::new().from(reference)
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn params(&self) -> &Params {
        self.params.values()
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn check(&mut self, reference: &str) {
        if let Err(err) = check_reference(reference) {
            self.fail(err.to_string());
        }
    }

    fn operator(&mut self, op: &str) -> String {
        let normalized = op.trim().to_ascii_uppercase();
        if !OPERATORS.contains(&normalized.as_str()) {
            self.fail(format!("unsupported operator {op:?}"));
        }
        normalized
    }

    /// Compile a nested builder and fold its parameters into ours.
    fn absorb(&mut self, sub: QueryBuilder) -> Option<String> {
        match sub.compile() {
            Ok(compiled) => match self.params.merge(&compiled.sql, compiled.params) {
                Ok(sql) => Some(sql),
                Err(err) => {
                    self.fail(err.to_string());
                    None
                }
            },
            Err(err) => {
                self.fail(err.to_string());
                None
            }
        }
    }

    // --- SELECT list ---

    /// Replace the select list.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.columns.clear();
        self.add_select(columns)
    }

    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            self.check(&column);
            self.statement.columns.push(column);
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.statement.distinct = true;
        self
    }

    /// Add `SQL_CALC_FOUND_ROWS`; read the total afterwards with `found_rows`.
    pub fn calc_found_rows(mut self) -> Self {
        self.statement.calc_found_rows = true;
        self
    }

    // --- FROM / JOIN ---

    pub fn from(mut self, reference: impl AsRef<str>) -> Self {
        let reference = reference.as_ref();
        self.check(reference);
        self.statement.from = Some(Source::Table(TableRef::parse(reference)));
        self.preflighted = false;
        self
    }

    /// Select from a derived table.
    pub fn from_sub(mut self, sub: QueryBuilder, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.check(&alias);
        if let Some(sql) = self.absorb(sub) {
            self.statement.from = Some(Source::Subquery { sql, alias });
        }
        self
    }

    fn push_join(&mut self, kind: JoinKind, source: Source, on: String) {
        self.statement.joins.push(JoinClause { kind, source, on });
        self.preflighted = false;
    }

    fn table_join(
        mut self,
        kind: JoinKind,
        table: &str,
        left: &str,
        op: &str,
        right: &str,
    ) -> Self {
        self.check(table);
        self.check(left);
        self.check(right);
        let op = self.operator(op);
        self.push_join(
            kind,
            Source::Table(TableRef::parse(table)),
            format!("{left} {op} {right}"),
        );
        self
    }

    /// `INNER JOIN table ON left op right`.
    pub fn join(
        self,
        table: impl AsRef<str>,
        left: impl AsRef<str>,
        op: &str,
        right: impl AsRef<str>,
    ) -> Self {
        self.table_join(JoinKind::Inner, table.as_ref(), left.as_ref(), op, right.as_ref())
    }

    pub fn left_join(
        self,
        table: impl AsRef<str>,
        left: impl AsRef<str>,
        op: &str,
        right: impl AsRef<str>,
    ) -> Self {
        self.table_join(JoinKind::Left, table.as_ref(), left.as_ref(), op, right.as_ref())
    }

    pub fn right_join(
        self,
        table: impl AsRef<str>,
        left: impl AsRef<str>,
        op: &str,
        right: impl AsRef<str>,
    ) -> Self {
        self.table_join(JoinKind::Right, table.as_ref(), left.as_ref(), op, right.as_ref())
    }

    pub fn cross_join(mut self, table: impl AsRef<str>) -> Self {
        let table = table.as_ref();
        self.check(table);
        self.push_join(
            JoinKind::Cross,
            Source::Table(TableRef::parse(table)),
            String::new(),
        );
        self
    }

    /// Join a sub-select; its parameters are merged with collision-safe renaming.
    pub fn join_sub(
        mut self,
        sub: QueryBuilder,
        alias: impl Into<String>,
        left: impl AsRef<str>,
        op: &str,
        right: impl AsRef<str>,
    ) -> Self {
        let alias = alias.into();
        let (left, right) = (left.as_ref(), right.as_ref());
        self.check(&alias);
        self.check(left);
        self.check(right);
        let op = self.operator(op);
        if let Some(sql) = self.absorb(sub) {
            self.push_join(
                JoinKind::Inner,
                Source::Subquery { sql, alias },
                format!("{left} {op} {right}"),
            );
        }
        self
    }

    // --- WHERE ---

    fn comparison(&mut self, column: &str, op: &str, value: Value) -> String {
        self.check(column);
        let op = self.operator(op);
        if value.is_null() {
            match op.as_str() {
                "=" => return format!("{column} IS NULL"),
                "!=" | "<>" => return format!("{column} IS NOT NULL"),
                _ => {}
            }
        }
        let placeholder = self.params.bind(value);
        format!("{column} {op} {placeholder}")
    }

    fn add_where(mut self, connector: Connector, expr: String) -> Self {
        push_condition(&mut self.statement.conditions, connector, expr);
        self
    }

    /// `column op value`, joined with AND (no connector when first).
    pub fn r#where(mut self, column: impl AsRef<str>, op: &str, value: impl Into<Value>) -> Self {
        let expr = self.comparison(column.as_ref(), op, value.into());
        self.add_where(Connector::And, expr)
    }

    pub fn or_where(mut self, column: impl AsRef<str>, op: &str, value: impl Into<Value>) -> Self {
        let expr = self.comparison(column.as_ref(), op, value.into());
        self.add_where(Connector::Or, expr)
    }

    fn in_list<I, V>(&mut self, column: &str, values: I, negate: bool) -> Option<String>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.check(column);
        let placeholders: Vec<String> = values
            .into_iter()
            .map(|v| self.params.bind(v.into()))
            .collect();
        if placeholders.is_empty() {
            return None;
        }
        let keyword = if negate { "NOT IN" } else { "IN" };
        Some(format!("{column} {keyword} ({})", placeholders.join(", ")))
    }

    /// `column IN (...)`. An empty set compiles to `1=0`, matching nothing.
    pub fn where_in<I, V>(mut self, column: impl AsRef<str>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let expr = self
            .in_list(column.as_ref(), values, false)
            .unwrap_or_else(|| "1=0".to_string());
        self.add_where(Connector::And, expr)
    }

    pub fn or_where_in<I, V>(mut self, column: impl AsRef<str>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let expr = self
            .in_list(column.as_ref(), values, false)
            .unwrap_or_else(|| "1=0".to_string());
        self.add_where(Connector::Or, expr)
    }

    /// `column NOT IN (...)`. An empty set leaves the builder unchanged; this is
    /// intentionally not the mirror image of `where_in`'s `1=0`.
    pub fn where_not_in<I, V>(mut self, column: impl AsRef<str>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match self.in_list(column.as_ref(), values, true) {
            Some(expr) => self.add_where(Connector::And, expr),
            None => self,
        }
    }

    pub fn or_where_not_in<I, V>(mut self, column: impl AsRef<str>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match self.in_list(column.as_ref(), values, true) {
            Some(expr) => self.add_where(Connector::Or, expr),
            None => self,
        }
    }

    /// `column IN (sub-select)`.
    pub fn where_in_sub(mut self, column: impl AsRef<str>, sub: QueryBuilder) -> Self {
        let column = column.as_ref();
        self.check(column);
        match self.absorb(sub) {
            Some(sql) => {
                let expr = format!("{column} IN ({sql})");
                self.add_where(Connector::And, expr)
            }
            None => self,
        }
    }

    pub fn where_exists(mut self, sub: QueryBuilder) -> Self {
        match self.absorb(sub) {
            Some(sql) => self.add_where(Connector::And, format!("EXISTS ({sql})")),
            None => self,
        }
    }

    pub fn where_not_exists(mut self, sub: QueryBuilder) -> Self {
        match self.absorb(sub) {
            Some(sql) => self.add_where(Connector::And, format!("NOT EXISTS ({sql})")),
            None => self,
        }
    }

    pub fn where_null(mut self, column: impl AsRef<str>) -> Self {
        let column = column.as_ref();
        self.check(column);
        self.add_where(Connector::And, format!("{column} IS NULL"))
    }

    pub fn or_where_null(mut self, column: impl AsRef<str>) -> Self {
        let column = column.as_ref();
        self.check(column);
        self.add_where(Connector::Or, format!("{column} IS NULL"))
    }

    pub fn where_not_null(mut self, column: impl AsRef<str>) -> Self {
        let column = column.as_ref();
        self.check(column);
        self.add_where(Connector::And, format!("{column} IS NOT NULL"))
    }

    pub fn or_where_not_null(mut self, column: impl AsRef<str>) -> Self {
        let column = column.as_ref();
        self.check(column);
        self.add_where(Connector::Or, format!("{column} IS NOT NULL"))
    }

    fn between(&mut self, column: &str, low: Value, high: Value) -> String {
        self.check(column);
        let low = self.params.bind(low);
        let high = self.params.bind(high);
        format!("{column} BETWEEN {low} AND {high}")
    }

    pub fn where_between(
        mut self,
        column: impl AsRef<str>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        let expr = self.between(column.as_ref(), low.into(), high.into());
        self.add_where(Connector::And, expr)
    }

    pub fn or_where_between(
        mut self,
        column: impl AsRef<str>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        let expr = self.between(column.as_ref(), low.into(), high.into());
        self.add_where(Connector::Or, expr)
    }

    fn raw(&mut self, expr: &str, params: Params) -> Option<String> {
        if expr.contains(';') {
            self.fail(format!("raw expression {expr:?} contains a statement terminator"));
            return None;
        }
        match self.params.merge(expr, params) {
            Ok(sql) => Some(sql),
            Err(err) => {
                self.fail(err.to_string());
                None
            }
        }
    }

    /// Raw condition with its own named bindings.
    pub fn where_raw(mut self, expr: impl AsRef<str>, params: Params) -> Self {
        match self.raw(expr.as_ref(), params) {
            Some(sql) => self.add_where(Connector::And, sql),
            None => self,
        }
    }

    pub fn or_where_raw(mut self, expr: impl AsRef<str>, params: Params) -> Self {
        match self.raw(expr.as_ref(), params) {
            Some(sql) => self.add_where(Connector::Or, sql),
            None => self,
        }
    }

    fn group(mut self, connector: Connector, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let nested = build(QueryBuilder::new());
        if let Some(err) = nested.error {
            self.fail(err);
            return self;
        }
        if nested.statement.conditions.is_empty() {
            return self;
        }
        let expr = format!(
            "({})",
            statement::render_conditions(&nested.statement.conditions)
        );
        match self.params.merge(&expr, nested.params.into_values()) {
            Ok(sql) => self.add_where(connector, sql),
            Err(err) => {
                self.fail(err.to_string());
                self
            }
        }
    }

    /// Parenthesized group of conditions built on a fresh nested builder.
    pub fn where_group(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.group(Connector::And, build)
    }

    pub fn or_where_group(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.group(Connector::Or, build)
    }

    // --- GROUP BY / HAVING ---

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            self.check(&column);
            self.statement.group_by.push(column);
        }
        self
    }

    pub fn having(mut self, column: impl AsRef<str>, op: &str, value: impl Into<Value>) -> Self {
        let expr = self.comparison(column.as_ref(), op, value.into());
        push_condition(&mut self.statement.having, Connector::And, expr);
        self
    }

    pub fn or_having(mut self, column: impl AsRef<str>, op: &str, value: impl Into<Value>) -> Self {
        let expr = self.comparison(column.as_ref(), op, value.into());
        push_condition(&mut self.statement.having, Connector::Or, expr);
        self
    }

    pub fn having_raw(mut self, expr: impl AsRef<str>, params: Params) -> Self {
        if let Some(sql) = self.raw(expr.as_ref(), params) {
            push_condition(&mut self.statement.having, Connector::And, sql);
        }
        self
    }

    // --- ORDER / LIMIT / LOCKS ---

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        let column = column.into();
        self.check(&column);
        self.statement.order_by.push((column, order));
        self
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Order::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.statement.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.statement.offset = Some(offset);
        self
    }

    /// Limit/offset for a 1-based page.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page)
            .offset((page - 1).saturating_mul(per_page))
    }

    pub fn for_update(mut self) -> Self {
        self.statement.lock = Some(LockMode::ForUpdate);
        self
    }

    pub fn lock_in_share_mode(mut self) -> Self {
        self.statement.lock = Some(LockMode::Shared);
        self
    }

    // --- RAW OVERRIDE / UNION ---

    /// Replace the whole statement with raw SQL. UPDATE and DELETE overrides
    /// still receive the fluent WHERE conditions at compile time.
    pub fn custom(mut self, sql: impl Into<String>, params: Params) -> Self {
        let sql = sql.into();
        match self.params.merge(&sql, params) {
            Ok(sql) => self.statement.custom = Some(sql),
            Err(err) => self.fail(err.to_string()),
        }
        self
    }

    pub fn union(mut self, other: QueryBuilder) -> Self {
        if let Some(sql) = self.absorb(other) {
            self.statement.unions.push(UnionClause { all: false, sql });
        }
        self
    }

    pub fn union_all(mut self, other: QueryBuilder) -> Self {
        if let Some(sql) = self.absorb(other) {
            self.statement.unions.push(UnionClause { all: true, sql });
        }
        self
    }

    /// A copy with paging and ordering stripped, used by aggregates.
    pub(crate) fn duplicate_for_aggregate(&self) -> Self {
        let mut dup = self.clone();
        dup.statement.limit = None;
        dup.statement.offset = None;
        dup.statement.order_by.clear();
        dup.statement.calc_found_rows = false;
        dup.statement.lock = None;
        dup
    }

    /// Ensure any validation failure surfaces as an error.
    pub(crate) fn validated(&self) -> Result<(), MapperError> {
        match &self.error {
            Some(message) => Err(MapperError::InvalidArgument(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compiles_the_documented_example() {
        let compiled = QueryBuilder::new()
            .select(["id", "name"])
            .from("users")
            .r#where("age", ">", 18)
            .or_where("role", "=", "admin")
            .limit(10)
            .compile()
            .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT id, name FROM users WHERE age > :p0 OR role = :p1 LIMIT 10"
        );
        let mut expected = Params::new();
        expected.insert("p0".into(), Value::Int(18));
        expected.insert("p1".into(), Value::from("admin"));
        assert_eq!(compiled.params, expected);
    }

    #[test]
    fn every_condition_after_the_first_carries_a_connector() {
        let q = QueryBuilder::table("t")
            .or_where("a", "=", 1)
            .r#where("b", "=", 2)
            .or_where_null("c")
            .where_in("d", [1, 2])
            .where_group(|g| g.r#where("e", "=", 1).or_where("f", "=", 2));

        let conditions = &q.statement().conditions;
        assert_eq!(conditions[0].connector, Connector::None);
        for condition in &conditions[1..] {
            assert_ne!(condition.connector, Connector::None);
        }
    }

    #[test]
    fn empty_where_in_matches_nothing() {
        let compiled = QueryBuilder::table("users")
            .where_in("id", Vec::<i64>::new())
            .compile()
            .unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM users WHERE 1=0");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn empty_where_not_in_is_a_no_op() {
        // Asymmetric with where_in on purpose: NOT IN () leaves the statement
        // exactly as it was before the call.
        let before = QueryBuilder::table("users").r#where("active", "=", true);
        let after = before.clone().where_not_in("id", Vec::<i64>::new());
        assert_eq!(before.compile().unwrap(), after.compile().unwrap());
    }

    #[test]
    fn where_in_binds_each_value() {
        let compiled = QueryBuilder::table("users")
            .where_in("id", [1, 2, 3])
            .where_not_in("role", ["banned"])
            .compile()
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE id IN (:p0, :p1, :p2) AND role NOT IN (:p3)"
        );
        assert_eq!(compiled.params.len(), 4);
    }

    #[test]
    fn grouped_conditions_merge_parameters_without_collisions() {
        let compiled = QueryBuilder::table("users")
            .r#where("active", "=", true)
            .where_group(|g| g.r#where("age", ">", 18).or_where("role", "=", "admin"))
            .or_where_group(|g| g.r#where("vip", "=", true))
            .compile()
            .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE active = :p0 AND (age > :p2 OR role = :p1) OR (vip = :p3)"
        );
        // only the colliding p0 of each group is renamed
        assert_eq!(compiled.params.get("p1"), Some(&Value::from("admin")));
        assert_eq!(compiled.params.get("p2"), Some(&Value::Int(18)));
        assert_eq!(compiled.params.get("p3"), Some(&Value::Bool(true)));
        let referenced: Vec<String> = placeholders(&compiled.sql)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(referenced.len(), compiled.params.len());
        for name in referenced {
            assert!(compiled.params.contains_key(&name), "{name} unbound");
        }
    }

    #[test]
    fn empty_group_is_ignored() {
        let compiled = QueryBuilder::table("users")
            .where_group(|g| g)
            .compile()
            .unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM users");
    }

    #[test]
    fn null_comparisons_become_is_null() {
        let compiled = QueryBuilder::table("users")
            .r#where("deleted_at", "=", Value::Null)
            .r#where("team_id", "!=", None::<i64>)
            .compile()
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE deleted_at IS NULL AND team_id IS NOT NULL"
        );
    }

    #[test]
    fn sub_queries_are_renamed_on_merge() {
        let sub = QueryBuilder::new()
            .select(["user_id"])
            .from("orders")
            .r#where("total", ">", 100);
        let compiled = QueryBuilder::table("users")
            .r#where("active", "=", true)
            .where_in_sub("id", sub)
            .compile()
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE active = :p0 AND id IN (SELECT user_id FROM orders WHERE total > :p1)"
        );
        assert_eq!(compiled.params.get("p1"), Some(&Value::Int(100)));
    }

    #[test]
    fn join_sub_and_union_merge_parameters() {
        let totals = QueryBuilder::new()
            .select(["user_id", "SUM(total) AS spent"])
            .from("orders")
            .r#where("status", "=", "paid")
            .group_by(["user_id"]);
        let archived = QueryBuilder::new()
            .select(["id", "name"])
            .from("archived_users")
            .r#where("region", "=", "eu");

        let compiled = QueryBuilder::new()
            .select(["u.id", "u.name"])
            .from("users u")
            .join_sub(totals, "t", "t.user_id", "=", "u.id")
            .r#where("u.region", "=", "eu")
            .union_all(archived)
            .compile()
            .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT u.id, u.name FROM users AS u INNER JOIN (SELECT user_id, SUM(total) AS spent FROM orders WHERE status = :p0 GROUP BY user_id) AS t ON t.user_id = u.id WHERE u.region = :p1 UNION ALL (SELECT id, name FROM archived_users WHERE region = :p2)"
        );
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn raw_conditions_keep_their_names_unless_colliding() {
        let mut raw = Params::new();
        raw.insert("p0".into(), Value::from("x"));
        let compiled = QueryBuilder::table("t")
            .r#where("a", "=", 1)
            .where_raw("LOWER(b) = :p0", raw)
            .compile()
            .unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM t WHERE a = :p0 AND LOWER(b) = :p1");
        assert_eq!(compiled.params.get("p1"), Some(&Value::from("x")));
    }

    #[test]
    fn unsafe_references_fail_at_compile() {
        let err = QueryBuilder::table("users")
            .r#where("id; DROP TABLE users", "=", 1)
            .compile()
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidArgument(_)));

        let err = QueryBuilder::table("users")
            .r#where("id", "== 1 OR", 1)
            .compile()
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidArgument(_)));
    }

    #[test]
    fn for_page_sets_limit_and_offset() {
        let q = QueryBuilder::table("t").for_page(3, 20);
        assert_eq!(q.statement().limit, Some(20));
        assert_eq!(q.statement().offset, Some(40));

        let far = QueryBuilder::table("t").for_page(u64::MAX, 20);
        assert_eq!(far.statement().offset, Some(u64::MAX));
    }
}
