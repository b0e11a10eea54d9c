//! The structural description of one SELECT statement.

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// How a condition attaches to the one before it.
///
/// The first condition of a list is always `None`; every later one is `And`
/// or `Or`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    None,
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            Connector::None => None,
            Connector::And => Some("AND"),
            Connector::Or => Some("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub connector: Connector,
    pub expr: String,
}

/// Append a condition, forcing the first connector to `None`.
pub(crate) fn push_condition(list: &mut Vec<Condition>, requested: Connector, expr: String) {
    let connector = if list.is_empty() {
        Connector::None
    } else if requested == Connector::None {
        Connector::And
    } else {
        requested
    };
    list.push(Condition { connector, expr });
}

/// Render a condition list as `a AND b OR c`.
pub(crate) fn render_conditions(list: &[Condition]) -> String {
    let mut out = String::new();
    for condition in list {
        if let Some(connector) = condition.connector.as_sql() {
            out.push(' ');
            out.push_str(connector);
            out.push(' ');
        }
        out.push_str(&condition.expr);
    }
    out
}

/// A table reference: optional schema qualifier, bare name, optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Parse `name`, `schema.name`, `name alias` or `name AS alias`.
    pub fn parse(reference: &str) -> Self {
        let parts: Vec<&str> = reference.split_whitespace().collect();
        let (target, alias) = match parts.as_slice() {
            [target, kw, alias] if kw.eq_ignore_ascii_case("as") => (*target, Some(*alias)),
            [target, alias] => (*target, Some(*alias)),
            [target] => (*target, None),
            _ => (reference.trim(), None),
        };
        let (schema, name) = crate::identifier::parse_qualified(target);
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: alias.map(|a| a.trim_matches('`').to_string()),
        }
    }

    /// `schema.name` or `name`, unquoted.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {alias}", self.qualified()),
            None => self.qualified(),
        }
    }
}

/// FROM or JOIN target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Table(TableRef),
    /// Compiled sub-select text with its alias; parameters already merged.
    Subquery { sql: String, alias: String },
}

impl Source {
    pub fn to_sql(&self) -> String {
        match self {
            Source::Table(table) => table.to_sql(),
            Source::Subquery { sql, alias } => format!("({sql}) AS {alias}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: Source,
    /// Empty for cross joins.
    pub on: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    ForUpdate,
    Shared,
}

impl LockMode {
    pub fn as_sql(self) -> &'static str {
        match self {
            LockMode::ForUpdate => "FOR UPDATE",
            LockMode::Shared => "LOCK IN SHARE MODE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionClause {
    pub all: bool,
    pub sql: String,
}

/// Everything a SELECT compiles from. Mutated by builder methods, consumed by
/// compilation; duplicating a builder is a plain value copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    pub columns: Vec<String>,
    pub distinct: bool,
    pub calc_found_rows: bool,
    pub from: Option<Source>,
    pub joins: Vec<JoinClause>,
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    pub having: Vec<Condition>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockMode>,
    /// Raw statement overriding everything else.
    pub custom: Option<String>,
    pub unions: Vec<UnionClause>,
}

impl Statement {
    /// The FROM table, if it is a plain table reference.
    pub fn from_table(&self) -> Option<&TableRef> {
        match &self.from {
            Some(Source::Table(table)) => Some(table),
            _ => None,
        }
    }
}
