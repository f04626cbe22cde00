//! SQL rendering: identifier quoting and the query-tree renderer.

use crate::query::{
    ColumnExpr, CopyOut, CopySource, FromEntry, FromSource, Predicate, RecursiveCte, Select,
    SqlQuery,
};

/// Quote an identifier for SQL. Always quotes, with embedded quotes doubled.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a schema-qualified name.
pub fn quote_qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Quote a string literal.
pub fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Dotted name quoted only where needed. More readable than `quote_ident`
/// but less strict: use it for logs and error messages, never for
/// statements sent to the database.
pub fn ident_display(schema: &str, name: &str) -> String {
    fn quote_part(part: &str) -> String {
        let plain = part
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if plain {
            part.to_string()
        } else {
            quote_ident(part)
        }
    }
    format!("{}.{}", quote_part(schema), quote_part(name))
}

/// Render a query tree to SQL. Nested subqueries are broken over indented
/// lines; the indentation is cosmetic but stable, so emitted dumps diff
/// cleanly.
pub fn render_query(query: &SqlQuery) -> String {
    let mut renderer = SqlRenderer::new();
    renderer.query(query);
    renderer.out
}

struct SqlRenderer {
    out: String,
    level: usize,
}

impl SqlRenderer {
    fn new() -> Self {
        Self {
            out: String::new(),
            level: 0,
        }
    }

    fn nl_indent(&mut self) {
        self.out.push('\n');
        for _ in 0..self.level {
            self.out.push(' ');
        }
    }

    /// Separate two clauses: a newline at the nesting indent inside
    /// subqueries, a single space at the top level.
    fn clause_sep(&mut self) {
        if self.level > 0 {
            self.nl_indent();
        } else {
            self.out.push(' ');
        }
    }

    fn query(&mut self, query: &SqlQuery) {
        match query {
            SqlQuery::Select(select) => self.select(select),
            SqlQuery::RecursiveCte(cte) => self.recursive_cte(cte),
            SqlQuery::CopyOut(copy) => self.copy_out(copy),
        }
    }

    fn select(&mut self, select: &Select) {
        if self.level > 0 {
            self.nl_indent();
        }
        self.out.push_str("select ");
        for (i, col) in select.columns.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.column(col);
        }
        self.clause_sep();
        self.out.push_str("from ");
        for (i, entry) in select.from.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.from_entry(entry);
        }
        if let Some(pred) = &select.where_ {
            self.clause_sep();
            self.out.push_str("where ");
            self.predicate(pred);
        }
    }

    fn column(&mut self, col: &ColumnExpr) {
        match col {
            ColumnExpr::Star => self.out.push('*'),
            ColumnExpr::Column { alias: None, name } => self.out.push_str(&quote_ident(name)),
            ColumnExpr::Column {
                alias: Some(alias),
                name,
            } => {
                self.out.push_str(&quote_ident(alias));
                self.out.push('.');
                self.out.push_str(&quote_ident(name));
            }
            ColumnExpr::Raw(expr) => self.out.push_str(expr),
        }
    }

    fn from_entry(&mut self, entry: &FromEntry) {
        match &entry.source {
            FromSource::Table { schema, name } => {
                self.out.push_str("only ");
                self.out.push_str(&quote_qualified(schema, name));
            }
            FromSource::Cte(name) => self.out.push_str(&quote_ident(name)),
        }
        if let Some(alias) = &entry.alias {
            self.out.push_str(" as ");
            self.out.push_str(&quote_ident(alias));
        }
    }

    fn predicate(&mut self, pred: &Predicate) {
        match pred {
            Predicate::Sql(sql) => {
                self.out.push('(');
                self.out.push_str(sql);
                self.out.push(')');
            }
            Predicate::FkeyJoin { fkey, from, to } => {
                self.out.push_str("((");
                self.alias_columns(from, &fkey.table_cols);
                self.out.push_str(") = (");
                self.alias_columns(to, &fkey.ftable_cols);
                self.out.push_str("))");
            }
            Predicate::Exists(query) => {
                self.out.push_str("exists (");
                self.level += 4;
                self.select(query);
                self.level -= 4;
                self.out.push(')');
            }
            Predicate::And(conds) => self.junction(conds, "and"),
            Predicate::Or(conds) => self.junction(conds, "or"),
        }
    }

    fn alias_columns(&mut self, alias: &str, columns: &[String]) {
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&quote_ident(alias));
            self.out.push('.');
            self.out.push_str(&quote_ident(col));
        }
    }

    fn junction(&mut self, conds: &[Predicate], keyword: &str) {
        self.out.push('(');
        self.level += 4;
        for (i, cond) in conds.iter().enumerate() {
            self.nl_indent();
            if i > 0 {
                self.out.push_str(keyword);
                self.out.push(' ');
            }
            self.predicate(cond);
        }
        self.level -= 4;
        self.out.push(')');
    }

    fn recursive_cte(&mut self, cte: &RecursiveCte) {
        self.out.push_str("with recursive ");
        self.out.push_str(&quote_ident(&cte.name));
        self.out.push_str(" as (");
        self.level += 4;
        self.select(&cte.base);
        self.level -= 4;
        self.nl_indent();
        self.out.push_str("union");
        self.level += 4;
        self.select(&cte.recursive);
        self.level -= 4;
        self.nl_indent();
        self.out.push(')');
        self.nl_indent();
        self.out.push_str("select * from ");
        self.out.push_str(&quote_ident(&cte.name));
    }

    fn copy_out(&mut self, copy: &CopyOut) {
        match &copy.source {
            CopySource::Table {
                schema,
                name,
                columns,
            } => {
                self.out.push_str("copy ");
                self.out.push_str(&quote_qualified(schema, name));
                self.out.push_str(" (");
                for (i, col) in columns.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.out.push_str(&quote_ident(col));
                }
                self.out.push_str(") to stdout");
            }
            CopySource::Query(query) => {
                self.out.push_str("copy (");
                self.query(query);
                self.out.push_str(") to stdout");
            }
        }
    }
}

/// Compact dump of a query tree, for plan troubleshooting at debug level.
pub fn explain_query(query: &SqlQuery) -> String {
    let mut out = String::new();
    explain_query_into(&mut out, query, 0);
    out.trim_end().to_string()
}

fn line(out: &mut String, level: usize, text: &str) {
    for _ in 0..level * 2 {
        out.push(' ');
    }
    out.push_str(text);
    out.push('\n');
}

fn explain_query_into(out: &mut String, query: &SqlQuery, level: usize) {
    match query {
        SqlQuery::Select(select) => explain_select(out, select, level),
        SqlQuery::RecursiveCte(cte) => {
            line(out, level, &format!("RecursiveCte {}", cte.name));
            line(out, level + 1, "base:");
            explain_select(out, &cte.base, level + 2);
            line(out, level + 1, "recursive:");
            explain_select(out, &cte.recursive, level + 2);
        }
        SqlQuery::CopyOut(copy) => match &copy.source {
            CopySource::Table { schema, name, .. } => {
                line(out, level, &format!("CopyOut {schema}.{name}"));
            }
            CopySource::Query(query) => {
                line(out, level, "CopyOut");
                explain_query_into(out, query, level + 1);
            }
        },
    }
}

fn explain_select(out: &mut String, select: &Select, level: usize) {
    let columns: Vec<String> = select
        .columns
        .iter()
        .map(|col| match col {
            ColumnExpr::Star => "*".to_string(),
            ColumnExpr::Column { alias: None, name } => name.clone(),
            ColumnExpr::Column {
                alias: Some(alias),
                name,
            } => format!("{alias}.{name}"),
            ColumnExpr::Raw(expr) => expr.clone(),
        })
        .collect();
    let from: Vec<String> = select
        .from
        .iter()
        .map(|entry| match &entry.source {
            FromSource::Table { schema, name } => match &entry.alias {
                Some(alias) => format!("{schema}.{name} as {alias}"),
                None => format!("{schema}.{name}"),
            },
            FromSource::Cte(name) => name.clone(),
        })
        .collect();
    line(out, level, "Select");
    line(out, level + 1, &format!("columns: {}", columns.join(", ")));
    line(out, level + 1, &format!("from: {}", from.join(", ")));
    if let Some(pred) = &select.where_ {
        line(out, level + 1, "where:");
        explain_predicate(out, pred, level + 2);
    }
}

fn explain_predicate(out: &mut String, pred: &Predicate, level: usize) {
    match pred {
        Predicate::Sql(sql) => line(out, level, &format!("sql: {sql}")),
        Predicate::FkeyJoin { fkey, from, to } => {
            line(out, level, &format!("fkey {}: {from} -> {to}", fkey.name));
        }
        Predicate::Exists(query) => {
            line(out, level, "Exists");
            explain_select(out, query, level + 1);
        }
        Predicate::And(conds) => {
            line(out, level, "And");
            for cond in conds {
                explain_predicate(out, cond, level + 1);
            }
        }
        Predicate::Or(conds) => {
            line(out, level, "Or");
            for cond in conds {
                explain_predicate(out, cond, level + 1);
            }
        }
    }
}
