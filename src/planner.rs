//! Statement generation: for every table to be dumped, the import statement
//! and the `copy ... to stdout` source, planned as a query tree when the
//! dump is selective.

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::object::Oid;
use crate::catalog::table::{Column, ForeignKey, Table};
use crate::catalog::Database;
use crate::matching::Match;
use crate::query::{
    maybe_and, maybe_or, AliasGen, ColumnExpr, CopyOut, CopySource, FromEntry, Predicate,
    RecursiveCte, Select, SqlQuery,
};
use crate::render::{explain_query, quote_ident, quote_qualified, render_query};
use crate::rules::Action;

/// The matches of every object, keyed by OID.
pub type MatchMap = BTreeMap<Oid, Match>;

/// The outcome of planning one table.
#[derive(Debug, Default)]
pub struct TablePlan {
    /// The table has no columns: nothing to dump, force a skip.
    pub force_skip: bool,
    pub errors: Vec<String>,
    pub query: Option<SqlQuery>,
    pub copy_statement: Option<String>,
    pub import_statement: Option<String>,
}

/// Plan the statements for a table whose action is `dump` or `ref`.
pub fn plan_table(db: &Database, table: &Table, matches: &MatchMap) -> TablePlan {
    let Some(m) = matches.get(&table.oid) else {
        return TablePlan::default();
    };
    let mut plan = TablePlan::default();

    if table.columns.is_empty() {
        plan.force_skip = true;
        return plan;
    }

    check_columns(table, m, &mut plan.errors);
    let kept = kept_columns(table, m);
    if kept.is_empty() {
        plan.errors
            .push("every column is omitted: use a 'skip' action instead".to_string());
    }
    if !plan.errors.is_empty() {
        return plan;
    }

    plan.import_statement = Some(import_statement(table, &kept));

    let copy = if can_copy_directly(table, m) {
        CopyOut {
            source: CopySource::Table {
                schema: table.schema.clone(),
                name: table.name.clone(),
                columns: kept.iter().map(|c| c.name.clone()).collect(),
            },
        }
    } else {
        let query = build_table_query(db, table, m, matches);
        debug!("planned query for table {}:\n{}", table.ident(), explain_query(&query));
        let copy = CopyOut {
            source: CopySource::Query(Box::new(query.clone())),
        };
        plan.query = Some(query);
        copy
    };
    plan.copy_statement = Some(render_query(&SqlQuery::CopyOut(copy)));
    plan
}

/// Every name in `no_columns` and every key of `replace` must exist in the
/// table.
fn check_columns(table: &Table, m: &Match, errors: &mut Vec<String>) {
    let missing: Vec<&str> = m
        .no_columns
        .iter()
        .filter(|name| table.get_column(name).is_none())
        .map(String::as_str)
        .sorted()
        .collect();
    if !missing.is_empty() {
        errors.push(format!(
            "no column {} to omit through 'no_columns'",
            missing.iter().map(|name| format!("'{name}'")).join(", ")
        ));
    }

    let missing: Vec<&str> = m
        .replace
        .keys()
        .filter(|name| table.get_column(name).is_none())
        .map(String::as_str)
        .sorted()
        .collect();
    if !missing.is_empty() {
        errors.push(format!(
            "no column {} to replace through 'replace'",
            missing.iter().map(|name| format!("'{name}'")).join(", ")
        ));
    }
}

/// The columns that end up in the dump: definition order, minus the omitted
/// ones, minus generated columns, which `copy ... from` cannot load.
fn kept_columns<'a>(table: &'a Table, m: &Match) -> Vec<&'a Column> {
    table
        .columns
        .iter()
        .filter(|col| !m.no_columns.contains(&col.name) && col.generated.is_none())
        .collect()
}

fn import_statement(table: &Table, kept: &[&Column]) -> String {
    format!(
        "copy {} ({}) from stdin;",
        quote_qualified(&table.schema, &table.name),
        kept.iter().map(|col| quote_ident(&col.name)).join(", ")
    )
}

/// Whether a plain `copy table (columns) to stdout` is enough: a full dump
/// with no replacement, no filtering, no extension condition and no inbound
/// reference from another table.
fn can_copy_directly(table: &Table, m: &Match) -> bool {
    m.action == Action::Dump
        && m.replace.is_empty()
        && trimmed_filter(m).is_none()
        && extcondition_predicate(table).is_none()
        && !m.referenced_by.iter().any(|f| !f.is_self_referential())
}

fn trimmed_filter(m: &Match) -> Option<&str> {
    m.filter
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// The extension dump condition as a predicate, with any leading `where`
/// stripped. An empty condition means "dump everything": no predicate.
fn extcondition_predicate(table: &Table) -> Option<String> {
    static LEADING_WHERE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)\A\s*where\s+").expect("static pattern"));
    let cond = table.extcondition.as_deref()?;
    let stripped = LEADING_WHERE.replace(cond, "").trim().to_string();
    if stripped.is_empty() { None } else { Some(stripped) }
}

/// Build the select tree for a selective dump of `table`.
fn build_table_query(db: &Database, table: &Table, m: &Match, matches: &MatchMap) -> SqlQuery {
    let mut aliases = AliasGen::new();
    let alias = aliases.next_alias();
    let mut path = Vec::new();
    let conds = table_conditions(db, matches, table, &alias, &mut aliases, &mut path);
    let base = Select {
        columns: output_columns(table, m, None),
        from: vec![FromEntry::table(table, alias)],
        where_: maybe_and(conds),
    };

    let selfref: Vec<&ForeignKey> = m
        .referenced_by
        .iter()
        .filter(|f| f.is_self_referential())
        .collect();
    if selfref.is_empty() {
        return SqlQuery::Select(base);
    }

    // The rows selected above, plus every row they reach through the
    // self-referential keys, deduplicated by the union.
    let cte_name = aliases.next_alias();
    let rec_alias = aliases.next_alias();
    let joins = selfref
        .into_iter()
        .map(|fkey| Predicate::FkeyJoin {
            fkey: fkey.clone(),
            from: cte_name.clone(),
            to: rec_alias.clone(),
        })
        .collect();
    let recursive = Select {
        columns: output_columns(table, m, Some(&rec_alias)),
        from: vec![
            FromEntry::table(table, rec_alias.clone()),
            FromEntry::cte(cte_name.clone()),
        ],
        where_: maybe_or(joins),
    };
    SqlQuery::RecursiveCte(RecursiveCte {
        name: cte_name,
        base,
        recursive,
    })
}

/// The conditions restricting the rows of `table` under the given alias:
/// the extension condition, the rule's filter, and for a `ref` table the
/// closure over its referrers.
fn table_conditions(
    db: &Database,
    matches: &MatchMap,
    table: &Table,
    alias: &str,
    aliases: &mut AliasGen,
    path: &mut Vec<Oid>,
) -> Vec<Predicate> {
    let Some(m) = matches.get(&table.oid) else {
        return Vec::new();
    };
    let mut conds = Vec::new();
    if let Some(cond) = extcondition_predicate(table) {
        conds.push(Predicate::Sql(cond));
    }
    if let Some(filter) = trimmed_filter(m) {
        conds.push(Predicate::Sql(filter.to_string()));
    }
    if m.action == Action::Ref {
        path.push(table.oid);
        if let Some(cond) = referrer_conditions(db, matches, table, alias, aliases, path) {
            conds.push(cond);
        }
        path.pop();
    }
    conds
}

/// The disjunction of one `exists` subquery per referrer: a row of `table`
/// is needed when a dumped row of a referencing table still points at it.
fn referrer_conditions(
    db: &Database,
    matches: &MatchMap,
    table: &Table,
    to_alias: &str,
    aliases: &mut AliasGen,
    path: &mut Vec<Oid>,
) -> Option<Predicate> {
    let m = matches.get(&table.oid)?;
    let mut branches = Vec::new();
    for fkey in &m.referenced_by {
        // Self-referential keys are closed over by the recursive query.
        if fkey.is_self_referential() {
            continue;
        }
        let Some(rtable) = db.table(fkey.table_oid) else {
            continue;
        };
        if path.contains(&rtable.oid) {
            warn!(
                "not following the circular reference of {} back into table {}",
                rtable.ident(),
                table.ident()
            );
            continue;
        }
        let alias = aliases.next_alias();
        let mut conds = vec![Predicate::FkeyJoin {
            fkey: fkey.clone(),
            from: alias.clone(),
            to: to_alias.to_string(),
        }];
        conds.extend(table_conditions(db, matches, rtable, &alias, aliases, path));
        branches.push(Predicate::Exists(Box::new(Select {
            columns: vec![ColumnExpr::Raw("1".to_string())],
            from: vec![FromEntry::table(rtable, alias)],
            where_: maybe_and(conds),
        })));
    }
    maybe_or(branches)
}

/// The output columns of a selective dump: kept columns in definition
/// order, with `replace` expressions substituted verbatim.
fn output_columns(table: &Table, m: &Match, alias: Option<&str>) -> Vec<ColumnExpr> {
    table
        .columns
        .iter()
        .filter(|col| !m.no_columns.contains(&col.name) && col.generated.is_none())
        .map(|col| match m.replace.get(&col.name) {
            Some(expr) => ColumnExpr::Raw(format!("({expr})")),
            None => match alias {
                Some(alias) => ColumnExpr::qualified(alias, &col.name),
                None => ColumnExpr::name(&col.name),
            },
        })
        .collect()
}
