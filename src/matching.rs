//! Matching database objects against dump rules.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::object::DbObject;
use crate::catalog::table::ForeignKey;
use crate::query::SqlQuery;
use crate::rules::{Action, DumpRule};

/// The decision taken for one database object: the action chosen by rule
/// matching and dependency propagation, the options inherited from the
/// winning rule, and the statements generated for it.
///
/// Created during matching, mutated by the resolver and the statement
/// generator, read-only from emission on.
#[derive(Debug, Default)]
pub struct Match {
    pub action: Action,
    /// Position of the rule that produced the match, for diagnostics.
    pub rule_pos: Option<String>,
    pub no_columns: Vec<String>,
    pub replace: BTreeMap<String, String>,
    pub filter: Option<String>,
    /// Inbound foreign keys that caused this object to be marked `ref`.
    pub referenced_by: Vec<ForeignKey>,
    /// Problems found while matching and planning. Reported together; any
    /// entry makes the whole plan fatal.
    pub errors: Vec<String>,
    /// The planned select tree, when the dump is selective.
    pub query: Option<SqlQuery>,
    /// The rendered `copy ... to stdout` statement.
    pub copy_statement: Option<String>,
    /// The rendered `copy ... from stdin;` statement for the restore.
    pub import_statement: Option<String>,
}

impl Match {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_action(action: Action) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    pub fn from_rule(rule: &DumpRule) -> Self {
        let mut m = Self::with_action(rule.action);
        m.rule_pos = rule.pos.clone();
        m.no_columns = rule.no_columns.clone();
        m.replace = rule.replace.clone();
        m.filter = rule.filter.clone();
        if rule.action == Action::Error {
            m.errors.push(match &rule.pos {
                Some(pos) => format!("matches the error rule at {pos}"),
                None => "matches an error rule".to_string(),
            });
        }
        m
    }

    /// Record a referrer foreign key, once.
    pub fn add_referrer(&mut self, fkey: &ForeignKey) {
        let known = self
            .referenced_by
            .iter()
            .any(|f| f.name == fkey.name && f.table_oid == fkey.table_oid);
        if !known {
            self.referenced_by.push(fkey.clone());
        }
    }
}

/// Holds the configured rules and picks the best one for each object.
#[derive(Debug, Default)]
pub struct RuleMatcher {
    rules: Vec<DumpRule>,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule set. Precedence between sets is by score, not by
    /// insertion order.
    pub fn add_rules(&mut self, rules: Vec<DumpRule>) {
        self.rules.extend(rules);
    }

    /// The initial match for an object, before dependency propagation.
    pub fn match_object(&self, obj: &DbObject) -> Match {
        // Extension members manage their own data unless the extension
        // declared a dump condition.
        if let Some(extension) = obj.extension()
            && obj.extcondition().is_none()
        {
            debug!(
                "{} {} belongs to extension {}: skipping",
                obj.kind(),
                obj.ident(),
                extension
            );
            return Match::with_action(Action::Skip);
        }

        let mut candidates: Vec<&DumpRule> =
            self.rules.iter().filter(|r| r.matches(obj)).collect();
        if candidates.is_empty() {
            return Match::unknown();
        }
        candidates.sort_by_key(|r| std::cmp::Reverse(r.score()));
        if candidates.len() > 1 && candidates[0].score() == candidates[1].score() {
            let mut m = Match::unknown();
            m.errors.push(format!(
                "matches more than one rule: at {} and {}",
                candidates[0].display_pos(),
                candidates[1].display_pos()
            ));
            return m;
        }

        debug!(
            "{} {} matches rule at {}",
            obj.kind(),
            obj.ident(),
            candidates[0].display_pos()
        );
        Match::from_rule(candidates[0])
    }
}
