//! The dump orchestrator: match rules, propagate dependencies, plan the
//! statements, then hand every object to a writer in kind order.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::catalog::object::{DbObject, ObjectKind, Oid};
use crate::catalog::Database;
use crate::error::DumpError;
use crate::matching::{Match, RuleMatcher};
use crate::planner::{self, MatchMap};
use crate::rules::{Action, DumpRule};
use crate::writer::Writer;

/// Lifecycle of a dump run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DumpState {
    Empty,
    Configured,
    Planned,
    Emitting,
    Done,
    Errored,
}

/// Drives a selective dump over a loaded schema graph.
pub struct Dumper {
    db: Database,
    matcher: RuleMatcher,
    matches: MatchMap,
    state: DumpState,
}

impl Dumper {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            matcher: RuleMatcher::new(),
            matches: MatchMap::new(),
            state: DumpState::Empty,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The matches computed by `plan_dump`, keyed by object OID.
    pub fn matches(&self) -> &MatchMap {
        &self.matches
    }

    pub fn match_for(&self, oid: Oid) -> Option<&Match> {
        self.matches.get(&oid)
    }

    /// Add a rule set. Every set is appended; precedence is by score, not
    /// by insertion order.
    pub fn add_rules(&mut self, rules: Vec<DumpRule>) -> Result<(), DumpError> {
        match self.state {
            DumpState::Empty | DumpState::Configured => {}
            _ => {
                return Err(DumpError::Dump(
                    "rules cannot be added after planning".to_string(),
                ));
            }
        }
        self.matcher.add_rules(rules);
        self.state = DumpState::Configured;
        Ok(())
    }

    /// Run matching, the two dependency-propagation passes, and statement
    /// generation. Every problem found is reported at once; any problem is
    /// fatal.
    pub fn plan_dump(&mut self) -> Result<(), DumpError> {
        if self.state != DumpState::Configured {
            return Err(DumpError::Dump(
                "plan_dump called before any rule set was added".to_string(),
            ));
        }

        self.create_matches();
        Self::propagate_fkeys(&self.db, &mut self.matches);
        Self::propagate_sequences(&self.db, &mut self.matches);
        self.generate_statements();

        let messages = self.collect_errors();
        if messages.is_empty() {
            self.state = DumpState::Planned;
            Ok(())
        } else {
            self.state = DumpState::Errored;
            Err(DumpError::Config { messages })
        }
    }

    fn create_matches(&mut self) {
        for obj in self.db.iter() {
            let m = self.matcher.match_object(obj);
            self.matches.insert(obj.oid(), m);
        }
    }

    /// Pass A: follow outbound foreign keys from every table to be dumped.
    /// Referenced tables are promoted from `unknown` to `ref` and collect
    /// the keys pointing at them; `skip` and `error` are terminal and stop
    /// the navigation. Loops are broken by a visited set per start table;
    /// self-referential keys are recorded but left to the query planner.
    fn propagate_fkeys(db: &Database, matches: &mut MatchMap) {
        let starts: Vec<Oid> = db
            .iter()
            .filter_map(DbObject::as_table)
            .filter(|t| {
                matches
                    .get(&t.oid)
                    .is_some_and(|m| matches!(m.action, Action::Dump | Action::Ref))
            })
            .map(|t| t.oid)
            .collect();

        for start in starts {
            let mut seen = HashSet::from([start]);
            let mut stack = vec![start];
            while let Some(oid) = stack.pop() {
                let Some(table) = db.table(oid) else { continue };
                for fkey in &table.fkeys {
                    let Some(fmatch) = matches.get_mut(&fkey.ftable_oid) else {
                        continue;
                    };
                    match fmatch.action {
                        Action::Skip | Action::Error => continue,
                        Action::Unknown => fmatch.action = Action::Ref,
                        Action::Dump | Action::Ref => {}
                    }
                    fmatch.add_referrer(fkey);
                    if !fkey.is_self_referential() && seen.insert(fkey.ftable_oid) {
                        stack.push(fkey.ftable_oid);
                    }
                }
            }
        }
    }

    /// Pass B: a sequence still `unknown` is promoted to `ref` when some
    /// dumped table feeds a column from it and that column is neither
    /// omitted nor replaced.
    fn propagate_sequences(db: &Database, matches: &mut MatchMap) {
        let seq_oids: Vec<Oid> = db
            .iter()
            .filter(|o| o.kind() == ObjectKind::Sequence)
            .map(DbObject::oid)
            .filter(|oid| {
                matches
                    .get(oid)
                    .is_some_and(|m| m.action == Action::Unknown)
            })
            .collect();

        for seq_oid in seq_oids {
            let used = db.tables_using_sequence(seq_oid).into_iter().any(
                |(table, column)| match matches.get(&table.oid) {
                    Some(tm) => {
                        matches!(tm.action, Action::Dump | Action::Ref)
                            && !tm.no_columns.contains(&column.name)
                            && !tm.replace.contains_key(&column.name)
                    }
                    None => false,
                },
            );
            if used
                && let Some(sm) = matches.get_mut(&seq_oid)
            {
                sm.action = Action::Ref;
            }
        }
    }

    fn generate_statements(&mut self) {
        let oids: Vec<Oid> = self
            .db
            .iter()
            .filter_map(DbObject::as_table)
            .filter(|t| {
                self.matches
                    .get(&t.oid)
                    .is_some_and(|m| matches!(m.action, Action::Dump | Action::Ref))
            })
            .map(|t| t.oid)
            .collect();

        for oid in oids {
            let Some(table) = self.db.table(oid) else { continue };
            let ident = table.ident();
            let plan = planner::plan_table(&self.db, table, &self.matches);
            let Some(m) = self.matches.get_mut(&oid) else {
                continue;
            };
            if plan.force_skip {
                info!("table {ident} has no columns: skipping");
                m.action = Action::Skip;
                continue;
            }
            m.errors.extend(plan.errors);
            m.query = plan.query;
            m.copy_statement = plan.copy_statement;
            m.import_statement = plan.import_statement;
        }
    }

    fn collect_errors(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for obj in self.db.iter() {
            let Some(m) = self.matches.get(&obj.oid()) else {
                continue;
            };
            for err in &m.errors {
                messages.push(format!("{} {}: {err}", obj.kind(), obj.ident()));
            }
        }
        messages
    }

    /// Hand every planned object to the writer: tables first, then
    /// sequences, so a restored sequence value is never behind the data
    /// that consumed it, then materialised views.
    pub async fn emit<W: Writer>(&mut self, writer: &mut W) -> Result<(), DumpError> {
        if self.state != DumpState::Planned {
            return Err(DumpError::Dump(
                "emit called before the dump was planned".to_string(),
            ));
        }
        self.state = DumpState::Emitting;
        match self.emit_objects(writer).await {
            Ok(()) => {
                self.state = DumpState::Done;
                Ok(())
            }
            Err(err) => {
                self.state = DumpState::Errored;
                Err(err)
            }
        }
    }

    async fn emit_objects<W: Writer>(&self, writer: &mut W) -> Result<(), DumpError> {
        writer.begin_dump().await?;

        let kind_order: [&[ObjectKind]; 3] = [
            &[ObjectKind::Table, ObjectKind::PartitionedTable],
            &[ObjectKind::Sequence],
            &[ObjectKind::MaterializedView],
        ];
        for kinds in kind_order {
            for obj in self.db.iter().filter(|o| kinds.contains(&o.kind())) {
                let Some(m) = self.matches.get(&obj.oid()) else {
                    continue;
                };
                match m.action {
                    Action::Unknown => {
                        debug!(
                            "{} {} doesn't match any rule: skipping",
                            obj.kind(),
                            obj.ident()
                        );
                    }
                    Action::Skip | Action::Error => {
                        debug!("skipping {} {}", obj.kind(), obj.ident());
                    }
                    Action::Dump | Action::Ref => {
                        info!("dumping {} {}", obj.kind(), obj.ident());
                        match obj {
                            DbObject::Table(t) | DbObject::PartitionedTable(t) => {
                                writer.dump_table(t, m).await?;
                            }
                            DbObject::Sequence(s) => writer.dump_sequence(s, m).await?,
                            DbObject::MaterializedView(v) => {
                                writer.dump_materialized_view(v, m).await?;
                            }
                        }
                    }
                }
            }
        }

        writer.end_dump().await
    }
}
