use rstest::rstest;

use pgsieve::catalog::matview::MaterializedView;
use pgsieve::catalog::object::{DbObject, Oid};
use pgsieve::catalog::sequence::Sequence;
use pgsieve::catalog::table::Table;
use pgsieve::error::DumpError;
use pgsieve::matching::Match;
use pgsieve::rules::Action;
use pgsieve::writer::Writer;

use crate::helpers::{dumper_with_rules, oid_of, sample_db};

/// Collects the dumped objects instead of writing anything.
#[derive(Debug, Default)]
struct TestWriter {
    begun: bool,
    ended: bool,
    dumped: Vec<String>,
}

impl Writer for TestWriter {
    async fn begin_dump(&mut self) -> Result<(), DumpError> {
        self.begun = true;
        Ok(())
    }

    async fn dump_table(&mut self, table: &Table, _m: &Match) -> Result<(), DumpError> {
        self.dumped.push(format!("table {}", table.ident()));
        Ok(())
    }

    async fn dump_sequence(&mut self, seq: &Sequence, _m: &Match) -> Result<(), DumpError> {
        self.dumped.push(format!("sequence {}", seq.ident()));
        Ok(())
    }

    async fn dump_materialized_view(
        &mut self,
        view: &MaterializedView,
        _m: &Match,
    ) -> Result<(), DumpError> {
        self.dumped.push(format!("materialized view {}", view.ident()));
        Ok(())
    }

    async fn end_dump(&mut self) -> Result<(), DumpError> {
        self.ended = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DumpError> {
        Ok(())
    }
}

#[test]
fn a_filtered_dump_closes_over_the_reference_chain() {
    let db = sample_db(
        4,
        &[
            ("table1", "t2id", "table2", "id"),
            ("table2", "t3id", "table3", "id"),
        ],
    );
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table1\n  filter: \"data <= 'c'\"\n");
    dumper.plan_dump().unwrap();

    let t1 = oid_of(dumper.db(), "table1");
    let t2 = oid_of(dumper.db(), "table2");
    let t3 = oid_of(dumper.db(), "table3");
    let t4 = oid_of(dumper.db(), "table4");

    assert_eq!(dumper.match_for(t1).unwrap().action, Action::Dump);
    assert_eq!(dumper.match_for(t2).unwrap().action, Action::Ref);
    assert_eq!(dumper.match_for(t3).unwrap().action, Action::Ref);
    assert_eq!(dumper.match_for(t4).unwrap().action, Action::Unknown);

    let referrers: Vec<&str> = dumper
        .match_for(t2)
        .unwrap()
        .referenced_by
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(referrers, vec!["t2id_table2_id_fkey"]);

    assert_eq!(
        dumper.match_for(t1).unwrap().copy_statement.as_deref(),
        Some(
            "copy (select \"id\", \"data\", \"t2id\" from only \"public\".\"table1\" \
             as \"t0\" where (data <= 'c')) to stdout"
        )
    );
    assert_eq!(
        dumper.match_for(t2).unwrap().copy_statement.as_deref(),
        Some(concat!(
            "copy (select \"id\", \"data\", \"t3id\" from only \"public\".\"table2\" ",
            "as \"t0\" where exists (",
            "\n    select 1",
            "\n    from only \"public\".\"table1\" as \"t1\"",
            "\n    where (",
            "\n        ((\"t1\".\"t2id\") = (\"t0\".\"id\"))",
            "\n        and (data <= 'c')))) to stdout"
        ))
    );
    assert_eq!(
        dumper.match_for(t3).unwrap().copy_statement.as_deref(),
        Some(concat!(
            "copy (select \"id\", \"data\" from only \"public\".\"table3\" ",
            "as \"t0\" where exists (",
            "\n    select 1",
            "\n    from only \"public\".\"table2\" as \"t1\"",
            "\n    where (",
            "\n        ((\"t1\".\"t3id\") = (\"t0\".\"id\"))",
            "\n        and exists (",
            "\n            select 1",
            "\n            from only \"public\".\"table1\" as \"t2\"",
            "\n            where (",
            "\n                ((\"t2\".\"t2id\") = (\"t1\".\"id\"))",
            "\n                and (data <= 'c')))))) to stdout"
        ))
    );

    // The sequences feeding the dumped tables come along; table4's doesn't.
    for name in ["table1_id_seq", "table2_id_seq", "table3_id_seq"] {
        let seq = oid_of(dumper.db(), name);
        assert_eq!(dumper.match_for(seq).unwrap().action, Action::Ref, "{name}");
    }
    let seq4 = oid_of(dumper.db(), "table4_id_seq");
    assert_eq!(dumper.match_for(seq4).unwrap().action, Action::Unknown);
}

#[test]
fn omitted_and_replaced_columns_shape_both_statements() {
    let mut db = sample_db(1, &[]);
    let t1 = oid_of(&db, "table1");
    db.table_mut(t1).unwrap().columns.push(
        pgsieve::catalog::table::Column::new("password", "text"),
    );

    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n  no_columns: [password]\n  replace:\n    data: \"'x'\"\n",
    );
    dumper.plan_dump().unwrap();

    let m = dumper.match_for(t1).unwrap();
    assert_eq!(
        m.import_statement.as_deref(),
        Some("copy \"public\".\"table1\" (\"id\", \"data\") from stdin;")
    );
    assert_eq!(
        m.copy_statement.as_deref(),
        Some("copy (select \"id\", ('x') from only \"public\".\"table1\" as \"t0\") to stdout")
    );
}

#[test]
fn two_parents_share_one_child() {
    let db = sample_db(
        4,
        &[
            ("table1", "t13id", "table3", "id"),
            ("table2", "t23id", "table3", "id"),
            ("table3", "t4id", "table4", "id"),
        ],
    );
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n  filter: data <= 'b'\n\
         - name: table2\n  filter: data <= 'f'\n",
    );
    dumper.plan_dump().unwrap();

    let t3 = oid_of(dumper.db(), "table3");
    let t4 = oid_of(dumper.db(), "table4");

    let referrers: Vec<&str> = dumper
        .match_for(t3)
        .unwrap()
        .referenced_by
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(referrers, vec!["t13id_table3_id_fkey", "t23id_table3_id_fkey"]);

    // table4 keeps the union of what either parent chain requires: its
    // plan disjoins one exists per referrer of table3.
    let copy = dumper.match_for(t4).unwrap().copy_statement.clone().unwrap();
    assert!(copy.contains("or exists ("), "{copy}");
    assert!(copy.contains("((\"t2\".\"t13id\") = (\"t1\".\"id\"))"), "{copy}");
    assert!(copy.contains("((\"t3\".\"t23id\") = (\"t1\".\"id\"))"), "{copy}");
    assert!(copy.contains("(data <= 'b')"), "{copy}");
    assert!(copy.contains("(data <= 'f')"), "{copy}");
}

#[test]
fn rules_with_the_same_score_are_ambiguous() {
    let db = sample_db(1, &[]);
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n\
         - name: table1\n  action: skip\n",
    );
    let err = dumper.plan_dump().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("table public.table1"), "{text}");
    assert!(
        text.contains(
            "matches more than one rule: at test.yaml:db_objects[1] and test.yaml:db_objects[2]"
        ),
        "{text}"
    );
}

#[test]
fn a_self_referential_table_dumps_its_ancestors() {
    let db = sample_db(1, &[("table1", "parent_id", "table1", "id")]);
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table1\n  filter: data = 'e'\n");
    dumper.plan_dump().unwrap();

    let t1 = oid_of(dumper.db(), "table1");
    assert_eq!(
        dumper.match_for(t1).unwrap().copy_statement.as_deref(),
        Some(concat!(
            "copy (with recursive \"t1\" as (",
            "\n    select \"id\", \"data\", \"parent_id\"",
            "\n    from only \"public\".\"table1\" as \"t0\"",
            "\n    where (data = 'e')",
            "\nunion",
            "\n    select \"t2\".\"id\", \"t2\".\"data\", \"t2\".\"parent_id\"",
            "\n    from only \"public\".\"table1\" as \"t2\", \"t1\"",
            "\n    where ((\"t1\".\"parent_id\") = (\"t2\".\"id\"))",
            "\n)",
            "\nselect * from \"t1\") to stdout"
        ))
    );
}

#[test]
fn a_self_referential_table_with_no_rule_is_untouched() {
    let db = sample_db(2, &[("table1", "parent_id", "table1", "id")]);
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table2\n");
    dumper.plan_dump().unwrap();

    let t1 = oid_of(dumper.db(), "table1");
    let m = dumper.match_for(t1).unwrap();
    assert_eq!(m.action, Action::Unknown);
    assert!(m.copy_statement.is_none());
}

#[rstest]
#[case("", true)]
#[case("  no_columns: [data]\n", true)]
#[case("  no_columns: [id]\n", false)]
#[case("  replace:\n    data: \"NULL\"\n", true)]
#[case("  replace:\n    id: \"NULL\"\n", false)]
fn sequences_follow_their_feeding_column(#[case] details: &str, #[case] dumped: bool) {
    let db = sample_db(2, &[]);
    let yaml = format!("db_objects:\n- name: table1\n{details}");
    let mut dumper = dumper_with_rules(db, &yaml);
    dumper.plan_dump().unwrap();

    let seq = oid_of(dumper.db(), "table1_id_seq");
    let expected = if dumped { Action::Ref } else { Action::Unknown };
    assert_eq!(dumper.match_for(seq).unwrap().action, expected);

    // The other table's sequence is never pulled in.
    let other = oid_of(dumper.db(), "table2_id_seq");
    assert_eq!(dumper.match_for(other).unwrap().action, Action::Unknown);
}

#[test]
fn an_explicit_skip_beats_sequence_promotion() {
    let db = sample_db(1, &[]);
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n\
         - kind: sequence\n  action: skip\n",
    );
    dumper.plan_dump().unwrap();

    let seq = oid_of(dumper.db(), "table1_id_seq");
    assert_eq!(dumper.match_for(seq).unwrap().action, Action::Skip);
}

#[test]
fn navigation_stops_at_skipped_tables() {
    let db = sample_db(
        4,
        &[
            ("table1", "t2id", "table2", "id"),
            ("table2", "t3id", "table3", "id"),
            ("table3", "t4id", "table4", "id"),
        ],
    );
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n\
         - name: table3\n  action: skip\n",
    );
    dumper.plan_dump().unwrap();

    assert_eq!(
        dumper
            .match_for(oid_of(dumper.db(), "table2"))
            .unwrap()
            .action,
        Action::Ref
    );
    assert_eq!(
        dumper
            .match_for(oid_of(dumper.db(), "table3"))
            .unwrap()
            .action,
        Action::Skip
    );
    assert_eq!(
        dumper
            .match_for(oid_of(dumper.db(), "table4"))
            .unwrap()
            .action,
        Action::Unknown
    );
}

#[test]
fn reference_cycles_produce_a_finite_plan() {
    let db = sample_db(
        3,
        &[
            ("table3", "t1id", "table1", "id"),
            ("table1", "t2id", "table2", "id"),
            ("table2", "t1id", "table1", "id"),
        ],
    );
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table3\n  filter: data <= 'b'\n");
    dumper.plan_dump().unwrap();

    let t1 = oid_of(dumper.db(), "table1");
    let m = dumper.match_for(t1).unwrap();
    assert_eq!(m.action, Action::Ref);
    assert_eq!(m.referenced_by.len(), 2);

    // The branch through table2 back into table1 is dropped, so table1
    // appears only as the outer target of its own plan.
    let copy = m.copy_statement.clone().unwrap();
    assert_eq!(copy.matches("\"table1\"").count(), 1, "{copy}");
    assert!(copy.contains("\"table3\""), "{copy}");
    assert!(copy.contains("\"table2\""), "{copy}");
}

#[test]
fn error_rules_make_planning_fail() {
    let db = sample_db(1, &[]);
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table1\n  action: error\n");
    let err = dumper.plan_dump().unwrap_err();
    assert!(
        err.to_string()
            .contains("table public.table1: matches the error rule at test.yaml:db_objects[1]")
    );
}

#[test]
fn bad_column_references_are_collected() {
    let db = sample_db(2, &[]);
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n  no_columns: [nope]\n\
         - name: table2\n  replace:\n    missing: \"NULL\"\n",
    );
    let err = dumper.plan_dump().unwrap_err();
    let text = err.to_string();
    assert!(
        text.contains("table public.table1: no column 'nope' to omit through 'no_columns'"),
        "{text}"
    );
    assert!(
        text.contains("table public.table2: no column 'missing' to replace through 'replace'"),
        "{text}"
    );
}

#[test]
fn empty_tables_are_skipped_not_planned() {
    let mut db = sample_db(1, &[]);
    db.add_object(DbObject::Table(Table::new(Oid(150), "public", "emptytab")))
        .unwrap();
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: emptytab\n");
    dumper.plan_dump().unwrap();

    let m = dumper.match_for(Oid(150)).unwrap();
    assert_eq!(m.action, Action::Skip);
    assert!(m.copy_statement.is_none());
}

#[test]
fn planning_is_deterministic() {
    let build = || {
        let db = sample_db(
            3,
            &[
                ("table1", "t2id", "table2", "id"),
                ("table2", "t3id", "table3", "id"),
            ],
        );
        let mut dumper =
            dumper_with_rules(db, "db_objects:\n- name: table1\n  filter: data <= 'c'\n");
        dumper.plan_dump().unwrap();
        let t3 = oid_of(dumper.db(), "table3");
        dumper.match_for(t3).unwrap().copy_statement.clone()
    };
    assert_eq!(build(), build());
}

#[tokio::test]
async fn emission_dispatches_in_kind_order() {
    let mut db = sample_db(2, &[]);
    db.add_object(DbObject::MaterializedView(MaterializedView::new(
        Oid(300),
        "public",
        "mv1",
    )))
    .unwrap();
    let mut dumper = dumper_with_rules(
        db,
        "db_objects:\n\
         - name: table1\n\
         - name: mv1\n",
    );
    dumper.plan_dump().unwrap();

    let mut writer = TestWriter::default();
    dumper.emit(&mut writer).await.unwrap();

    assert!(writer.begun);
    assert!(writer.ended);
    assert_eq!(
        writer.dumped,
        vec![
            "table public.table1".to_string(),
            "sequence public.table1_id_seq".to_string(),
            "materialized view public.mv1".to_string(),
        ]
    );
}

#[tokio::test]
async fn unmatched_objects_are_not_emitted() {
    let db = sample_db(2, &[]);
    let mut dumper = dumper_with_rules(db, "db_objects:\n- name: table1\n");
    dumper.plan_dump().unwrap();

    let mut writer = TestWriter::default();
    dumper.emit(&mut writer).await.unwrap();
    assert!(!writer.dumped.iter().any(|d| d.contains("table2")));
}
