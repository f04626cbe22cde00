//! Loading and validation of YAML rule files.
//!
//! A rule document has a single top-level `db_objects` list. The input
//! structs are permissive (every field optional) so that all the problems in
//! a file can be collected and reported together; `rules_from_document` does
//! the actual validation. The YAML parser does not expose line numbers, so
//! positions are reported as `<file>:db_objects[<index>]`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::catalog::object::ObjectKind;
use crate::error::DumpError;
use crate::rules::{Action, DumpRule, NameSelector};

/// A parsed rule file.
#[derive(Debug, Deserialize)]
pub struct RulesDocument {
    pub db_objects: Vec<RuleInput>,
}

/// One entry of the `db_objects` list, as parsed from YAML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuleInput {
    pub name: Option<String>,
    pub names: Option<NamesInput>,
    pub schema: Option<String>,
    pub schemas: Option<NamesInput>,
    pub kind: Option<String>,
    pub kinds: Option<Vec<String>>,
    pub action: Option<String>,
    /// Shorthand for `action: skip`; mutually exclusive with `action`.
    pub skip: Option<bool>,
    pub no_columns: Option<Vec<String>>,
    pub replace: Option<BTreeMap<String, String>>,
    pub filter: Option<String>,
    pub adjust_score: Option<i64>,
    /// Options we don't recognize. Reported as a warning, not an error.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

/// A `names`/`schemas` selector: a list of exact names, or a regex string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NamesInput {
    List(Vec<String>),
    Pattern(String),
}

/// Load a rule file into rules, collecting every problem before failing.
pub fn load_rules(path: &Path) -> Result<Vec<DumpRule>, DumpError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DumpError::config(format!("error loading config file {}: {e}", path.display()))
    })?;
    let doc: RulesDocument = serde_yaml::from_str(&text)
        .map_err(|e| DumpError::config(format!("in {}: {e}", path.display())))?;
    rules_from_document(doc, &path.display().to_string())
}

/// Convert a parsed document into `DumpRule`s, accumulating errors so the
/// operator sees every problem at once.
pub fn rules_from_document(
    doc: RulesDocument,
    filename: &str,
) -> Result<Vec<DumpRule>, DumpError> {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for (idx, input) in doc.db_objects.into_iter().enumerate() {
        let pos = format!("{}:db_objects[{}]", filename, idx + 1);
        match rule_from_input(input, &pos) {
            Ok(rule) => rules.push(rule),
            Err(mut errs) => errors.append(&mut errs),
        }
    }
    if errors.is_empty() {
        Ok(rules)
    } else {
        Err(DumpError::Config { messages: errors })
    }
}

fn rule_from_input(input: RuleInput, pos: &str) -> Result<DumpRule, Vec<String>> {
    let mut errors = Vec::new();

    if !input.unknown.is_empty() {
        let unks = input
            .unknown
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        warn!("unknown config option(s): {unks}, at {pos}");
    }

    if input.name.is_some() && input.names.is_some() {
        errors.push(format!("can't specify both 'name' and 'names', at {pos}"));
    }
    let names = match (input.name, input.names) {
        (Some(name), _) => NameSelector::exact([name]),
        (None, Some(NamesInput::List(names))) => NameSelector::exact(names),
        (None, Some(NamesInput::Pattern(pattern))) => NameSelector::pattern(&pattern)
            .unwrap_or_else(|e| {
                errors.push(format!(
                    "'names' is not a valid regular expression: {e}, at {pos}"
                ));
                NameSelector::Any
            }),
        (None, None) => NameSelector::Any,
    };

    if input.schema.is_some() && input.schemas.is_some() {
        errors.push(format!(
            "can't specify both 'schema' and 'schemas', at {pos}"
        ));
    }
    let schemas = match (input.schema, input.schemas) {
        (Some(schema), _) => NameSelector::exact([schema]),
        (None, Some(NamesInput::List(schemas))) => NameSelector::exact(schemas),
        (None, Some(NamesInput::Pattern(pattern))) => NameSelector::pattern(&pattern)
            .unwrap_or_else(|e| {
                errors.push(format!(
                    "'schemas' is not a valid regular expression: {e}, at {pos}"
                ));
                NameSelector::Any
            }),
        (None, None) => NameSelector::Any,
    };

    if input.kind.is_some() && input.kinds.is_some() {
        errors.push(format!("can't specify both 'kind' and 'kinds', at {pos}"));
    }
    let mut kinds = std::collections::BTreeSet::new();
    let kind_names: Vec<String> = input
        .kind
        .into_iter()
        .chain(input.kinds.into_iter().flatten())
        .collect();
    for name in kind_names {
        match ObjectKind::from_config_name(&name) {
            Some(kind) => {
                kinds.insert(kind);
            }
            None => errors.push(format!(
                "bad 'kind': '{name}'; accepted values are: materialized view, \
                 partitioned table, sequence, table, at {pos}"
            )),
        }
    }

    if input.action.is_some() && input.skip.is_some() {
        errors.push(format!("can't specify both 'skip' and 'action', at {pos}"));
    }
    let action = match (input.action, input.skip) {
        (Some(name), _) => match Action::from_config_name(&name.to_lowercase()) {
            Some(action) => action,
            None => {
                errors.push(format!(
                    "bad 'action': '{name}'; accepted values are dump, skip, error, \
                     ref, at {pos}"
                ));
                Action::Dump
            }
        },
        (None, Some(true)) => Action::Skip,
        (None, Some(false)) | (None, None) => Action::Dump,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut rule = DumpRule::new(action);
    rule.names = names;
    rule.schemas = schemas;
    rule.kinds = kinds;
    rule.no_columns = input.no_columns.unwrap_or_default();
    rule.replace = input.replace.unwrap_or_default();
    rule.filter = input.filter;
    rule.adjust_score = input.adjust_score.unwrap_or(0);
    rule.pos = Some(pos.to_string());
    Ok(rule)
}
