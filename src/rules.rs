//! Dump rules: declarative selectors plus the action to take on the
//! objects they select.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::catalog::object::{DbObject, ObjectKind};

/// What to do with an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    /// No decision yet: no rule matched and nothing references the object.
    /// Equivalent to a skip at emission time.
    #[default]
    Unknown,
    /// Emit nothing and stop dependency propagation here.
    Skip,
    /// Dump every row allowed by `filter` and the extension condition.
    Dump,
    /// Dump only the rows required by dumped rows of other tables.
    Ref,
    /// Matching the rule makes planning fail.
    Error,
}

impl Action {
    /// Parse the action name used in rule files. `unknown` is an internal
    /// state, not a configurable action.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "dump" => Some(Action::Dump),
            "skip" => Some(Action::Skip),
            "error" => Some(Action::Error),
            "ref" => Some(Action::Ref),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Unknown => "unknown",
            Action::Skip => "skip",
            Action::Dump => "dump",
            Action::Ref => "ref",
            Action::Error => "error",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector on an object or schema name: absent, an exact set, or a regular
/// expression in verbose syntax matched from the start of the name.
#[derive(Debug, Clone)]
pub enum NameSelector {
    Any,
    Exact(BTreeSet<String>),
    Pattern(Regex),
}

impl NameSelector {
    pub fn exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameSelector::Exact(names.into_iter().map(Into::into).collect())
    }

    /// Compile a verbose-syntax pattern. Matching is anchored at the start
    /// of the name, not wrapped into the pattern: a pattern ending in a
    /// `# comment` must stay exactly as written.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        let re = RegexBuilder::new(pattern).ignore_whitespace(true).build()?;
        Ok(NameSelector::Pattern(re))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameSelector::Any => true,
            NameSelector::Exact(names) => names.contains(name),
            // The leftmost match starts at 0 whenever a match at 0 exists.
            NameSelector::Pattern(re) => re.find(name).is_some_and(|m| m.start() == 0),
        }
    }
}

/// A rule from the configuration: selectors choosing database objects, the
/// action to apply to them, and the action's options.
#[derive(Debug, Clone)]
pub struct DumpRule {
    pub names: NameSelector,
    pub schemas: NameSelector,
    pub kinds: BTreeSet<ObjectKind>,
    pub adjust_score: i64,
    pub action: Action,
    /// Columns to leave out of the dumped data.
    pub no_columns: Vec<String>,
    /// Column name to SQL scalar expression substituted for it.
    pub replace: BTreeMap<String, String>,
    /// SQL predicate restricting the dumped rows.
    pub filter: Option<String>,
    /// Where the rule was defined, for diagnostics.
    pub pos: Option<String>,
}

impl DumpRule {
    pub fn new(action: Action) -> Self {
        Self {
            names: NameSelector::Any,
            schemas: NameSelector::Any,
            kinds: BTreeSet::new(),
            adjust_score: 0,
            action,
            no_columns: Vec::new(),
            replace: BTreeMap::new(),
            filter: None,
            pos: None,
        }
    }

    /// The score of the rule: the higher the stronger. Exact selectors beat
    /// patterns, names beat schemas, schemas beat kinds.
    pub fn score(&self) -> i64 {
        let mut score = self.adjust_score;
        score += match &self.names {
            NameSelector::Exact(_) => 1000,
            NameSelector::Pattern(_) => 500,
            NameSelector::Any => 0,
        };
        score += match &self.schemas {
            NameSelector::Exact(_) => 100,
            NameSelector::Pattern(_) => 50,
            NameSelector::Any => 0,
        };
        if !self.kinds.is_empty() {
            score += 10;
        }
        score
    }

    /// The position where the rule was parsed, for error messages.
    pub fn display_pos(&self) -> &str {
        self.pos.as_deref().unwrap_or("<unknown position>")
    }

    /// Whether every selector of the rule holds on the object.
    pub fn matches(&self, obj: &DbObject) -> bool {
        if !self.names.matches(obj.name()) {
            return false;
        }
        if !self.schemas.matches(obj.schema()) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&obj.kind()) {
            return false;
        }
        true
    }
}
