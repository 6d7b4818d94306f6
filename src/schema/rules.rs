// src/schema/rules.rs

use std::fmt;

/// Scalar types a column can be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Integer,
    Boolean,
    String,
    Date,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetType::Integer => "integer",
            TargetType::Boolean => "boolean",
            TargetType::String => "string",
            TargetType::Date => "date",
        };
        f.write_str(s)
    }
}

/// How a rule looks at a column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Name ends with any of the patterns.
    Suffix(&'static [&'static str]),
    /// Name starts with any of the patterns.
    Prefix(&'static [&'static str]),
}

impl Matcher {
    pub fn matches(&self, column: &str) -> bool {
        match self {
            Matcher::Suffix(patterns) => patterns.iter().any(|p| column.ends_with(p)),
            Matcher::Prefix(patterns) => patterns.iter().any(|p| column.starts_with(p)),
        }
    }
}

/// What happens to a matching column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Plain cast.
    Cast(TargetType),
    /// Values equal to `truthy` become `true`, everything else (null included) `false`.
    Flag { truthy: &'static str },
}

impl Coercion {
    pub fn target(&self) -> TargetType {
        match self {
            Coercion::Cast(t) => *t,
            Coercion::Flag { .. } => TargetType::Boolean,
        }
    }
}

/// Which schemas a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    AnySchema,
    /// Only the configured primary schema.
    PrimarySchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub coercion: Coercion,
    pub scope: RuleScope,
}

impl TypeRule {
    pub fn applies_to(&self, column: &str, schema: &str, primary_schema: &str) -> bool {
        let in_scope = match self.scope {
            RuleScope::AnySchema => true,
            RuleScope::PrimarySchema => schema == primary_schema,
        };
        in_scope && self.matcher.matches(column)
    }
}

/// Naming-convention rules, evaluated top to bottom.
///
/// Rules are independent checks: every matching rule is applied in this order,
/// so the last match decides the final type.
pub const DEFAULT_RULES: &[TypeRule] = &[
    TypeRule {
        name: "id",
        matcher: Matcher::Suffix(&["_id"]),
        coercion: Coercion::Cast(TargetType::Integer),
        scope: RuleScope::PrimarySchema,
    },
    TypeRule {
        name: "integer",
        matcher: Matcher::Suffix(&[
            "_count",
            "_num",
            "_number",
            "_ms",
            "popularity",
            "_tracks",
            "bpm",
        ]),
        coercion: Coercion::Cast(TargetType::Integer),
        scope: RuleScope::AnySchema,
    },
    TypeRule {
        name: "boolean",
        matcher: Matcher::Prefix(&["explicit", "is_"]),
        coercion: Coercion::Flag { truthy: "t" },
        scope: RuleScope::AnySchema,
    },
    TypeRule {
        name: "string",
        matcher: Matcher::Suffix(&["_name", "_letter", "_url", "_uuid"]),
        coercion: Coercion::Cast(TargetType::String),
        scope: RuleScope::AnySchema,
    },
    TypeRule {
        name: "date",
        matcher: Matcher::Suffix(&["_on", "_date"]),
        coercion: Coercion::Cast(TargetType::Date),
        scope: RuleScope::AnySchema,
    },
];

/// A rule table bound to the schema whose `_id` columns are integers.
#[derive(Debug, Clone)]
pub struct TypeRules {
    rules: Vec<TypeRule>,
    primary_schema: String,
}

impl TypeRules {
    pub fn new(rules: &[TypeRule], primary_schema: impl Into<String>) -> Self {
        Self {
            rules: rules.to_vec(),
            primary_schema: primary_schema.into(),
        }
    }

    pub fn with_defaults(primary_schema: impl Into<String>) -> Self {
        Self::new(DEFAULT_RULES, primary_schema)
    }

    pub fn rules(&self) -> &[TypeRule] {
        &self.rules
    }

    /// Every rule that fires for `column` in `schema`, in application order.
    pub fn matching<'a>(
        &'a self,
        column: &'a str,
        schema: &'a str,
    ) -> impl Iterator<Item = &'a TypeRule> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.applies_to(column, schema, &self.primary_schema))
    }

    /// Final coerced type of `column`, or `None` when no rule fires.
    pub fn resolve(&self, column: &str, schema: &str) -> Option<TargetType> {
        self.matching(column, schema)
            .last()
            .map(|r| r.coercion.target())
    }
}
