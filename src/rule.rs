//! Transformation rules: named `(pattern, replacement)` pairs applied to text.
//!
//! Target files are treated as opaque text. A rule never parses the source
//! language; it matches a literal substring, a regular expression, or a
//! bounded block and substitutes every occurrence.
//!
//! Rule order is significant: [`RuleSet::apply`] feeds each rule the output
//! of the previous one.

use regex::{NoExpand, Regex};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{rule}': invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}': pattern matches the empty string")]
    MatchesEmpty { rule: String },

    #[error("rule '{rule}': search text is empty")]
    EmptySearch { rule: String },

    #[error("rule set is empty")]
    EmptyRuleSet,

    #[error("rule set is not idempotent: a second pass still changes the file (rules: {rules})")]
    NotIdempotent { rules: String },
}

/// How a rule finds its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPattern {
    /// Exact substring; every occurrence is replaced with literal text.
    Literal(String),
    /// Regular expression; the replacement may use `$1` / `${name}`.
    Regex(String),
    /// A multi-line block from a header line up to the first closing brace
    /// at exactly `indent` columns. The replacement is literal.
    Block { header: String, indent: usize },
}

impl TextPattern {
    /// Regex for a bounded block.
    ///
    /// Consumes the whitespace (including blank lines) before the header so
    /// that removing the block leaves the following lines untouched. The body
    /// is matched non-greedily and stops at the first `}` that sits at column
    /// `indent`; nested braces are indented deeper and never end the match.
    pub fn block_regex(header: &str, indent: usize) -> String {
        format!(
            r"\n\s*{}[\s\S]*?\n[ \t]{{{}}}\}}",
            regex::escape(header),
            indent
        )
    }
}

/// A named transformation rule, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationRule {
    pub name: String,
    pub pattern: TextPattern,
    pub replacement: String,
}

impl TransformationRule {
    pub fn literal(
        name: impl Into<String>,
        search: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: TextPattern::Literal(search.into()),
            replacement: replacement.into(),
        }
    }

    pub fn regex(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: TextPattern::Regex(pattern.into()),
            replacement: replacement.into(),
        }
    }

    pub fn remove_block(name: impl Into<String>, header: impl Into<String>, indent: usize) -> Self {
        Self {
            name: name.into(),
            pattern: TextPattern::Block {
                header: header.into(),
                indent,
            },
            replacement: String::new(),
        }
    }

    /// Compile the pattern. Fails on invalid regex syntax, an empty literal,
    /// or a regex that can match the empty string.
    pub fn compile(&self) -> Result<CompiledRule, RuleError> {
        let matcher = match &self.pattern {
            TextPattern::Literal(search) => {
                if search.is_empty() {
                    return Err(RuleError::EmptySearch {
                        rule: self.name.clone(),
                    });
                }
                Matcher::Literal(search.clone())
            }
            TextPattern::Regex(pattern) => Matcher::Regex {
                regex: self.compile_regex(pattern)?,
                expand: true,
            },
            TextPattern::Block { header, indent } => {
                if header.trim().is_empty() {
                    return Err(RuleError::EmptySearch {
                        rule: self.name.clone(),
                    });
                }
                Matcher::Regex {
                    regex: self.compile_regex(&TextPattern::block_regex(header, *indent))?,
                    expand: false,
                }
            }
        };

        Ok(CompiledRule {
            name: self.name.clone(),
            matcher,
            replacement: self.replacement.clone(),
        })
    }

    fn compile_regex(&self, pattern: &str) -> Result<Regex, RuleError> {
        let regex = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            rule: self.name.clone(),
            source,
        })?;
        if regex.is_match("") {
            return Err(RuleError::MatchesEmpty {
                rule: self.name.clone(),
            });
        }
        Ok(regex)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Regex { regex: Regex, expand: bool },
}

/// A rule ready to run. Pure: the same input always yields the same output.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    matcher: Matcher,
    replacement: String,
}

impl CompiledRule {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the pattern occurs anywhere in `text`.
    pub fn is_present(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(search) => text.contains(search.as_str()),
            Matcher::Regex { regex, .. } => regex.is_match(text),
        }
    }

    /// Replace every occurrence. Borrows when nothing matched.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.matcher {
            Matcher::Literal(search) => {
                if text.contains(search.as_str()) {
                    Cow::Owned(text.replace(search.as_str(), &self.replacement))
                } else {
                    Cow::Borrowed(text)
                }
            }
            Matcher::Regex {
                regex,
                expand: true,
            } => regex.replace_all(text, self.replacement.as_str()),
            Matcher::Regex {
                regex,
                expand: false,
            } => regex.replace_all(text, NoExpand(self.replacement.as_str())),
        }
    }
}

/// An ordered, non-empty sequence of compiled rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile every rule, failing on the first bad one.
    pub fn compile(rules: &[TransformationRule]) -> Result<Self, RuleError> {
        if rules.is_empty() {
            return Err(RuleError::EmptyRuleSet);
        }
        let rules = rules
            .iter()
            .map(TransformationRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Names of the rules whose pattern occurs in `text`.
    pub fn present_in(&self, text: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| rule.is_present(text))
            .map(CompiledRule::name)
            .collect()
    }

    /// Run every rule in order over an accumulating buffer.
    pub fn apply(&self, text: &str) -> String {
        let mut buffer = text.to_string();
        for rule in &self.rules {
            if let Cow::Owned(next) = rule.apply(&buffer) {
                buffer = next;
            }
        }
        buffer
    }

    /// Check that a second pass over already-rewritten text is a no-op.
    pub fn check_idempotent(&self, rewritten: &str) -> Result<(), RuleError> {
        let offending: Vec<&str> = self.present_in(rewritten);
        if offending.is_empty() || self.apply(rewritten) == rewritten {
            return Ok(());
        }
        Err(RuleError::NotIdempotent {
            rules: offending.join(", "),
        })
    }
}
