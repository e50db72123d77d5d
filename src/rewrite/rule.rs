//! A single rewrite rule: pattern, target, query template, conditions, flags.

use std::path::Path;

use regex::Regex;
use thiserror::Error;

use crate::config::RewriteRuleConfig;
use crate::rewrite::condition::Condition;

/// Why a configured rule could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule is missing `{0}`")]
    MissingField(&'static str),

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Rule modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFlags {
    /// `L`: stop evaluating further rules after this one applies.
    pub last: bool,
    /// `QSA`: append the incoming query string to the templated one.
    pub qsa: bool,
}

impl RuleFlags {
    /// Parse flag names case-insensitively. Unknown names are returned.
    pub fn parse<'a>(names: impl IntoIterator<Item = &'a str>) -> (Self, Vec<&'a str>) {
        let mut flags = Self::default();
        let mut unknown = Vec::new();
        for name in names {
            match name.to_ascii_uppercase().as_str() {
                "L" => flags.last = true,
                "QSA" => flags.qsa = true,
                _ => unknown.push(name),
            }
        }
        (flags, unknown)
    }
}

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: String,
    /// Pattern anchored at the start of the path, used for matching and captures.
    matcher: Regex,
    /// The pattern as written, used for substitution over the whole path.
    substituter: Regex,
    /// Target in `regex` replacement syntax.
    replacement: String,
    query_template: String,
    conditions: Vec<Condition>,
    flags: RuleFlags,
}

impl RewriteRule {
    pub fn new(
        pattern: &str,
        target: &str,
        query_template: &str,
        conditions: Vec<Condition>,
        flags: RuleFlags,
    ) -> Result<Self, RuleError> {
        let compile = |source: &str| {
            Regex::new(source).map_err(|source| RuleError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
        };

        Ok(Self {
            pattern: pattern.to_string(),
            matcher: compile(&format!("^(?:{pattern})"))?,
            substituter: compile(pattern)?,
            replacement: to_replacement_syntax(target),
            query_template: query_template.to_string(),
            conditions,
            flags,
        })
    }

    /// Build a rule from its config entry. Unknown conditions and flags are
    /// dropped with a warning; a missing pattern/target or a bad regex
    /// rejects the rule.
    pub fn from_config(config: &RewriteRuleConfig, domain: &str) -> Result<Self, RuleError> {
        let pattern = config
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(RuleError::MissingField("pattern"))?;
        let target = config
            .target
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RuleError::MissingField("target"))?;

        let mut conditions = Vec::with_capacity(config.conditions.len());
        for value in &config.conditions {
            match Condition::from_config(value) {
                Ok(condition) => conditions.push(condition),
                Err(reason) => {
                    tracing::warn!(domain = %domain, pattern = %pattern, %reason, "Ignoring rewrite condition");
                }
            }
        }

        let (flags, unknown) = RuleFlags::parse(config.flags.iter().map(String::as_str));
        if !unknown.is_empty() {
            tracing::warn!(domain = %domain, pattern = %pattern, flags = ?unknown, "Ignoring unknown rewrite flags");
        }

        Self::new(pattern, target, &config.query_string, conditions, flags)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True when the pattern matches the start of `path` and every condition holds.
    pub async fn matches(&self, path: &str, document_root: &Path) -> bool {
        self.matcher.is_match(path) && self.conditions_hold(path, document_root).await
    }

    async fn conditions_hold(&self, path: &str, document_root: &Path) -> bool {
        for condition in &self.conditions {
            if !condition.evaluate(path, document_root).await {
                return false;
            }
        }
        true
    }

    /// Apply the rule to `(path, query)`. Returns `None` when the rule does not match.
    pub async fn apply(&self, path: &str, query: &str, document_root: &Path) -> Option<(String, String)> {
        let captures = self.matcher.captures(path)?;
        if !self.conditions_hold(path, document_root).await {
            return None;
        }

        let new_path = self.substitute(path);

        let mut new_query = self.query_template.clone();
        // Highest index first so `$1` never eats the prefix of `$10`.
        // Unmatched groups expand to "" rather than staying as literal `$N`.
        for index in (1..captures.len()).rev() {
            let value = captures.get(index).map_or("", |m| m.as_str());
            new_query = new_query.replace(&format!("${index}"), value);
        }

        if self.flags.qsa && !query.is_empty() {
            if new_query.is_empty() {
                new_query = query.to_string();
            } else {
                new_query = format!("{new_query}&{query}");
            }
        }

        Some((new_path, new_query))
    }

    /// Replace every match of the pattern in `path` with the target.
    ///
    /// Unlike `Regex::replace_all`, an empty match directly after a non-empty
    /// one is replaced too, so `(.*)` over `/a/b` substitutes twice.
    fn substitute(&self, path: &str) -> String {
        let mut out = String::with_capacity(path.len() + self.replacement.len());
        let mut copied = 0;
        let mut search = 0;

        while let Some(captures) = self.substituter.captures_at(path, search) {
            let Some(found) = captures.get(0) else { break };
            out.push_str(&path[copied..found.start()]);
            captures.expand(&self.replacement, &mut out);
            copied = found.end();

            if !found.is_empty() {
                search = found.end();
                continue;
            }
            // Step over one character so an empty match cannot repeat.
            match path[found.end()..].chars().next() {
                Some(c) => search = found.end() + c.len_utf8(),
                None => break,
            }
        }

        out.push_str(&path[copied..]);
        out
    }
}

/// Translate `$1`, `${1}` and `\1` group references into `regex` replacement
/// syntax and escape every other `$`.
fn to_replacement_syntax(target: &str) -> String {
    let chars: Vec<char> = target.chars().collect();
    let mut out = String::with_capacity(target.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if (c == '$' || c == '\\') && next.is_some_and(|n| n.is_ascii_digit()) {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            out.push_str("${");
            out.extend(&chars[start..end]);
            out.push('}');
            i = end;
            continue;
        }

        if c == '$' && next == Some('{') {
            if let Some(close) = chars[i..].iter().position(|&ch| ch == '}') {
                out.extend(&chars[i..=i + close]);
                i += close + 1;
                continue;
            }
        }

        if c == '$' {
            out.push_str("$$");
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}
