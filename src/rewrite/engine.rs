//! Ordered evaluation of a virtual host's rewrite rules.

use std::path::{Path, PathBuf};

use crate::config::RewriteRuleConfig;
use crate::rewrite::rule::RewriteRule;

/// Per-virtual-host rewrite engine.
///
/// Rules run in configured order. Each applied rule feeds its output to the
/// next; a rule flagged `L` ends the chain.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    document_root: PathBuf,
    rules: Vec<RewriteRule>,
}

impl RewriteEngine {
    pub fn new(document_root: impl Into<PathBuf>, rules: Vec<RewriteRule>) -> Self {
        Self {
            document_root: document_root.into(),
            rules,
        }
    }

    /// Compile the configured rules, skipping the ones that fail to load.
    pub fn from_config(document_root: &Path, configs: &[RewriteRuleConfig], domain: &str) -> Self {
        let mut rules = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            match RewriteRule::from_config(config, domain) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    tracing::warn!(domain = %domain, rule = index, error = %e, "Skipping rewrite rule");
                }
            }
        }

        if !rules.is_empty() {
            tracing::debug!(domain = %domain, rules = rules.len(), "Rewrite engine loaded");
        }
        Self::new(document_root, rules)
    }

    /// An engine without rules is a no-op.
    pub fn is_enabled(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }

    /// Rewrite `(path, query)`. Unmatched input passes through unchanged.
    pub async fn process(&self, path: &str, query: &str) -> (String, String) {
        let mut current_path = path.to_string();
        let mut current_query = query.to_string();

        for rule in &self.rules {
            let Some((new_path, new_query)) =
                rule.apply(&current_path, &current_query, &self.document_root).await
            else {
                continue;
            };

            tracing::debug!(
                pattern = %rule.pattern(),
                from = %current_path,
                to = %new_path,
                query = %new_query,
                "Rewrite applied"
            );
            current_path = new_path;
            current_query = new_query;

            if rule.flags().last {
                break;
            }
        }

        (current_path, current_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::condition::Condition;
    use crate::rewrite::rule::RuleFlags;
    use std::fs;
    use tempfile::TempDir;

    fn flags(last: bool, qsa: bool) -> RuleFlags {
        RuleFlags { last, qsa }
    }

    #[tokio::test]
    async fn qsa_appends_original_query_after_template() {
        let root = TempDir::new().unwrap();
        let rule = RewriteRule::new("^(.*)$", "/index.php", "r=$1", Vec::new(), flags(false, true)).unwrap();
        let engine = RewriteEngine::new(root.path(), vec![rule]);

        assert_eq!(
            engine.process("/a/b", "x=1").await,
            ("/index.php".to_string(), "r=/a/b&x=1".to_string())
        );
    }

    #[tokio::test]
    async fn last_flag_stops_the_chain() {
        let root = TempDir::new().unwrap();
        let api = RewriteRule::new("^/api/(.*)$", "/api.php", "endpoint=$1", Vec::new(), flags(true, false)).unwrap();
        let catch_all = RewriteRule::new("^(.*)$", "/index.php", "", Vec::new(), flags(false, false)).unwrap();
        let engine = RewriteEngine::new(root.path(), vec![api, catch_all]);

        assert_eq!(
            engine.process("/api/users", "").await,
            ("/api.php".to_string(), "endpoint=users".to_string())
        );
    }

    #[tokio::test]
    async fn rules_chain_without_last() {
        let root = TempDir::new().unwrap();
        let first = RewriteRule::new("^/old/(.*)$", "/new/$1", "", Vec::new(), flags(false, false)).unwrap();
        let second = RewriteRule::new("^/new/(.*)$", "/final.php", "p=$1", Vec::new(), flags(false, false)).unwrap();
        let engine = RewriteEngine::new(root.path(), vec![first, second]);

        assert_eq!(
            engine.process("/old/thing", "").await,
            ("/final.php".to_string(), "p=thing".to_string())
        );
    }

    #[tokio::test]
    async fn conditions_see_the_current_path() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("robots.txt"), "ok").unwrap();

        let front = RewriteRule::new(
            "^(.*)$",
            "/index.php",
            "url=$1",
            vec![Condition::FileNotExists, Condition::DirNotExists],
            flags(true, true),
        )
        .unwrap();
        let engine = RewriteEngine::new(root.path(), vec![front]);

        assert_eq!(
            engine.process("/robots.txt", "a=1").await,
            ("/robots.txt".to_string(), "a=1".to_string())
        );
        assert_eq!(
            engine.process("/users/7", "a=1").await,
            ("/index.php".to_string(), "url=/users/7&a=1".to_string())
        );
    }

    #[tokio::test]
    async fn no_match_passes_through() {
        let root = TempDir::new().unwrap();
        let rule = RewriteRule::new("^/blog/", "/b.php", "", Vec::new(), flags(false, false)).unwrap();
        let engine = RewriteEngine::new(root.path(), vec![rule]);
        assert_eq!(engine.process("/shop", "q=1").await, ("/shop".to_string(), "q=1".to_string()));
    }

    #[tokio::test]
    async fn empty_engine_is_disabled() {
        let root = TempDir::new().unwrap();
        let engine = RewriteEngine::from_config(root.path(), &[], "a.test");
        assert!(!engine.is_enabled());
        assert_eq!(engine.process("/x", "y").await, ("/x".to_string(), "y".to_string()));
    }

    #[tokio::test]
    async fn broken_rules_are_skipped() {
        let root = TempDir::new().unwrap();
        let configs = vec![
            RewriteRuleConfig {
                pattern: Some("^(broken".into()),
                target: Some("/x".into()),
                ..Default::default()
            },
            RewriteRuleConfig {
                pattern: Some("^/ok$".into()),
                ..Default::default()
            },
            RewriteRuleConfig {
                pattern: Some("^/ok$".into()),
                target: Some("/ok.php".into()),
                ..Default::default()
            },
        ];
        let engine = RewriteEngine::from_config(root.path(), &configs, "a.test");
        assert_eq!(engine.rules_count(), 1);
        assert_eq!(engine.process("/ok", "").await.0, "/ok.php");
    }
}
