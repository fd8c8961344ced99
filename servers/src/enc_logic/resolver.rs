//! # Classification Resolver
//!
//! Decides which classes apply to a node. Overrides for the exact
//! (node, dc, env) triple win outright. Without them, every rule of the
//! (dc, env) pair is tried against the node identifier and the classes of each
//! matching rule are appended, rule by rule. The two sources are never merged.

use regex::Regex;
use tracing::{info, warn};

use super::error::EncError;
use super::model::{EncRecord, NodeKey, RegexClass};
use super::store::EncStore;

/// Outcome of a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Classes in store order.
    pub classes: Vec<String>,
    /// `true` when the classes came from overrides, `false` for regex rules.
    pub customised: bool,
    /// Environment label; the version suffix is added by the text formatter only.
    pub environment: String,
}

/// Resolves the classes of `key`.
///
/// `version` only appears in diagnostics here. A rule whose pattern does not
/// compile is logged and skipped. Finding nothing is not an error: the result
/// then has no classes.
pub async fn resolve(store: &EncStore, key: &NodeKey<'_>, version: &str) -> Result<Resolution, EncError> {
    let overrides = store.overrides_for(key).await?;

    if !overrides.is_empty() {
        return Ok(Resolution {
            classes: overrides.iter().map(EncRecord::class).collect(),
            customised: true,
            environment: key.env.to_string(),
        });
    }

    let mut classes = Vec::new();
    for rule in store.rules_for(key.dc, key.env).await? {
        let pattern = match Regex::new(&rule.regex) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(
                    rule_id = rule.id,
                    "Regex error with '{}' ({},{},{} {}): {}.",
                    rule.regex, key.dc, key.env, key.env, version, e
                );
                continue;
            }
        };
        if pattern.is_match(key.salt_id) {
            let mapped = store.classes_for_rule(rule.id).await?;
            classes.extend(mapped.iter().map(RegexClass::class));
        }
    }

    if classes.is_empty() {
        info!("No classes found for {}, and could not find a regex!", key.salt_id);
    }

    Ok(Resolution {
        classes,
        customised: false,
        environment: key.env.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enc_logic::model::ClassName;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    async fn open_store() -> (TempDir, EncStore) {
        let dir = tempdir().unwrap();
        let store = EncStore::open(dir.path().to_str().unwrap(), Duration::from_secs(3))
            .await
            .unwrap();
        (dir, store)
    }

    fn key(salt_id: &str) -> NodeKey<'_> {
        NodeKey { salt_id, dc: "DC1", env: "prod" }
    }

    #[tokio::test]
    async fn test_override_takes_precedence() {
        let (_dir, store) = open_store().await;
        let rule = store.insert_rule(".*", "DC1", "prod").await;
        store.insert_rule_class(rule, "base", None).await;
        store
            .replace_overrides(&key("web01"), &[ClassName::parse("custom.init").unwrap()])
            .await
            .unwrap();

        let resolution = resolve(&store, &key("web01"), "v1").await.unwrap();
        assert_eq!(resolution.classes, vec!["custom.init"]);
        assert!(resolution.customised);
        assert_eq!(resolution.environment, "prod");
        store.close().await;
    }

    #[tokio::test]
    async fn test_regex_fallback_rule_then_mapping_order() {
        let (_dir, store) = open_store().await;
        let web = store.insert_rule("^web\\d+$", "DC1", "prod").await;
        let any = store.insert_rule("0", "DC1", "prod").await;
        let db = store.insert_rule("^db", "DC1", "prod").await;
        let elsewhere = store.insert_rule(".*", "DC2", "prod").await;
        store.insert_rule_class(web, "nginx", Some("init.sls")).await;
        store.insert_rule_class(web, "php", None).await;
        store.insert_rule_class(any, "monitoring", Some("agent")).await;
        store.insert_rule_class(db, "postgres", None).await;
        store.insert_rule_class(elsewhere, "never", None).await;

        let resolution = resolve(&store, &key("web01"), "v1").await.unwrap();
        assert_eq!(resolution.classes, vec!["nginx.init", "php", "monitoring.agent"]);
        assert!(!resolution.customised);
        assert_eq!(resolution.environment, "prod");
        store.close().await;
    }

    #[tokio::test]
    async fn test_no_match_is_empty_success() {
        let (_dir, store) = open_store().await;
        let rule = store.insert_rule("^db", "DC1", "prod").await;
        store.insert_rule_class(rule, "postgres", None).await;

        let resolution = resolve(&store, &key("web01"), "v1").await.unwrap();
        assert!(resolution.classes.is_empty());
        assert!(!resolution.customised);
        assert_eq!(resolution.environment, "prod");
        store.close().await;
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_skipped() {
        let (_dir, store) = open_store().await;
        let broken = store.insert_rule("web(", "DC1", "prod").await;
        let good = store.insert_rule("web", "DC1", "prod").await;
        store.insert_rule_class(broken, "broken", None).await;
        store.insert_rule_class(good, "nginx", None).await;

        let resolution = resolve(&store, &key("web01"), "v1").await.unwrap();
        assert_eq!(resolution.classes, vec!["nginx"]);
        store.close().await;
    }

    #[tokio::test]
    async fn test_overrides_of_other_env_do_not_apply() {
        let (_dir, store) = open_store().await;
        let test_env = NodeKey { salt_id: "web01", dc: "DC1", env: "test" };
        store
            .replace_overrides(&test_env, &[ClassName::parse("custom").unwrap()])
            .await
            .unwrap();
        let rule = store.insert_rule("web", "DC1", "prod").await;
        store.insert_rule_class(rule, "nginx", None).await;

        let resolution = resolve(&store, &key("web01"), "v1").await.unwrap();
        assert_eq!(resolution.classes, vec!["nginx"]);
        assert!(!resolution.customised);
        store.close().await;
    }
}
