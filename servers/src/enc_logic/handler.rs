//! # Request Handler
//!
//! Turns one [`Args`] envelope into one [`Outcome`]:
//!
//! 1. The verb picks fetch (`GET`) or replace (`POST`).
//! 2. Required fields are checked in a fixed order. The first missing one is
//!    reported and nothing else happens; in particular no store is opened.
//! 3. The private store is opened behind the store gate, the operation runs,
//!    and the store is closed again.
//!
//! The whole request runs under the configured deadline. Every failure is
//! logged and returned as an error envelope; nothing propagates past here.

use lib_common::protocols::enc_rpc::{Args, DB_PATH_PARAM, Outcome, PostedData, VERB_FETCH, VERB_REPLACE};
use tracing::{debug, error, info};

use super::error::EncError;
use super::formatter::{OutputFormat, render};
use super::model::{ClassName, NodeKey};
use super::resolver::resolve;
use super::state::AppState;
use super::store::EncStore;

/// Operation requested by the envelope's verb tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Fetch,
    Replace,
}

impl Verb {
    pub fn parse(tag: &str) -> Result<Self, EncError> {
        match tag {
            "" => Err(EncError::MissingVerb),
            VERB_FETCH => Ok(Verb::Fetch),
            VERB_REPLACE => Ok(Verb::Replace),
            other => Err(EncError::UnknownVerb(other.to_string())),
        }
    }
}

/// A validated fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub dc: String,
    pub version: String,
    pub env: String,
    pub salt_id: String,
    pub db_location: String,
    pub format: OutputFormat,
}

impl FetchRequest {
    /// Checks `dc`, `version`, `env`, `salt_id`, then the database location.
    pub fn from_args(args: &Args) -> Result<Self, EncError> {
        let dc = required_query(args, "dc", "The dc must be set")?;
        let version = required_query(args, "version", "The version must be set")?;
        let env = required_query(args, "env", "The env must be set")?;
        let salt_id = required_query(args, "salt_id", "'salt_id' must be set")?;
        let db_location = required_db_location(args)?;
        let format = if args.has_query("yaml") {
            OutputFormat::Yaml
        } else {
            OutputFormat::Json
        };
        Ok(Self {
            dc,
            version,
            env,
            salt_id,
            db_location,
            format,
        })
    }

    pub fn key(&self) -> NodeKey<'_> {
        NodeKey {
            salt_id: &self.salt_id,
            dc: &self.dc,
            env: &self.env,
        }
    }
}

/// A validated replace request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRequest {
    pub salt_id: String,
    /// Environment revision the client pins to. Checked for presence only.
    pub env_id: String,
    pub db_location: String,
    pub body: PostedData,
}

impl ReplaceRequest {
    /// Checks `salt_id`, `env_id`, the database location, then decodes the body.
    pub fn from_args(args: &Args) -> Result<Self, EncError> {
        let salt_id = required_query(args, "salt_id", "'salt_id' must be set")?;
        let env_id = required_query(args, "env_id", "'env_id' must be set")?;
        let db_location = required_db_location(args)?;
        let body = serde_json::from_slice::<PostedData>(&args.post_data).map_err(|source| {
            EncError::BodyDecode {
                body: String::from_utf8_lossy(&args.post_data).into_owned(),
                source,
            }
        })?;
        Ok(Self {
            salt_id,
            env_id,
            db_location,
            body,
        })
    }

    pub fn key(&self) -> NodeKey<'_> {
        NodeKey {
            salt_id: &self.salt_id,
            dc: &self.body.dc,
            env: &self.body.environment,
        }
    }

    /// Body classes split into formula / state file; empty strings are skipped.
    pub fn classes(&self) -> Vec<ClassName> {
        self.body.classes.iter().filter_map(|class| ClassName::parse(class)).collect()
    }
}

fn required_query(args: &Args, key: &str, message: &'static str) -> Result<String, EncError> {
    args.query_first(key)
        .map(str::to_string)
        .ok_or(EncError::Validation(message))
}

fn required_db_location(args: &Args) -> Result<String, EncError> {
    args.path_param(DB_PATH_PARAM)
        .map(str::to_string)
        .ok_or(EncError::Validation("Internal Error: 'PluginDatabasePath' must be set"))
}

/// Handles one envelope under the request deadline.
pub async fn handle(state: &AppState, args: &Args) -> Outcome {
    let deadline = state.request_timeout();
    let result = match tokio::time::timeout(deadline, dispatch(state, args)).await {
        Ok(result) => result,
        Err(_) => Err(EncError::DeadlineExceeded(deadline)),
    };

    match result {
        Ok(data) => Outcome::Success(data),
        Err(e) => {
            error!(kind = e.kind(), verb = %args.query_type, "{}", e);
            Outcome::Failure(e.to_string())
        }
    }
}

async fn dispatch(state: &AppState, args: &Args) -> Result<String, EncError> {
    match Verb::parse(&args.query_type)? {
        Verb::Fetch => fetch(state, &FetchRequest::from_args(args)?).await,
        Verb::Replace => replace(state, &ReplaceRequest::from_args(args)?).await,
    }
}

async fn fetch(state: &AppState, request: &FetchRequest) -> Result<String, EncError> {
    let _gate = state.read_gate().await;
    let store = EncStore::open(&request.db_location, state.request_timeout()).await?;
    let resolution = resolve(&store, &request.key(), &request.version).await;
    store.close().await;
    let resolution = resolution?;

    debug!(
        salt_id = %request.salt_id,
        dc = %request.dc,
        env = %request.env,
        customised = resolution.customised,
        classes = resolution.classes.len(),
        "classification resolved"
    );
    render(&resolution, request.format, &request.version)
}

async fn replace(state: &AppState, request: &ReplaceRequest) -> Result<String, EncError> {
    let classes = request.classes();
    let _gate = state.write_gate().await;
    let store = EncStore::open(&request.db_location, state.request_timeout()).await?;
    let removed = store.replace_overrides(&request.key(), &classes).await;
    store.close().await;
    let removed = removed?;

    info!(
        salt_id = %request.salt_id,
        env_id = %request.env_id,
        dc = %request.body.dc,
        env = %request.body.environment,
        removed,
        classes = ?classes.iter().map(ClassName::compose).collect::<Vec<_>>(),
        "override classes replaced"
    );
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enc_logic::store::DB_FILE_NAME;
    use lib_common::Database;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fetch_args(db: &str) -> Args {
        Args::new(VERB_FETCH)
            .with_query("dc", "DC1")
            .with_query("version", "v3")
            .with_query("env", "prod")
            .with_query("salt_id", "n1")
            .with_path_param(DB_PATH_PARAM, db)
    }

    fn replace_args(db: &str, classes: &[&str]) -> Args {
        let body = PostedData {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            dc: "DC1".into(),
            environment: "prod".into(),
        };
        Args::new(VERB_REPLACE)
            .with_query("salt_id", "n1")
            .with_query("env_id", "7")
            .with_path_param(DB_PATH_PARAM, db)
            .with_body(serde_json::to_vec(&body).unwrap())
    }

    fn without(mut args: Args, key: &str) -> Args {
        args.query_string.remove(key);
        args
    }

    fn state() -> AppState {
        AppState::new(Duration::from_secs(5))
    }

    fn failure(outcome: Outcome) -> String {
        match outcome {
            Outcome::Failure(message) => message,
            Outcome::Success(data) => panic!("expected failure, got success: {data}"),
        }
    }

    fn success(outcome: Outcome) -> String {
        match outcome {
            Outcome::Success(data) => data,
            Outcome::Failure(message) => panic!("expected success, got failure: {message}"),
        }
    }

    #[test]
    fn test_verb_parse() {
        assert_eq!(Verb::parse("GET").unwrap(), Verb::Fetch);
        assert_eq!(Verb::parse("POST").unwrap(), Verb::Replace);
        assert!(matches!(Verb::parse(""), Err(EncError::MissingVerb)));
        assert!(matches!(Verb::parse("PUT"), Err(EncError::UnknownVerb(v)) if v == "PUT"));
    }

    #[test]
    fn test_fetch_validation_order() {
        let all = fetch_args("/nonexistent/");
        let cases = [
            ("dc", "The dc must be set"),
            ("version", "The version must be set"),
            ("env", "The env must be set"),
            ("salt_id", "'salt_id' must be set"),
        ];
        for (missing, message) in cases {
            let err = FetchRequest::from_args(&without(all.clone(), missing)).unwrap_err();
            assert_eq!(err.to_string(), message);
        }

        // dc is reported first even when everything else is missing too.
        let mut bare = Args::new(VERB_FETCH);
        bare.path_params.clear();
        let err = FetchRequest::from_args(&bare).unwrap_err();
        assert_eq!(err.to_string(), "The dc must be set");

        let mut no_db = all.clone();
        no_db.path_params.clear();
        let err = FetchRequest::from_args(&no_db).unwrap_err();
        assert_eq!(err.to_string(), "Internal Error: 'PluginDatabasePath' must be set");
    }

    #[test]
    fn test_fetch_format_flag() {
        let json = FetchRequest::from_args(&fetch_args("/db/")).unwrap();
        assert_eq!(json.format, OutputFormat::Json);
        let yaml = FetchRequest::from_args(&fetch_args("/db/").with_query("yaml", "")).unwrap();
        assert_eq!(yaml.format, OutputFormat::Yaml);
    }

    #[test]
    fn test_replace_validation_order() {
        let all = replace_args("/db/", &["app"]);
        let err = ReplaceRequest::from_args(&without(all.clone(), "salt_id")).unwrap_err();
        assert_eq!(err.to_string(), "'salt_id' must be set");
        let err = ReplaceRequest::from_args(&without(all.clone(), "env_id")).unwrap_err();
        assert_eq!(err.to_string(), "'env_id' must be set");

        let mut no_db = all.clone();
        no_db.path_params.clear();
        let err = ReplaceRequest::from_args(&no_db).unwrap_err();
        assert_eq!(err.to_string(), "Internal Error: 'PluginDatabasePath' must be set");
    }

    #[test]
    fn test_replace_bad_body() {
        let args = replace_args("/db/", &[]).with_body(b"not json".to_vec());
        let err = ReplaceRequest::from_args(&args).unwrap_err();
        assert!(matches!(err, EncError::BodyDecode { .. }));
        assert!(err.to_string().contains("(not json)"));
    }

    #[tokio::test]
    async fn test_validation_failure_opens_no_store() {
        let dir = tempdir().unwrap();
        let db = format!("{}/", dir.path().display());
        let outcome = handle(&state(), &without(fetch_args(&db), "dc")).await;
        assert_eq!(failure(outcome), "The dc must be set");
        assert!(!dir.path().join("enc.db").exists());
    }

    #[tokio::test]
    async fn test_unknown_verb() {
        let mut args = fetch_args("/db/");
        args.query_type = "DELETE".into();
        let message = failure(handle(&state(), &args).await);
        assert_eq!(message, "Internal error: Invalid HTTP request type for this plugin DELETE");
    }

    #[tokio::test]
    async fn test_replace_then_fetch_round_trip() {
        let dir = tempdir().unwrap();
        let db = dir.path().to_str().unwrap();
        let state = state();

        assert_eq!(success(handle(&state, &replace_args(db, &["app", "web.init"])).await), "");

        let yaml = success(handle(&state, &fetch_args(db).with_query("yaml", "1")).await);
        assert_eq!(yaml, "classes:\n  - app\n  - web.init\nenvironment: prod_v3");

        let json = success(handle(&state, &fetch_args(db)).await);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["classes"], serde_json::json!(["app", "web.init"]));
        assert_eq!(value["environment"], "prod");
        assert_eq!(value["customised"], true);
    }

    #[tokio::test]
    async fn test_replace_is_full_overwrite() {
        let dir = tempdir().unwrap();
        let db = dir.path().to_str().unwrap();
        let state = state();

        success(handle(&state, &replace_args(db, &["app", "web.init", "db"])).await);
        success(handle(&state, &replace_args(db, &["cache.redis"])).await);

        let json = success(handle(&state, &fetch_args(db)).await);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["classes"], serde_json::json!(["cache.redis"]));
    }

    #[tokio::test]
    async fn test_replace_failure_rolls_back() {
        let dir = tempdir().unwrap();
        let db = dir.path().to_str().unwrap();
        let state = state();
        success(handle(&state, &replace_args(db, &["app"])).await);

        // Make the second insert of the next replace fail.
        let raw = Database::open(&dir.path().join(DB_FILE_NAME), Duration::from_secs(3))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON encs WHEN NEW.formula = 'boom'
             BEGIN SELECT RAISE(ABORT, 'boom'); END",
        )
        .execute(&raw.pool)
        .await
        .unwrap();
        raw.close().await;

        let message = failure(handle(&state, &replace_args(db, &["web", "boom"])).await);
        assert!(message.starts_with("Replacing classes for 'n1' failed"), "{message}");

        let json = success(handle(&state, &fetch_args(db)).await);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["classes"], serde_json::json!(["app"]));
        assert_eq!(value["customised"], true);
    }

    #[test]
    fn test_replace_request_decodes_body() {
        let request = ReplaceRequest::from_args(&replace_args("/db/", &["app", "web.init"])).unwrap();
        let expected = ReplaceRequest {
            salt_id: "n1".into(),
            env_id: "7".into(),
            db_location: "/db/".into(),
            body: PostedData {
                classes: vec!["app".into(), "web.init".into()],
                dc: "DC1".into(),
                environment: "prod".into(),
            },
        };
        assert_eq!(request, expected);
        assert_eq!(request.key(), NodeKey { salt_id: "n1", dc: "DC1", env: "prod" });
    }

    #[tokio::test]
    async fn test_fetch_without_anything_is_empty_success() {
        let dir = tempdir().unwrap();
        let db = dir.path().to_str().unwrap();
        let json = success(handle(&state(), &fetch_args(db)).await);
        assert_eq!(json, r#"{"classes":[],"environment":"prod","customised":false}"#);
    }

    #[tokio::test]
    async fn test_store_open_failure_is_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let message = failure(handle(&state(), &fetch_args(missing.to_str().unwrap())).await);
        assert!(message.starts_with("Store open error for"));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_while_gate_is_held() {
        let dir = tempdir().unwrap();
        let db = dir.path().to_str().unwrap();
        let state = AppState::new(Duration::from_millis(50));
        let _writer = state.write_gate().await;

        let message = failure(handle(&state, &fetch_args(db)).await);
        assert!(message.contains("deadline"));
    }
}
