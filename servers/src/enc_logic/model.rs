//! Records of the private ENC database and the class-name rules tying them
//! together.
//!
//! A class is written `formula` or `formula.state_file`. Stored state files may
//! carry their `.sls` extension; it is stripped when the class is composed.

use sqlx::FromRow;

/// Extension removed from state-file names when composing a class.
pub const STATE_FILE_EXT: &str = ".sls";

/// The (node, data-centre, environment) triple that scopes overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKey<'a> {
    pub salt_id: &'a str,
    pub dc: &'a str,
    pub env: &'a str,
}

/// An explicit override: one class assigned to one node.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EncRecord {
    pub id: i64,
    /// Name of the server.
    pub salt_id: String,
    /// Directory name.
    pub formula: String,
    /// Sls file name.
    pub state_file: Option<String>,
    /// Data centre name.
    pub dc: String,
    /// Environment name.
    pub env: String,
}

impl EncRecord {
    pub fn class(&self) -> String {
        compose_class(&self.formula, self.state_file.as_deref())
    }
}

/// A pattern matched against node identifiers of one data centre and environment.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RegexRule {
    pub id: i64,
    pub regex: String,
    pub dc: String,
    pub env: String,
}

/// One class a regex rule expands to.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RegexClass {
    pub id: i64,
    pub regex_id: i64,
    pub formula: String,
    pub state_file: Option<String>,
}

impl RegexClass {
    pub fn class(&self) -> String {
        compose_class(&self.formula, self.state_file.as_deref())
    }
}

/// Builds `formula` or `formula.state_file`, dropping a trailing `.sls` first.
/// A state file that is empty after stripping yields the bare formula.
pub fn compose_class(formula: &str, state_file: Option<&str>) -> String {
    let stripped = state_file
        .map(|file| file.strip_suffix(STATE_FILE_EXT).unwrap_or(file))
        .unwrap_or_default();
    if stripped.is_empty() {
        formula.to_string()
    } else {
        format!("{}.{}", formula, stripped)
    }
}

/// A class name split into the columns it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassName {
    pub formula: String,
    pub state_file: Option<String>,
}

impl ClassName {
    /// Splits a class on `.`.
    ///
    /// - `""` has no segments and yields `None`; the caller skips it.
    /// - `"app"` is a formula without a state file.
    /// - `"app.init"` is formula `app`, state file `init`.
    /// - `"app.init.extra"` keeps only the first two segments; everything after
    ///   the second dot is discarded.
    pub fn parse(class: &str) -> Option<Self> {
        if class.is_empty() {
            return None;
        }
        let mut segments = class.split('.');
        let formula = segments.next().unwrap_or_default().to_string();
        let state_file = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        Some(Self { formula, state_file })
    }

    pub fn compose(&self) -> String {
        compose_class(&self.formula, self.state_file.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_strips_sls() {
        assert_eq!(compose_class("web", Some("init.sls")), "web.init");
        assert_eq!(compose_class("web", Some("init")), "web.init");
        assert_eq!(compose_class("web", None), "web");
        assert_eq!(compose_class("web", Some("")), "web");
        assert_eq!(compose_class("web", Some(".sls")), "web");
    }

    #[test]
    fn test_compose_strips_only_trailing_sls() {
        assert_eq!(compose_class("web", Some("sls.conf")), "web.sls.conf");
        assert_eq!(compose_class("web", Some("init.sls.sls")), "web.init.sls");
    }

    #[test]
    fn test_parse_single_segment() {
        assert_eq!(
            ClassName::parse("app"),
            Some(ClassName { formula: "app".into(), state_file: None })
        );
    }

    #[test]
    fn test_parse_two_segments() {
        assert_eq!(
            ClassName::parse("web.init"),
            Some(ClassName { formula: "web".into(), state_file: Some("init".into()) })
        );
    }

    #[test]
    fn test_parse_truncates_extra_segments() {
        let parsed = ClassName::parse("web.init.extra.more").unwrap();
        assert_eq!(parsed.formula, "web");
        assert_eq!(parsed.state_file.as_deref(), Some("init"));
        assert_eq!(parsed.compose(), "web.init");
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert_eq!(ClassName::parse(""), None);
    }

    #[test]
    fn test_parse_trailing_dot_has_no_state_file() {
        let parsed = ClassName::parse("app.").unwrap();
        assert_eq!(parsed.state_file, None);
        assert_eq!(parsed.compose(), "app");
    }
}
