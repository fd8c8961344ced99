//! # Output Formatter
//!
//! Two renderings of a [`Resolution`]:
//!
//! - JSON for the GUI: `classes`, `environment` (label only) and `customised`,
//!   so the GUI can tell override-sourced from regex-sourced results.
//! - Line-oriented YAML for the configuration-management master: the version is
//!   appended to the environment (`environment: prod_v3`) so it can match the
//!   tag or branch of the states.

use serde::Serialize;

use super::error::EncError;
use super::resolver::Resolution;

/// Rendering selected by the request (`yaml` query flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct JsonOut<'a> {
    classes: &'a [String],
    environment: &'a str,
    customised: bool,
}

/// Renders `resolution` in `format`. `version` is used by the YAML form only.
pub fn render(resolution: &Resolution, format: OutputFormat, version: &str) -> Result<String, EncError> {
    match format {
        OutputFormat::Json => render_json(resolution),
        OutputFormat::Yaml => Ok(render_yaml(resolution, version)),
    }
}

fn render_json(resolution: &Resolution) -> Result<String, EncError> {
    let out = JsonOut {
        classes: &resolution.classes,
        environment: &resolution.environment,
        customised: resolution.customised,
    };
    Ok(serde_json::to_string(&out)?)
}

fn render_yaml(resolution: &Resolution, version: &str) -> String {
    if resolution.classes.is_empty() {
        return "classes: null".to_string();
    }
    let mut out = String::from("classes:\n");
    for class in &resolution.classes {
        out.push_str("  - ");
        out.push_str(class);
        out.push('\n');
    }
    out.push_str(&format!("environment: {}_{}", resolution.environment, version));
    out
}
