use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::runtime::Runtime;

use super::MODULE_TYPE;

/// Script event that must run the registry rebuild.
pub const REBUILD_EVENT: &str = "post-autoload-dump";

/// The parts of the root `composer.json` this tool reads.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProjectManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub scripts: Map<String, Value>,
    #[serde(default)]
    pub config: ManifestConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ManifestConfig {
    #[serde(rename = "vendor-dir", default)]
    pub vendor_dir: Option<String>,
}

impl ProjectManifest {
    /// Load `composer.json`, treating a missing file as an empty manifest.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            return Ok(Self::default());
        }
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// A module under development is not a top-level project.
    pub fn is_top_level_project(&self) -> bool {
        self.package_type.as_deref() != Some(MODULE_TYPE)
    }

    /// Commands registered for a script event. Composer accepts a single
    /// string or a list.
    pub fn script_commands(&self, event: &str) -> Vec<&str> {
        match self.scripts.get(event) {
            Some(Value::String(command)) => vec![command.as_str()],
            Some(Value::Array(commands)) => commands.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a script for `event` invokes `command` (`"<program> <args>"`).
    ///
    /// The program may be given by path, flags may appear anywhere, and the
    /// expected arguments must all appear among the non-flag arguments.
    pub fn runs_on(&self, event: &str, command: &str) -> bool {
        let mut expected = command.split_whitespace();
        let Some(program) = expected.next() else {
            return false;
        };
        let args: Vec<&str> = expected.collect();

        self.script_commands(event)
            .iter()
            .any(|script| invokes(script, program, &args))
    }
}

fn invokes(script: &str, program: &str, expected_args: &[&str]) -> bool {
    let mut tokens = script.split_whitespace();
    let Some(first) = tokens.next() else {
        return false;
    };
    let name = first.rsplit(['/', '\\']).next().unwrap_or(first);
    if name != program {
        return false;
    }

    let args: Vec<&str> = tokens.filter(|t| !t.starts_with('-')).collect();
    expected_args.iter().all(|a| args.contains(a))
}
