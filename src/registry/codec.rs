//! Registry file format.
//!
//! The file is a PHP script the framework can `require`. Its data lives in a
//! JSON document embedded in a nowdoc, which is what this module reads back;
//! the file is never evaluated here. Paths under the project root are written
//! relative to it and re-anchored on `$baseDir` when PHP loads the file.

use anyhow::{Context, Result, anyhow};
use std::path::{Component, Path};

use crate::runtime::{is_path_under, relative_path_from_dir, path::to_slash_string};

use super::{ModuleRegistry, normalize_module_path};

const PAYLOAD_START: &str = "$registry = json_decode(<<<'JSON'\n";
const PAYLOAD_END: &str = "\nJSON, true);";

/// Render the registry file for a registry stored at `registry_file` in the
/// project rooted at `project_root`.
pub fn render_registry(
    registry: &ModuleRegistry,
    project_root: &Path,
    registry_file: &Path,
) -> Result<String> {
    let mut relocated = registry.clone();
    for entry in relocated.modules.values_mut() {
        entry.path = relocatable_path(&entry.path, project_root);
    }

    let payload =
        serde_json::to_string_pretty(&relocated).context("Failed to serialize module registry")?;
    let base_dir = base_dir_expression(project_root, registry_file);

    Ok(format!(
        r#"<?php

// This file is generated by novamod. Do not edit.

$baseDir = {base_dir};

{PAYLOAD_START}{payload}{PAYLOAD_END}

foreach ($registry['modules'] as &$module) {{
    if (!preg_match('#^(/|[A-Za-z]:/)#', $module['path'])) {{
        $module['path'] = $baseDir . '/' . $module['path'];
    }}
}}
unset($module);

return $registry;
"#
    ))
}

/// Extract the registry from a rendered file.
///
/// Fails when the payload markers are missing or the payload is not a
/// registry document.
pub fn parse_registry(content: &str) -> Result<ModuleRegistry> {
    let start = content
        .find(PAYLOAD_START)
        .ok_or_else(|| anyhow!("registry payload start marker not found"))?
        + PAYLOAD_START.len();
    let length = content[start..]
        .find(PAYLOAD_END)
        .ok_or_else(|| anyhow!("registry payload end marker not found"))?;

    let mut registry: ModuleRegistry = serde_json::from_str(&content[start..start + length])
        .context("registry payload is not a valid module mapping")?;
    for entry in registry.modules.values_mut() {
        entry.path = normalize_module_path(&entry.path);
    }
    Ok(registry)
}

/// Absolute paths under the project root become root-relative; everything
/// else is kept as is.
fn relocatable_path(path: &str, project_root: &Path) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute()
        && is_path_under(candidate, project_root)
        && let Some(relative) = relative_path_from_dir(project_root, candidate)
    {
        return normalize_module_path(&to_slash_string(&relative));
    }
    normalize_module_path(path)
}

/// PHP expression evaluating to the project root from the registry file.
fn base_dir_expression(project_root: &Path, registry_file: &Path) -> String {
    let registry_dir = registry_file.parent().unwrap_or(Path::new(""));

    match relative_path_from_dir(registry_dir, project_root) {
        Some(relative) if relative.as_os_str().is_empty() => "__DIR__".to_string(),
        Some(relative) if relative.components().all(|c| c == Component::ParentDir) => {
            format!("dirname(__DIR__, {})", relative.components().count())
        }
        Some(relative) => format!(
            "__DIR__ . {}",
            php_string(&format!("/{}", to_slash_string(&relative)))
        ),
        None => php_string(&to_slash_string(project_root)),
    }
}

/// Single-quoted PHP string literal.
fn php_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
