use anyhow::Result;
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::runtime::{Runtime, path::to_slash_string};

use super::{ModuleEntry, Origin, UNKNOWN_VERSION};

/// Descriptor file inside a local module directory.
pub const MODULE_DESCRIPTOR: &str = "module.json";

#[derive(Deserialize)]
struct ModuleDescriptor {
    version: Option<String>,
}

/// Find modules in `<modules_dir>/<Name>/`.
///
/// The directory name is used verbatim as the identifier.
#[tracing::instrument(skip(runtime))]
pub fn scan_local_modules<R: Runtime>(
    runtime: &R,
    modules_dir: &Path,
) -> Result<Vec<(String, ModuleEntry)>> {
    let mut modules = Vec::new();

    if !runtime.exists(modules_dir) {
        return Ok(modules);
    }

    for module_dir in runtime.read_dir(modules_dir)? {
        let Some(name) = module_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "." || name == ".." || !runtime.is_dir(&module_dir) {
            continue;
        }

        let version = read_module_version(runtime, &module_dir);
        debug!("Found local module {} ({})", name, version);
        modules.push((
            name.to_string(),
            ModuleEntry::new(&to_slash_string(&module_dir), &version, Origin::Local),
        ));
    }

    Ok(modules)
}

/// Version from `module.json`, or `0.0.0` when the descriptor is missing,
/// unreadable, or has no string `version`.
#[tracing::instrument(skip(runtime))]
pub fn read_module_version<R: Runtime>(runtime: &R, module_dir: &Path) -> String {
    let descriptor_path = module_dir.join(MODULE_DESCRIPTOR);
    if !runtime.exists(&descriptor_path) {
        return UNKNOWN_VERSION.to_string();
    }

    let descriptor = runtime
        .read_to_string(&descriptor_path)
        .and_then(|content| Ok(serde_json::from_str::<ModuleDescriptor>(&content)?));

    match descriptor {
        Ok(ModuleDescriptor {
            version: Some(version),
        }) => version,
        Ok(_) => UNKNOWN_VERSION.to_string(),
        Err(e) => {
            debug!("Ignoring unreadable {:?}: {}", descriptor_path, e);
            UNKNOWN_VERSION.to_string()
        }
    }
}
