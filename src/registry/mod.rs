//! The persisted module registry.
//!
//! # Structure
//!
//! - `codec` - PHP registry file rendering and parsing
//! - `local` - discovery of modules dropped into the project's `modules/` directory
//! - `writer` - full rebuild and incremental updates of the registry file

mod codec;
mod local;
mod writer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use codec::{parse_registry, render_registry};
pub use local::{read_module_version, scan_local_modules};
pub use writer::{ApplyOutcome, RegistryWriter, rebuild};

/// Version recorded when none can be discovered.
pub const UNKNOWN_VERSION: &str = "0.0.0";

/// Registry file location relative to the vendor directory.
pub const REGISTRY_FILE: &str = "novamod/modules.php";

/// Historical registry location relative to the vendor directory.
pub const LEGACY_REGISTRY_FILE: &str = "composer/nova-modules.php";

/// Directory scanned for local modules, relative to the project root.
pub const LOCAL_MODULES_DIR: &str = "modules";

/// Where a module was discovered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Installed by the package manager
    Vendor,
    /// Found in the local modules directory
    Local,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Vendor => write!(f, "vendor"),
            Origin::Local => write!(f, "local"),
        }
    }
}

/// One registered module. The identifier is the registry key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub path: String,
    pub version: String,
    #[serde(rename = "location")]
    pub origin: Origin,
}

impl ModuleEntry {
    /// An empty version is recorded as [`UNKNOWN_VERSION`].
    pub fn new(path: &str, version: &str, origin: Origin) -> Self {
        let version = if version.trim().is_empty() {
            UNKNOWN_VERSION
        } else {
            version
        };
        Self {
            path: normalize_module_path(path),
            version: version.to_string(),
            origin,
        }
    }
}

/// Identifier -> module mapping, always ordered by identifier.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a module. The path is normalized on the way in.
    pub fn insert(&mut self, identifier: &str, mut entry: ModuleEntry) {
        entry.path = normalize_module_path(&entry.path);
        self.modules.insert(identifier.to_string(), entry);
    }

    pub fn remove(&mut self, identifier: &str) -> Option<ModuleEntry> {
        self.modules.remove(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&ModuleEntry> {
        self.modules.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.modules.contains_key(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ModuleEntry)> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Forward slashes, no repeated separators, exactly one trailing slash.
pub fn normalize_module_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }

    if normalized.is_empty() {
        return "./".to_string();
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Filesystem locations the registry works with.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryPaths {
    pub project_root: PathBuf,
    pub vendor_dir: PathBuf,
}

impl RegistryPaths {
    pub fn new(project_root: PathBuf, vendor_dir: PathBuf) -> Self {
        Self {
            project_root,
            vendor_dir,
        }
    }

    /// `<vendor>/novamod/modules.php`
    pub fn registry_file(&self) -> PathBuf {
        self.vendor_dir.join(REGISTRY_FILE)
    }

    /// `<vendor>/composer/nova-modules.php`
    pub fn legacy_registry_file(&self) -> PathBuf {
        self.vendor_dir.join(LEGACY_REGISTRY_FILE)
    }

    /// `<root>/modules`
    pub fn local_modules_dir(&self) -> PathBuf {
        self.project_root.join(LOCAL_MODULES_DIR)
    }

    /// `<vendor>/composer/installed.json`
    pub fn installed_file(&self) -> PathBuf {
        self.vendor_dir.join("composer").join("installed.json")
    }
}
