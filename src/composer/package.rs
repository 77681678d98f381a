use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Package type that marks a dependency as a module.
pub const MODULE_TYPE: &str = "nova-module";

/// A resolved package as the host package manager describes it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Package {
    /// Pretty name, e.g. `acme/blog`
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default = "default_package_type")]
    pub package_type: String,
    /// Autoload mechanism name -> mechanism configuration, in document order.
    #[serde(default)]
    pub autoload: Map<String, Value>,
}

fn default_package_type() -> String {
    "library".to_string()
}

impl Package {
    pub fn is_module(&self) -> bool {
        self.package_type == MODULE_TYPE
    }

    /// Install location of the package: `<vendor_dir>/<pretty-name>`.
    pub fn install_path(&self, vendor_dir: &Path) -> PathBuf {
        vendor_dir.join(&self.name)
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse package definition {:?}", path))
    }
}

/// The packages recorded in `vendor/composer/installed.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstalledPackages {
    pub packages: Vec<Package>,
}

impl InstalledPackages {
    /// Parse both the Composer 2 layout (`{"packages": [...]}`) and the
    /// Composer 1 layout (a bare array).
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).context("Invalid installed.json")?;
        let list = match value {
            Value::Array(list) => list,
            Value::Object(mut object) => match object.remove("packages") {
                Some(Value::Array(list)) => list,
                _ => bail!("installed.json has no \"packages\" list"),
            },
            _ => bail!("installed.json must be an array or an object"),
        };

        let packages = list
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Package>, _>>()
            .context("Invalid package entry in installed.json")?;

        Ok(Self { packages })
    }

    /// Load the list, treating a missing file as "nothing installed".
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            log::debug!("No installed packages file at {:?}", path);
            return Ok(Self::default());
        }
        let content = runtime.read_to_string(path)?;
        Self::parse(&content).with_context(|| format!("Failed to load {:?}", path))
    }

    pub fn find(&self, name: &str) -> Option<&Package> {
        self.packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
