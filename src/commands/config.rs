use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::{
    composer::ProjectManifest,
    registry::RegistryPaths,
    runtime::{Runtime, normalize_path},
};

/// Vendor directory used when neither the command line nor composer.json
/// names one.
pub const DEFAULT_VENDOR_DIR: &str = "vendor";

/// Project settings resolved from the command line, environment, and
/// composer.json.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: RegistryPaths,
    pub manifest: ProjectManifest,
}

impl Config {
    /// Resolve the project root (`--root`, default: working directory) and
    /// the vendor directory (`--vendor-dir`, then composer.json
    /// `config.vendor-dir`, then `vendor`).
    pub fn new<R: Runtime>(
        runtime: &R,
        project_root: Option<PathBuf>,
        vendor_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let cwd = runtime.current_dir()?;
        let project_root = absolute(&cwd, project_root.as_deref().unwrap_or(Path::new(".")));
        debug!("Using project root: {:?}", project_root);

        let manifest = ProjectManifest::load(runtime, &project_root.join("composer.json"))?;

        let vendor_dir = vendor_dir
            .or_else(|| manifest.config.vendor_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VENDOR_DIR));
        let vendor_dir = absolute(&project_root, &vendor_dir);
        debug!("Using vendor directory: {:?}", vendor_dir);

        Ok(Self {
            paths: RegistryPaths::new(project_root, vendor_dir),
            manifest,
        })
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}
