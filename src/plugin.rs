//! Plugin entry point: routes package lifecycle events to the registry.

use anyhow::Result;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::composer::{Package, ProjectManifest, REBUILD_EVENT};
use crate::namespace;
use crate::registry::{ApplyOutcome, ModuleRegistry, RegistryPaths, RegistryWriter};
use crate::runtime::{Runtime, path::to_slash_string};

/// Command the project must run on [`REBUILD_EVENT`].
pub const REBUILD_COMMAND: &str = "novamod rebuild";

/// One-shot guard for the hook configuration check.
///
/// Created once by the entry point and lent to every [`Plugin`], so the
/// check runs at most once per process no matter how many plugins exist.
#[derive(Debug, Default)]
pub struct HookCheck {
    done: AtomicBool,
}

impl HookCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warning text for a misconfigured project, produced only on the first
    /// call.
    pub fn check(&self, manifest: &ProjectManifest) -> Option<String> {
        if self.done.swap(true, Ordering::SeqCst) {
            return None;
        }
        hook_warning(manifest)
    }

    pub fn has_run(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Warning for a top-level project whose scripts never rebuild the registry.
pub fn hook_warning(manifest: &ProjectManifest) -> Option<String> {
    if !manifest.is_top_level_project() || manifest.runs_on(REBUILD_EVENT, REBUILD_COMMAND) {
        return None;
    }

    Some(format!(
        "The module registry is not rebuilt after autoload dumps.\n\
         \n\
         Modules installed in one step may be missing from the registry until\n\
         it is rebuilt. Add the following to your composer.json:\n\
         \n\
         \x20   \"scripts\": {{\n\
         \x20       \"{}\": [\"{}\"]\n\
         \x20   }}",
        REBUILD_EVENT, REBUILD_COMMAND
    ))
}

/// A package lifecycle event from the host.
#[derive(Debug, Clone, Copy)]
pub enum PackageEvent<'p> {
    Install(&'p Package),
    Update {
        previous: &'p Package,
        current: &'p Package,
    },
    Uninstall(&'p Package),
}

pub struct Plugin<'a, R: Runtime> {
    writer: RegistryWriter<'a, R>,
}

impl<'a, R: Runtime> Plugin<'a, R> {
    /// Register the plugin for a project. The first plugin created with a
    /// given `hook_check` also validates the project's script hooks.
    pub fn new(
        runtime: &'a R,
        paths: RegistryPaths,
        manifest: &ProjectManifest,
        hook_check: &HookCheck,
    ) -> Self {
        if let Some(warning) = hook_check.check(manifest) {
            warn!("{}", warning);
        }
        Self {
            writer: RegistryWriter::new(runtime, paths),
        }
    }

    pub fn writer(&self) -> &RegistryWriter<'a, R> {
        &self.writer
    }

    /// Regenerate the registry from the full list of installed packages.
    pub fn rebuild(&self, packages: &[Package]) -> Result<ModuleRegistry> {
        self.writer.rebuild(packages)
    }

    /// Apply one lifecycle event. Non-module packages are ignored.
    #[tracing::instrument(skip(self))]
    pub fn handle(&self, event: PackageEvent<'_>) -> Result<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::new();

        match event {
            PackageEvent::Install(package) => {
                if package.is_module() {
                    outcomes.push(self.register(package)?);
                }
            }
            PackageEvent::Update { previous, current } => {
                // Resolve both sides before touching the file
                let old_identifier = previous
                    .is_module()
                    .then(|| namespace::resolve(&previous.name, &previous.autoload))
                    .transpose()?;
                let new_identifier = current
                    .is_module()
                    .then(|| namespace::resolve(&current.name, &current.autoload))
                    .transpose()?;

                if let Some(identifier) = old_identifier {
                    outcomes.push(self.writer.apply_change(&identifier, None, None)?);
                }
                if let Some(identifier) = new_identifier {
                    outcomes.push(self.upsert(&identifier, current)?);
                }
            }
            PackageEvent::Uninstall(package) => {
                if package.is_module() {
                    let identifier = namespace::resolve(&package.name, &package.autoload)?;
                    outcomes.push(self.writer.apply_change(&identifier, None, None)?);
                }
            }
        }

        if outcomes.is_empty() {
            debug!("Event does not involve a module package");
        }
        Ok(outcomes)
    }

    fn register(&self, package: &Package) -> Result<ApplyOutcome> {
        let identifier = namespace::resolve(&package.name, &package.autoload)?;
        self.upsert(&identifier, package)
    }

    fn upsert(&self, identifier: &str, package: &Package) -> Result<ApplyOutcome> {
        let path = to_slash_string(&package.install_path(&self.writer.paths().vendor_dir));
        self.writer
            .apply_change(identifier, Some(&path), Some(&package.version))
    }
}
