use anyhow::{Context, Result};
use log::{debug, error, info};
use std::path::{Path, PathBuf};

use crate::composer::Package;
use crate::namespace;
use crate::runtime::{Runtime, path::to_slash_string, write_replacing};

use super::{
    ModuleEntry, ModuleRegistry, Origin, RegistryPaths, UNKNOWN_VERSION, parse_registry,
    render_registry, scan_local_modules,
};

/// Result of one incremental change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The registry file was rewritten.
    Written,
    /// Nothing to change; the file was left as is.
    Unchanged,
    /// The registry file could not be read or parsed; it was left as is.
    Abandoned(String),
}

/// Build the complete registry from scratch.
///
/// Module packages among `candidates` are registered first; local modules
/// found under `local_modules_dir` are layered on top and win on collision.
#[tracing::instrument(skip(runtime, candidates))]
pub fn rebuild<R: Runtime>(
    runtime: &R,
    candidates: &[Package],
    local_modules_dir: &Path,
    vendor_dir: &Path,
) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();

    for package in candidates.iter().filter(|p| p.is_module()) {
        let identifier = namespace::resolve(&package.name, &package.autoload)?;
        let path = to_slash_string(&package.install_path(vendor_dir));
        debug!("Registering {} as {}", package.name, identifier);
        registry.insert(
            &identifier,
            ModuleEntry::new(&path, &package.version, Origin::Vendor),
        );
    }

    for (identifier, entry) in scan_local_modules(runtime, local_modules_dir)? {
        if registry.contains(&identifier) {
            info!("Local module {} overrides the installed package", identifier);
        }
        registry.insert(&identifier, entry);
    }

    Ok(registry)
}

/// Reads and writes the registry file of one project.
pub struct RegistryWriter<'a, R: Runtime> {
    runtime: &'a R,
    paths: RegistryPaths,
}

impl<'a, R: Runtime> RegistryWriter<'a, R> {
    pub fn new(runtime: &'a R, paths: RegistryPaths) -> Self {
        Self { runtime, paths }
    }

    pub fn paths(&self) -> &RegistryPaths {
        &self.paths
    }

    pub fn registry_file(&self) -> PathBuf {
        self.paths.registry_file()
    }

    /// Regenerate the whole registry file from `candidates` and the local
    /// modules directory.
    #[tracing::instrument(skip(self, candidates))]
    pub fn rebuild(&self, candidates: &[Package]) -> Result<ModuleRegistry> {
        let registry = rebuild(
            self.runtime,
            candidates,
            &self.paths.local_modules_dir(),
            &self.paths.vendor_dir,
        )?;
        self.save(&registry)?;
        info!(
            "Wrote {} module(s) to {:?}",
            registry.len(),
            self.registry_file()
        );
        Ok(registry)
    }

    /// Create the registry file if it does not exist yet, migrating the
    /// legacy file when there is one.
    #[tracing::instrument(skip(self))]
    pub fn ensure_exists(&self) -> Result<()> {
        let registry_file = self.registry_file();
        if self.runtime.exists(&registry_file) {
            return Ok(());
        }

        let legacy_file = self.paths.legacy_registry_file();
        if self.runtime.exists(&legacy_file) {
            info!("Migrating module registry from {:?}", legacy_file);
            let content = self
                .runtime
                .read_to_string(&legacy_file)
                .context("Failed to read legacy module registry")?;
            return write_replacing(self.runtime, &registry_file, content.as_bytes());
        }

        debug!("Creating empty module registry at {:?}", registry_file);
        self.save(&ModuleRegistry::new())
    }

    /// Load the registry file. Parse failures are reported as errors.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<ModuleRegistry> {
        let registry_file = self.registry_file();
        let content = self.runtime.read_to_string(&registry_file)?;
        parse_registry(&content)
            .with_context(|| format!("Corrupt module registry {:?}", registry_file))
    }

    #[tracing::instrument(skip(self, registry))]
    pub fn save(&self, registry: &ModuleRegistry) -> Result<()> {
        let registry_file = self.registry_file();
        let content = render_registry(registry, &self.paths.project_root, &registry_file)?;
        write_replacing(self.runtime, &registry_file, content.as_bytes())
            .with_context(|| format!("Failed to write module registry {:?}", registry_file))
    }

    /// Add, replace, or (with no `path`) remove a single module.
    ///
    /// The file is re-read before every change. A corrupt file is reported
    /// and left untouched.
    #[tracing::instrument(skip(self))]
    pub fn apply_change(
        &self,
        identifier: &str,
        path: Option<&str>,
        version: Option<&str>,
    ) -> Result<ApplyOutcome> {
        self.ensure_exists()?;

        let registry_file = self.registry_file();
        let parsed = self
            .runtime
            .read_to_string(&registry_file)
            .and_then(|content| parse_registry(&content));
        let mut registry = match parsed {
            Ok(registry) => registry,
            Err(e) => {
                let reason = format!(
                    "Module registry {:?} is unreadable ({:#}); {} was not updated",
                    registry_file, e, identifier
                );
                error!("{}", reason);
                return Ok(ApplyOutcome::Abandoned(reason));
            }
        };

        match path {
            None => {
                if registry.remove(identifier).is_none() {
                    debug!("{} is not registered, nothing to remove", identifier);
                    return Ok(ApplyOutcome::Unchanged);
                }
                info!("Unregistered module {}", identifier);
            }
            Some(path) => {
                let version = version.unwrap_or(UNKNOWN_VERSION);
                registry.insert(identifier, ModuleEntry::new(path, version, Origin::Vendor));
                info!("Registered module {} {}", identifier, version);
            }
        }

        self.save(&registry)?;
        Ok(ApplyOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::AmbiguousNamespaceError;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::{TempDir, tempdir};

    fn package(json: &str) -> Package {
        serde_json::from_str(json).unwrap()
    }

    fn blog_package() -> Package {
        package(
            r#"{"name": "acme/blog", "version": "1.2.0", "type": "nova-module",
                "autoload": {"psr-4": {"Blog\\": "src/"}}}"#,
        )
    }

    /// Project with `modules/Shop/module.json` declaring version 2.0.0.
    fn project() -> (TempDir, RegistryPaths) {
        let dir = tempdir().unwrap();
        let shop = dir.path().join("modules/Shop");
        std::fs::create_dir_all(&shop).unwrap();
        std::fs::write(shop.join("module.json"), r#"{"version":"2.0.0"}"#).unwrap();

        let paths = RegistryPaths::new(dir.path().to_path_buf(), dir.path().join("vendor"));
        (dir, paths)
    }

    #[test]
    fn test_rebuild_relative_dirs() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("modules")))
            .returning(|_| false);

        let candidates = vec![
            blog_package(),
            package(r#"{"name": "psr/log", "version": "3.0.0", "autoload": {"psr-4": {"A\\": "x", "B\\": "y"}}}"#),
        ];

        let registry =
            rebuild(&runtime, &candidates, Path::new("modules"), Path::new("vendor")).unwrap();

        // Non-module packages are skipped, even unresolvable ones
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("Blog").unwrap(),
            &ModuleEntry::new("vendor/acme/blog/", "1.2.0", Origin::Vendor)
        );
    }

    #[test]
    fn test_rebuild_local_overrides_vendor() {
        let mut runtime = MockRuntime::new();
        let modules_dir = PathBuf::from("/srv/app/modules");

        runtime
            .expect_exists()
            .with(eq(modules_dir.clone()))
            .returning(|_| true);
        runtime
            .expect_read_dir()
            .with(eq(modules_dir.clone()))
            .returning(|p| Ok(vec![p.join("Blog")]));
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_exists()
            .with(eq(modules_dir.join("Blog/module.json")))
            .returning(|_| false);

        let registry = rebuild(
            &runtime,
            &[blog_package()],
            &modules_dir,
            Path::new("/srv/app/vendor"),
        )
        .unwrap();

        let blog = registry.get("Blog").unwrap();
        assert_eq!(blog.origin, Origin::Local);
        assert_eq!(blog.path, "/srv/app/modules/Blog/");
        assert_eq!(blog.version, "0.0.0");
    }

    #[test]
    fn test_rebuild_ambiguous_namespace_aborts() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);

        let broken = package(
            r#"{"name": "acme/broken", "type": "nova-module",
                "autoload": {"psr-4": {"A\\": "lib/", "B\\": "tests/"}}}"#,
        );

        let err = rebuild(
            &runtime,
            &[blog_package(), broken],
            Path::new("modules"),
            Path::new("vendor"),
        )
        .unwrap_err();

        let ambiguous = err.downcast_ref::<AmbiguousNamespaceError>().unwrap();
        assert_eq!(ambiguous.package, "acme/broken");
    }

    #[test]
    fn test_writer_rebuild_scenario() {
        let (dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);

        writer.rebuild(&[blog_package()]).unwrap();

        let loaded = writer.load().unwrap();
        let ids: Vec<_> = loaded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["Blog", "Shop"]);
        assert_eq!(
            loaded.get("Blog").unwrap(),
            &ModuleEntry::new("vendor/acme/blog/", "1.2.0", Origin::Vendor)
        );
        assert_eq!(
            loaded.get("Shop").unwrap(),
            &ModuleEntry::new("modules/Shop/", "2.0.0", Origin::Local)
        );
        assert!(dir.path().join("vendor/novamod/modules.php").exists());
    }

    #[test]
    fn test_apply_change_removes_module() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);
        writer.rebuild(&[blog_package()]).unwrap();

        let outcome = writer.apply_change("Blog", None, None).unwrap();
        assert_eq!(outcome, ApplyOutcome::Written);

        let loaded = writer.load().unwrap();
        assert!(!loaded.contains("Blog"));
        assert!(loaded.contains("Shop"));
    }

    #[test]
    fn test_apply_change_missing_removal_is_byte_identical() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);
        writer.rebuild(&[blog_package()]).unwrap();

        let before = std::fs::read(writer.registry_file()).unwrap();
        let outcome = writer.apply_change("Missing", None, None).unwrap();
        let after = std::fs::read(writer.registry_file()).unwrap();

        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(before, after);
    }

    #[test]
    fn test_apply_change_update_renaming_namespace() {
        let (dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);
        writer.rebuild(&[blog_package()]).unwrap();

        let new_path = to_slash_string(&dir.path().join("vendor/acme/blog-core"));
        writer.apply_change("Blog", None, None).unwrap();
        writer
            .apply_change("Blog/Core", Some(&new_path), Some("2.0.0"))
            .unwrap();

        let loaded = writer.load().unwrap();
        assert!(!loaded.contains("Blog"));
        assert_eq!(
            loaded.get("Blog/Core").unwrap(),
            &ModuleEntry::new("vendor/acme/blog-core/", "2.0.0", Origin::Vendor)
        );
    }

    #[test]
    fn test_apply_change_normalizes_path_and_defaults_version() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);

        writer
            .apply_change("Blog", Some("vendor\\acme//blog"), None)
            .unwrap();

        let loaded = writer.load().unwrap();
        assert_eq!(
            loaded.get("Blog").unwrap(),
            &ModuleEntry::new("vendor/acme/blog/", "0.0.0", Origin::Vendor)
        );
    }

    #[test]
    fn test_apply_change_bootstraps_empty_registry() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);

        assert!(!writer.registry_file().exists());
        let outcome = writer.apply_change("Blog", None, None).unwrap();

        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(writer.registry_file().exists());
        assert!(writer.load().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_exists_migrates_legacy_file_verbatim() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths.clone());

        // Legacy registry rendered for the same project
        let mut legacy = ModuleRegistry::new();
        legacy.insert("Legacy", ModuleEntry::new("vendor/old/legacy", "0.9.0", Origin::Vendor));
        let legacy_content =
            render_registry(&legacy, &paths.project_root, &paths.legacy_registry_file()).unwrap();
        std::fs::create_dir_all(paths.legacy_registry_file().parent().unwrap()).unwrap();
        std::fs::write(paths.legacy_registry_file(), &legacy_content).unwrap();

        writer.ensure_exists().unwrap();

        assert_eq!(
            std::fs::read_to_string(writer.registry_file()).unwrap(),
            legacy_content
        );
        assert!(writer.load().unwrap().contains("Legacy"));
    }

    #[test]
    fn test_ensure_exists_keeps_existing_file() {
        let mut runtime = MockRuntime::new();
        let paths = RegistryPaths::new(PathBuf::from("/srv/app"), PathBuf::from("/srv/app/vendor"));

        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/srv/app/vendor/novamod/modules.php")))
            .returning(|_| true);
        runtime.expect_write().never();

        RegistryWriter::new(&runtime, paths).ensure_exists().unwrap();
    }

    #[test_log::test]
    fn test_apply_change_corrupt_registry_is_left_untouched() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);

        std::fs::create_dir_all(writer.registry_file().parent().unwrap()).unwrap();
        std::fs::write(writer.registry_file(), "<?php return garbage;").unwrap();

        let outcome = writer
            .apply_change("Blog", Some("vendor/acme/blog"), Some("1.0.0"))
            .unwrap();

        match outcome {
            ApplyOutcome::Abandoned(reason) => assert!(reason.contains("Blog")),
            other => panic!("Expected Abandoned, got {:?}", other),
        }
        assert_eq!(
            std::fs::read_to_string(writer.registry_file()).unwrap(),
            "<?php return garbage;"
        );
        assert!(writer.load().is_err());
    }

    #[test_log::test]
    fn test_apply_change_non_utf8_registry_is_left_untouched() {
        let (_dir, paths) = project();
        let runtime = RealRuntime;
        let writer = RegistryWriter::new(&runtime, paths);

        let garbage: [u8; 4] = [0xff, 0xfe, 0x00, 0x80];
        std::fs::create_dir_all(writer.registry_file().parent().unwrap()).unwrap();
        std::fs::write(writer.registry_file(), garbage).unwrap();

        let outcome = writer
            .apply_change("Blog", Some("vendor/acme/blog"), Some("1.0.0"))
            .unwrap();

        assert!(matches!(outcome, ApplyOutcome::Abandoned(reason) if reason.contains("Blog")));
        assert_eq!(std::fs::read(writer.registry_file()).unwrap(), garbage);
    }

    #[test]
    fn test_apply_change_write_failure_propagates() {
        let mut runtime = MockRuntime::new();
        let paths = RegistryPaths::new(PathBuf::from("/srv/app"), PathBuf::from("/srv/app/vendor"));
        let registry_file = paths.registry_file();
        let existing =
            render_registry(&ModuleRegistry::new(), &paths.project_root, &registry_file).unwrap();

        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(registry_file.clone()))
            .returning(move |_| Ok(existing.clone()));
        runtime
            .expect_write()
            .returning(|_, _| Err(anyhow::anyhow!("read-only file system")));

        let writer = RegistryWriter::new(&runtime, paths);
        let err = writer
            .apply_change("Blog", Some("vendor/acme/blog"), Some("1.0.0"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("read-only file system"));
    }
}
