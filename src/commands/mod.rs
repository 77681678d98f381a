use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::{
    composer::{InstalledPackages, Package},
    plugin::{HookCheck, PackageEvent, Plugin, hook_warning},
    registry::ApplyOutcome,
    runtime::Runtime,
};

pub mod config;

use config::Config;

/// Regenerate the registry from installed.json and the local modules directory
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn rebuild<R: Runtime>(runtime: R, config: Config, hook_check: &HookCheck) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let installed = InstalledPackages::load(&runtime, &config.paths.installed_file())?;
    debug!("Found {} installed package(s)", installed.packages.len());

    let registry = plugin.rebuild(&installed.packages)?;
    println!(
        "Generated module registry with {} module(s) at {}",
        registry.len(),
        plugin.writer().registry_file().display()
    );
    Ok(())
}

/// Register a freshly installed package
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn install<R: Runtime>(
    runtime: R,
    name: &str,
    config: Config,
    hook_check: &HookCheck,
) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let installed = InstalledPackages::load(&runtime, &config.paths.installed_file())?;
    let package = find_installed(&installed, name)?;

    let outcomes = plugin.handle(PackageEvent::Install(package))?;
    report(name, &outcomes);
    Ok(())
}

/// Re-register an updated package, optionally against its previous definition
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn update<R: Runtime>(
    runtime: R,
    name: &str,
    previous: Option<PathBuf>,
    config: Config,
    hook_check: &HookCheck,
) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let installed = InstalledPackages::load(&runtime, &config.paths.installed_file())?;
    let current = find_installed(&installed, name)?;

    let previous = match previous {
        Some(path) => Package::load(&runtime, &path)?,
        None => current.clone(),
    };

    let outcomes = plugin.handle(PackageEvent::Update {
        previous: &previous,
        current,
    })?;
    report(name, &outcomes);
    Ok(())
}

/// Unregister a package that is about to be removed
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn uninstall<R: Runtime>(
    runtime: R,
    name: &str,
    config: Config,
    hook_check: &HookCheck,
) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let installed = InstalledPackages::load(&runtime, &config.paths.installed_file())?;
    let package = find_installed(&installed, name)?;

    let outcomes = plugin.handle(PackageEvent::Uninstall(package))?;
    report(name, &outcomes);
    Ok(())
}

/// Add, replace, or remove (no `path`) one registry entry directly
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn apply<R: Runtime>(
    runtime: R,
    identifier: &str,
    path: Option<String>,
    version: Option<String>,
    config: Config,
    hook_check: &HookCheck,
) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let outcome =
        plugin
            .writer()
            .apply_change(identifier, path.as_deref(), version.as_deref())?;
    report(identifier, &[outcome]);
    Ok(())
}

/// Print the registered modules
#[tracing::instrument(skip(runtime, config, hook_check))]
pub fn list<R: Runtime>(runtime: R, config: Config, hook_check: &HookCheck) -> Result<()> {
    let plugin = Plugin::new(&runtime, config.paths.clone(), &config.manifest, hook_check);
    let writer = plugin.writer();

    if !runtime.exists(&writer.registry_file()) {
        println!("No modules registered.");
        return Ok(());
    }

    let registry = writer.load()?;
    if registry.is_empty() {
        println!("No modules registered.");
        return Ok(());
    }

    for (identifier, entry) in registry.iter() {
        println!(
            "{} {} {} {}",
            identifier, entry.version, entry.origin, entry.path
        );
    }
    Ok(())
}

/// Check that the project rebuilds the registry after autoload dumps
#[tracing::instrument(skip(config))]
pub fn check(config: Config) -> Result<()> {
    match hook_warning(&config.manifest) {
        Some(warning) => println!("{}", warning),
        None => println!("Module registry hooks are configured."),
    }
    Ok(())
}

fn find_installed<'p>(installed: &'p InstalledPackages, name: &str) -> Result<&'p Package> {
    installed
        .find(name)
        .with_context(|| format!("Package {} is not installed", name))
}

fn report(subject: &str, outcomes: &[ApplyOutcome]) {
    if outcomes.is_empty() {
        println!("{} is not a module package, nothing to do.", subject);
    }
    for outcome in outcomes {
        match outcome {
            ApplyOutcome::Written => println!("Updated module registry for {}", subject),
            ApplyOutcome::Unchanged => println!("Module registry already up to date for {}", subject),
            ApplyOutcome::Abandoned(reason) => eprintln!("Error: {}", reason),
        }
    }
}
