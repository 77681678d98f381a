//! Typed views over the data Composer persists for a project.
//!
//! - `package` - packages as listed in `vendor/composer/installed.json`
//! - `manifest` - the root `composer.json`

mod manifest;
mod package;

pub use manifest::{ProjectManifest, REBUILD_EVENT};
pub use package::{InstalledPackages, MODULE_TYPE, Package};
