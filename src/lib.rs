//! novamod - module registry for Composer projects.
//!
//! Discovers module packages (type `nova-module`) among the installed
//! dependencies and in the project's `modules/` directory, and keeps a
//! PHP-loadable registry mapping module namespaces to their directories.

pub mod commands;
pub mod composer;
pub mod namespace;
pub mod plugin;
pub mod registry;
pub mod runtime;
