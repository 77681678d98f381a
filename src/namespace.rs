//! Namespace inference from PSR-4 autoload declarations.
//!
//! Packages declare their autoload roots inconsistently, so the identifier is
//! picked by the most specific signal available:
//!
//! 1. a PSR-4 mapping with a single entry,
//! 2. the first entry rooted at `src` (`src`, `src/`, `./src`, `./src/`),
//! 3. the last entry rooted at the package root (`""` or `"."`).

use serde_json::{Map, Value};

/// Autoload mechanism that carries namespace information.
pub const PSR4: &str = "psr-4";

/// Where to read about declaring a resolvable autoload mapping.
pub const AUTOLOAD_DOCS_URL: &str = "https://getcomposer.org/doc/04-schema.md#psr-4";

/// No identifier could be derived from a package's autoload declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousNamespaceError {
    pub package: String,
}

impl std::fmt::Display for AmbiguousNamespaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unable to determine the module namespace of package \"{}\". \
             Declare a single PSR-4 namespace, or map the primary namespace to \"src/\". \
             See {}",
            self.package, AUTOLOAD_DOCS_URL
        )
    }
}

impl std::error::Error for AmbiguousNamespaceError {}

/// Derive the canonical identifier of `package` from its autoload mapping.
///
/// The returned identifier has surrounding separators stripped and embedded
/// backslashes replaced with `/` (`Acme\Blog\` becomes `Acme/Blog`).
pub fn resolve(
    package: &str,
    autoload: &Map<String, Value>,
) -> Result<String, AmbiguousNamespaceError> {
    let ambiguous = || AmbiguousNamespaceError {
        package: package.to_string(),
    };

    let psr4 = autoload
        .get(PSR4)
        .and_then(Value::as_object)
        .ok_or_else(ambiguous)?;

    let namespace = if psr4.len() == 1 {
        psr4.keys().next().cloned()
    } else {
        psr4.iter()
            .find(|(_, dirs)| any_dir(dirs, is_src_dir))
            .map(|(ns, _)| ns.clone())
            .or_else(|| {
                psr4.iter()
                    .filter(|(_, dirs)| any_dir(dirs, is_root_dir))
                    .last()
                    .map(|(ns, _)| ns.clone())
            })
    };

    namespace.map(|ns| canonical_identifier(&ns)).ok_or_else(ambiguous)
}

/// Strip surrounding namespace separators and normalize the rest to `/`.
pub fn canonical_identifier(namespace: &str) -> String {
    namespace
        .trim_matches(|c| c == '\\' || c == '/')
        .replace('\\', "/")
}

/// A PSR-4 directory is a string or a list of strings.
fn any_dir(dirs: &Value, matches: fn(&str) -> bool) -> bool {
    match dirs {
        Value::String(dir) => matches(dir),
        Value::Array(list) => list.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn is_src_dir(dir: &str) -> bool {
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    dir == "src" || dir == "src/"
}

fn is_root_dir(dir: &str) -> bool {
    dir.is_empty() || dir == "."
}
