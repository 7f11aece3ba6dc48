//! Plugin manifest reading and discovery

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::descriptor::PluginDescriptor;
use crate::{PluginError, PluginResult};

/// Default cap on manifest size
pub const DEFAULT_MAX_MANIFEST_BYTES: u64 = 64 * 1024;

/// Load and validate one plugin manifest (JSON)
pub fn load_descriptor(path: &Path, max_bytes: u64) -> PluginResult<PluginDescriptor> {
    let path = resolve_manifest_path(path)?;

    let metadata = fs::metadata(&path)?;
    if metadata.len() > max_bytes {
        return Err(PluginError::ManifestInvalid(format!(
            "{} is too large: {} bytes (limit {})",
            path.display(),
            metadata.len(),
            max_bytes
        )));
    }

    let data = fs::read_to_string(&path)?;
    let descriptor: PluginDescriptor = serde_json::from_str(&data).map_err(|e| {
        PluginError::ManifestInvalid(format!("{}: invalid manifest JSON: {e}", path.display()))
    })?;

    validate_descriptor(&descriptor)
        .map_err(|reason| PluginError::ManifestInvalid(format!("{}: {reason}", path.display())))?;

    Ok(descriptor)
}

/// Load every `*.json` manifest directly inside `dir`
///
/// Files are read in path order. A manifest that fails to load, or that
/// repeats an id already seen, is logged and skipped. A missing directory
/// yields no descriptors.
pub fn discover(dir: &Path, max_bytes: u64) -> PluginResult<Vec<PluginDescriptor>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Plugin directory does not exist");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(paths.len());
    for path in paths {
        match load_descriptor(&path, max_bytes) {
            Ok(descriptor) => {
                if !seen.insert(descriptor.id.clone()) {
                    warn!(
                        path = %path.display(),
                        plugin = %descriptor.id,
                        "Skipping manifest with duplicate plugin id"
                    );
                    continue;
                }
                debug!(path = %path.display(), plugin = %descriptor.id, "Discovered plugin");
                descriptors.push(descriptor);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid plugin manifest");
            }
        }
    }

    Ok(descriptors)
}

fn validate_descriptor(descriptor: &PluginDescriptor) -> Result<(), String> {
    if descriptor.id.trim().is_empty() {
        return Err("plugin id cannot be empty".to_string());
    }

    let deps = &descriptor.dependencies;
    let names = deps
        .plugins
        .keys()
        .chain(deps.libraries.keys())
        .chain(deps.optional.plugins.keys())
        .chain(deps.optional.libraries.keys());
    for name in names {
        if name.trim().is_empty() {
            return Err("dependency names cannot be empty".to_string());
        }
    }

    if deps.plugins.contains_key(&descriptor.id) {
        return Err(format!("plugin '{}' cannot depend on itself", descriptor.id));
    }

    Ok(())
}

fn resolve_manifest_path(path: &Path) -> PluginResult<PathBuf> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Err(PluginError::ManifestInvalid(format!(
            "{} is a symlink; manifests must be regular files",
            path.display()
        )));
    }
    if !metadata.file_type().is_file() {
        return Err(PluginError::ManifestInvalid(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    Ok(path.canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "main.json",
            r#"{"id": "main", "version": "1.2.0", "name": "Main",
                "description": "Entry point",
                "dependencies": {"plugins": {"dep": ">=1.0.0"}}}"#,
        );

        let descriptor = load_descriptor(&path, DEFAULT_MAX_MANIFEST_BYTES).unwrap();
        assert_eq!(descriptor.display_name(), "Main");

        let expected = PluginDescriptor::new("main", crate::version::Version::new(1, 2, 0))
            .with_name("Main")
            .with_description("Entry point")
            .with_dependencies(
                crate::descriptor::DependencySpec::new().require_plugin("dep", ">=1.0.0"),
            );
        assert_eq!(descriptor, expected);
    }

    #[test]
    fn test_manifest_too_large() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "big.json", r#"{"id": "big", "version": "1.0.0"}"#);
        let err = load_descriptor(&path, 8).unwrap_err();
        assert!(matches!(err, PluginError::ManifestInvalid(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_manifest_validation() {
        let dir = TempDir::new().unwrap();
        let cases = [
            ("empty_id.json", r#"{"id": " ", "version": "1.0.0"}"#),
            ("bad_version.json", r#"{"id": "p", "version": "latest"}"#),
            (
                "empty_dep.json",
                r#"{"id": "p", "version": "1.0.0", "dependencies": {"libraries": {"": ">=1.0.0"}}}"#,
            ),
            (
                "self_dep.json",
                r#"{"id": "p", "version": "1.0.0", "dependencies": {"plugins": {"p": ">=1.0.0"}}}"#,
            ),
            ("not_json.json", "id = p"),
        ];
        for (name, body) in cases {
            let path = write(&dir, name, body);
            let err = load_descriptor(&path, DEFAULT_MAX_MANIFEST_BYTES).unwrap_err();
            assert!(matches!(err, PluginError::ManifestInvalid(_)), "{name}: {err}");
        }
    }

    #[test]
    fn test_directory_is_not_a_manifest() {
        let dir = TempDir::new().unwrap();
        let err = load_descriptor(dir.path(), DEFAULT_MAX_MANIFEST_BYTES).unwrap_err();
        assert!(matches!(err, PluginError::ManifestInvalid(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected() {
        let dir = TempDir::new().unwrap();
        let target = write(&dir, "real.json", r#"{"id": "real", "version": "1.0.0"}"#);
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = load_descriptor(&link, DEFAULT_MAX_MANIFEST_BYTES).unwrap_err();
        assert!(matches!(err, PluginError::ManifestInvalid(msg) if msg.contains("symlink")));
    }

    #[test]
    fn test_discover_skips_bad_manifests() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.json", r#"{"id": "beta", "version": "2.0.0"}"#);
        write(&dir, "a.json", r#"{"id": "alpha", "version": "1.0.0"}"#);
        write(&dir, "c.json", "{ not json");
        write(&dir, "d.json", r#"{"id": "alpha", "version": "9.0.0"}"#);
        write(&dir, "notes.txt", "ignored");
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let descriptors = discover(dir.path(), DEFAULT_MAX_MANIFEST_BYTES).unwrap();
        let ids: Vec<_> = descriptors.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(descriptors[0].version.to_string(), "1.0.0");
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = TempDir::new().unwrap();
        let descriptors =
            discover(&dir.path().join("absent"), DEFAULT_MAX_MANIFEST_BYTES).unwrap();
        assert!(descriptors.is_empty());
    }
}
