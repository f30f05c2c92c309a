//! Source file collection.

use std::path::{Path, PathBuf};

use anyhow::Context;
use glob::Pattern;
use pyxstub_engine::StubConfig;

/// Collect every `.pyx` file under `root`, sorted, skipping hidden
/// directories and paths matched by the config's exclude patterns.
pub fn collect_pyx_files(root: &Path, config: &StubConfig) -> anyhow::Result<Vec<PathBuf>> {
    let exclude = config.exclude_patterns()?;
    let mut files = Vec::new();
    collect_pyx_in_dir(root, root, &exclude, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_pyx_in_dir(
    root: &Path,
    dir: &Path,
    exclude: &[Pattern],
    files: &mut Vec<PathBuf>,
) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if exclude.iter().any(|pattern| pattern.matches_path(relative)) {
            tracing::debug!(path = %relative.display(), "excluded");
            continue;
        }

        if path.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == "__pycache__" {
                continue;
            }
            collect_pyx_in_dir(root, &path, exclude, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("pyx") {
            files.push(path);
        }
    }
    Ok(())
}

/// Where the stub of `source` is written.
pub fn stub_path(source: &Path) -> PathBuf {
    source.with_extension("pyi")
}
