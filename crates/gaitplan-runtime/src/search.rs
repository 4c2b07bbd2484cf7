//! Plan file lookup.

use std::path::{Path, PathBuf};

use gaitplan_types::PlanError;

/// Resolve `name` to an existing file.
///
/// Absolute paths and paths that exist relative to the working directory are
/// returned as-is.  Otherwise each directory of `search_path` is tried in
/// order, and the first hit wins.
pub fn search_file(name: &str, search_path: &[PathBuf]) -> Result<PathBuf, PlanError> {
    let direct = Path::new(name);
    if direct.is_absolute() || direct.is_file() {
        return if direct.is_file() {
            Ok(direct.to_path_buf())
        } else {
            Err(PlanError::PlanNotFound {
                name: name.to_string(),
                searched: Vec::new(),
            })
        };
    }
    search_path
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| PlanError::PlanNotFound {
            name: name.to_string(),
            searched: search_path
                .iter()
                .map(|d| d.display().to_string())
                .collect(),
        })
}
