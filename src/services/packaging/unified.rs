//! Unified project assembly.
//!
//! Code files for recognized languages are re-homed to canonical
//! directories by inspecting the file's package/namespace declaration;
//! documents go under `docs/` except the README, which stays at the root.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::models::drop::QuantumDrop;

/// Canonical destination for one file.
pub fn rehome(path: &str, content: &str, language: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let lowered = file_name.to_lowercase();

    if lowered == "readme.md" {
        return "README.md".to_string();
    }
    if lowered.ends_with(".md") || lowered.ends_with(".txt") {
        if path.starts_with("docs/") {
            return path.to_string();
        }
        return format!("docs/{file_name}");
    }

    if language == "go" {
        if let Some(package) = go_package(content) {
            return if package == "main" {
                format!("cmd/app/{file_name}")
            } else {
                format!("internal/{package}/{file_name}")
            };
        }
    }

    path.to_string()
}

fn go_package(content: &str) -> Option<&str> {
    content.lines().find_map(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix("package ")
            .map(|rest| rest.split_whitespace().next().unwrap_or(rest))
    })
}

/// Merge every drop's files into a single tree. First writer wins on path
/// collisions; later duplicates are logged and skipped.
pub fn unified_project(drops: &[QuantumDrop]) -> BTreeMap<String, String> {
    let mut tree: BTreeMap<String, String> = BTreeMap::new();
    for drop in drops {
        for (path, content) in &drop.files {
            if tree.contains_key(path) {
                debug!(%path, drop = %drop.kind, "duplicate path in unified project; keeping first");
                continue;
            }
            tree.insert(path.clone(), content.clone());
        }
    }
    tree
}

/// Directory -> file-name listing for a set of paths.
pub fn structure_of<'a, I: IntoIterator<Item = &'a String>>(
    paths: I,
) -> BTreeMap<String, Vec<String>> {
    let mut structure: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in paths {
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (".".to_string(), path.clone()),
        };
        structure.entry(dir).or_default().push(file);
    }
    for files in structure.values_mut() {
        files.sort();
    }
    structure
}
