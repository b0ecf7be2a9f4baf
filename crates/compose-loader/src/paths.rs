//! Resolution of relative host paths against the project working directory.

use std::path::{Component, Path, PathBuf};

use compose_yaml::Value;

use crate::error::Result;

/// Rewrite relative filesystem paths in path-bearing fields to absolute
/// paths anchored at `working_dir`.
///
/// Runs on the canonical tree, so volumes and builds are already in long
/// form and env_file is already a sequence.
pub fn resolve_relative_paths(tree: &mut Value, working_dir: &Path) -> Result<()> {
    if let Some(services) = tree.get_mut("services").and_then(Value::as_mapping_mut) {
        for service in services.values_mut() {
            if let Some(context) = service
                .get_mut("build")
                .and_then(|build| build.get_mut("context"))
            {
                resolve_field(context, working_dir);
            }

            if let Some(env_files) = service.get_mut("env_file").and_then(Value::as_sequence_mut) {
                for entry in env_files {
                    resolve_field(entry, working_dir);
                }
            }

            if let Some(volumes) = service.get_mut("volumes").and_then(Value::as_sequence_mut) {
                for volume in volumes {
                    let is_bind = volume.get("type").and_then(Value::as_str) == Some("bind");
                    if !is_bind {
                        continue;
                    }
                    if let Some(source) = volume.get_mut("source") {
                        resolve_volume_source(source, working_dir);
                    }
                }
            }
        }
    }

    for section in ["secrets", "configs"] {
        if let Some(entries) = tree.get_mut(section).and_then(Value::as_mapping_mut) {
            for entry in entries.values_mut() {
                if let Some(file) = entry.get_mut("file") {
                    resolve_field(file, working_dir);
                }
            }
        }
    }

    Ok(())
}

fn resolve_field(value: &mut Value, working_dir: &Path) {
    if let Value::String(path) = value {
        if !Path::new(path.as_str()).is_absolute() {
            *path = join_clean(working_dir, path).to_string_lossy().into_owned();
        }
    }
}

/// Join a relative path onto a base, resolving `.` and `..` lexically.
pub(crate) fn join_clean(base: &Path, relative: &str) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Bind sources resolve like other fields, except Windows-drive and `~`
/// sources, which stay untouched for the post-model conversion steps.
fn resolve_volume_source(value: &mut Value, working_dir: &Path) {
    if let Value::String(source) = value {
        if has_windows_drive(source) || source.starts_with('~') {
            return;
        }
        if !Path::new(source.as_str()).is_absolute() {
            *source = join_clean(working_dir, source)
                .to_string_lossy()
                .into_owned();
        }
    }
}

pub(crate) fn has_windows_drive(path: &str) -> bool {
    path.len() >= 2
        && path.as_bytes()[1] == b':'
        && path.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Convert a Windows volume source to the engine's Linux style:
/// `C:\my\data` becomes `/c/my/data`.
pub fn convert_windows_path(source: &str) -> String {
    if !has_windows_drive(source) {
        return source.to_string();
    }
    let drive = source
        .chars()
        .next()
        .expect("drive letter present")
        .to_ascii_lowercase();
    let rest = &source[2..];
    format!("/{}{}", drive, rest.replace('\\', "/"))
}
