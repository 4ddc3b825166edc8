pub mod artifact;
pub mod markdown;

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use which::which;

use crate::error::ScanError;

/// Resolves the full path to a tool binary.
/// Search order: ./tools/{name} → ./{name} → System PATH.
/// A value containing a path separator is taken as given.
pub fn get_binary_path(tool_name: &str) -> Option<PathBuf> {
    if tool_name.contains(std::path::MAIN_SEPARATOR) || tool_name.contains('/') {
        let path = PathBuf::from(tool_name);
        return path.exists().then_some(path);
    }

    let binary_name = if cfg!(target_os = "windows") {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    };

    // 1. ./tools/ (where deployments drop the fuzzer's launcher)
    let tools_path = PathBuf::from("./tools").join(&binary_name);
    if tools_path.is_file() {
        return Some(tools_path);
    }

    // 2. Current directory
    let local_path = PathBuf::from("./").join(&binary_name);
    if local_path.is_file() {
        return Some(local_path);
    }

    // 3. System PATH
    which(&binary_name).ok()
}

fn package_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("static regex")
    })
}

fn record_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{0,63}$").expect("static regex"))
}

/// Checks a package name against the package index's project-name grammar.
pub fn validate_package_name(name: &str) -> Result<&str, ScanError> {
    if name.len() <= 214 && package_name_re().is_match(name) {
        Ok(name)
    } else {
        Err(ScanError::InvalidArgument { field: "package name", value: name.to_string() })
    }
}

pub fn validate_record_id(id: &str) -> Result<&str, ScanError> {
    if record_id_re().is_match(id) {
        Ok(id)
    } else {
        Err(ScanError::InvalidArgument { field: "record id", value: id.to_string() })
    }
}
