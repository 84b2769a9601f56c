//! Engine binary discovery

use std::path::{Path, PathBuf};

use sx_core::config::default_config_dir;
use sx_core::ProcessError;

/// File name of the engine binary on this platform
pub fn engine_file_name() -> String {
    format!("sing-box{}", std::env::consts::EXE_SUFFIX)
}

/// Locate the engine binary.
///
/// Search order: `PATH`, the directory of the running executable, its
/// `bin/` subdirectory, then the configuration directory.
pub fn locate_engine_binary() -> Result<PathBuf, ProcessError> {
    let name = engine_file_name();

    if let Ok(path) = which::which(&name) {
        return Ok(path);
    }

    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(&name));
        candidates.push(exe_dir.join("bin").join(&name));
    }
    candidates.push(default_config_dir().join(&name));

    find_in(&candidates).ok_or_else(|| ProcessError::BinaryNotFound {
        searched: std::iter::once("PATH".to_string())
            .chain(candidates.iter().map(|p| p.display().to_string()))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn find_in(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}
