extern crate dirs_sys;

use std::path::PathBuf;

#[cfg(not(target_os = "windows"))]
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .and_then(dirs_sys::is_absolute_path)
        .or_else(|| dirs_sys::home_dir().map(|home| home.join(".config")))
}

#[cfg(target_os = "windows")]
pub fn config_dir() -> Option<PathBuf> {
    dirs_sys::known_folder_roaming_app_data()
}
