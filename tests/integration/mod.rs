//! Built-in patch sets against mock build trees.

mod builtin_sets;
mod miui_camera;

use std::fs;
use std::path::Path;

/// Write `contents` to `relative` under `root`, creating parent directories.
pub(crate) fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}
