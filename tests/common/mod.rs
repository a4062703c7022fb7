//! Shared fixtures for the integration tests.
//!
//! Writes the miniature game module from [`ilpatch::test::factories::game`] together with
//! the three reference modules into a temporary game directory.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ilpatch::{metadata::Module, test::factories::game as fixtures};
use tempfile::TempDir;

pub use fixtures::GAME_MODULE;

/// The game module. With `nop_at`, the duration literal at that offset is replaced by
/// `nop`s of the same size.
pub fn game_module(nop_at: Option<u32>) -> Module {
    fixtures::game_module_with(nop_at).unwrap()
}

/// A temporary game directory holding the target and its reference modules.
pub struct GameDir {
    pub dir: TempDir,
    pub target: PathBuf,
}

impl GameDir {
    pub fn new() -> Self {
        GameDir::with(game_module(None))
    }

    pub fn with(game: Module) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for module in fixtures::reference_modules().unwrap() {
            module.write_to_file(&dir.path().join(module.name())).unwrap();
        }
        let target = dir.path().join(GAME_MODULE);
        game.write_to_file(&target).unwrap();
        GameDir { dir, target }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.target).unwrap()
    }

    /// Names of every entry in the directory, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
