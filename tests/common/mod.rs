#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};
use testcase_import::{
    import::{ImportOptions, ImportOutcome, import_bytes},
    preset::FieldPreset,
    tabular::SourceFormat,
};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    fs::read(fixture_path(name)).expect("read fixture")
}

/// Runs the pipeline over CSV text with the built-in preset.
pub fn import_csv(text: &str, options: &ImportOptions<'_>) -> ImportOutcome {
    import_bytes(
        text.as_bytes(),
        SourceFormat::Csv,
        options,
        &FieldPreset::default(),
    )
}

pub fn import_fixture(name: &str, options: &ImportOptions<'_>) -> ImportOutcome {
    let path = fixture_path(name);
    let format = SourceFormat::from_path(&path).expect("fixture format");
    import_bytes(
        &fixture_bytes(name),
        format,
        options,
        &FieldPreset::default(),
    )
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}
