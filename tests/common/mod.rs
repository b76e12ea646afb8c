#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use cohort_lens::dataset::Datasets;
use cohort_lens::io_utils;

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Loads the three fixture tables the pipeline tests share.
pub fn fixture_datasets() -> Datasets {
    Datasets {
        enrollments: io_utils::load_table(&fixture_path("enrollments.csv"), None, None)
            .expect("load enrollments fixture"),
        evaluations: io_utils::load_table(&fixture_path("evaluations_long.csv"), None, None)
            .expect("load evaluations fixture"),
        students: io_utils::load_table(&fixture_path("students.csv"), None, None)
            .expect("load students fixture"),
    }
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

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
