// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash artifact store.
//!
//! Layout: `<root>/unique/<crash_id>/` holding the triggering testcase,
//! the guest's crash dump (when captured), and a metadata summary.
//! Duplicates are not re-stored; a higher-scoring duplicate replaces the
//! testcase in place.

use std::path::{Path, PathBuf};

use tracing::debug;

use fawkes_core::{CrashId, CrashReport};

const TESTCASE_FILE: &str = "testcase.bin";
const DUMP_FILE: &str = "crash.dmp";
const METADATA_FILE: &str = "metadata.json";

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating directories as needed).
    pub fn open(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.join("unique"))?;
        Ok(Self { root: root.to_path_buf() })
    }

    fn crash_dir(&self, id: CrashId) -> PathBuf {
        self.root.join("unique").join(id.to_string())
    }

    /// Store a new unique crash's artifacts.
    pub fn store_unique(
        &self,
        id: CrashId,
        report: &CrashReport,
        testcase: &[u8],
        dump: Option<&[u8]>,
    ) -> std::io::Result<()> {
        let dir = self.crash_dir(id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(TESTCASE_FILE), testcase)?;
        if let Some(bytes) = dump {
            std::fs::write(dir.join(DUMP_FILE), bytes)?;
        }
        let metadata = serde_json::to_vec_pretty(report).unwrap_or_default();
        std::fs::write(dir.join(METADATA_FILE), metadata)?;
        debug!(crash = %id, dir = %dir.display(), "artifacts stored");
        Ok(())
    }

    /// A duplicate out-scored the stored crash: swap in its testcase (and
    /// dump, when present).
    pub fn replace_testcase(
        &self,
        id: CrashId,
        testcase: &[u8],
        dump: Option<&[u8]>,
    ) -> std::io::Result<()> {
        let dir = self.crash_dir(id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(TESTCASE_FILE), testcase)?;
        if let Some(bytes) = dump {
            std::fs::write(dir.join(DUMP_FILE), bytes)?;
        }
        debug!(crash = %id, "testcase replaced by higher-scoring duplicate");
        Ok(())
    }

    pub fn testcase_path(&self, id: CrashId) -> PathBuf {
        self.crash_dir(id).join(TESTCASE_FILE)
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
