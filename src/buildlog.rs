//! Rotating log files for toolchain runs
//!
//! Each run gets its own timestamped file; once a new file has been written
//! the oldest files are deleted so that only `retain` remain. The write and
//! the prune are separate steps, so a crash in between can leave extra files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::process::CommandOutput;

const LOG_EXT: &str = "log";

pub struct BuildLog {
    dir: PathBuf,
    retain: usize,
}

impl BuildLog {
    pub fn new(dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            dir: dir.into(),
            retain: retain.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `output` to a new log file and prune old ones.
    pub fn record(&self, label: &str, output: &CommandOutput) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory {}", self.dir.display()))?;

        let path = self.new_log_path(label);
        let mut file = fs::File::create(&path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        write!(
            file,
            "# {label}: {}\n\n## stdout\n{}\n## stderr\n{}",
            output.status(),
            output.stdout,
            output.stderr
        )
        .with_context(|| format!("failed to write log file {}", path.display()))?;
        drop(file);

        let removed = self.prune()?;
        if removed > 0 {
            debug!("removed {removed} old log file(s) from {}", self.dir.display());
        }
        Ok(path)
    }

    /// Delete all but the `retain` most recent log files. Returns how many were removed.
    pub fn prune(&self) -> Result<usize> {
        let mut logs = self.list()?;
        if logs.len() <= self.retain {
            return Ok(0);
        }

        let excess = logs.len() - self.retain;
        for (path, _) in logs.drain(..excess) {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove old log {}", path.display()))?;
        }
        Ok(excess)
    }

    /// Log files in the directory, oldest first.
    pub fn list(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read log directory {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXT) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            logs.push((path, meta.modified()?));
        }
        // Names embed a sortable timestamp, which breaks mtime ties
        logs.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(logs)
    }

    fn new_log_path(&self, label: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.9f");
        let base = format!("{label}-{stamp}");
        let mut path = self.dir.join(format!("{base}.{LOG_EXT}"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{base}-{n}.{LOG_EXT}"));
            n += 1;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn output(text: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn record_writes_status_and_streams() {
        let tmp = TempDir::new().unwrap();
        let log = BuildLog::new(tmp.path().join("logs"), 3);
        let out = CommandOutput {
            code: Some(2),
            stdout: "compiling\n".into(),
            stderr: "error: nope\n".into(),
        };
        let path = log.record("build", &out).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("build-"));
        assert!(name.ends_with(".log"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("exit code 2"));
        assert!(text.contains("compiling"));
        assert!(text.contains("error: nope"));
    }

    #[test]
    fn keeps_only_the_most_recent_files() {
        let tmp = TempDir::new().unwrap();
        let log = BuildLog::new(tmp.path(), 3);

        let written: Vec<PathBuf> = (0..5)
            .map(|i| log.record("build", &output(&format!("run {i}"))).unwrap())
            .collect();

        let kept: Vec<PathBuf> = log.list().unwrap().into_iter().map(|(p, _)| p).collect();
        assert_eq!(kept, written[2..].to_vec());
    }

    #[test]
    fn unrelated_files_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();
        let log = BuildLog::new(tmp.path(), 1);
        log.record("flash", &output("a")).unwrap();
        log.record("flash", &output("b")).unwrap();

        assert!(tmp.path().join("notes.txt").exists());
        assert_eq!(log.list().unwrap().len(), 1);
    }
}
