use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    Missing,
    SourceNewer(PathBuf),
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Missing => write!(f, "missing"),
            RebuildReason::SourceNewer(path) => write!(f, "source newer: {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBuildDecision {
    ForceRebuild,
    RebuildRequired(RebuildReason),
    RebuildNotRequired,
}

impl ImageBuildDecision {
    pub fn should_build(&self) -> bool {
        !matches!(self, ImageBuildDecision::RebuildNotRequired)
    }
}

/// Decide from timestamps alone whether the image must be rebuilt.
///
/// A source only counts as newer when its mtime is strictly greater than the
/// image's; equal timestamps keep the image.
pub fn decide<I>(force: bool, image_mtime: Option<SystemTime>, sources: I) -> ImageBuildDecision
where
    I: IntoIterator<Item = (PathBuf, SystemTime)>,
{
    if force {
        return ImageBuildDecision::ForceRebuild;
    }
    let Some(image_mtime) = image_mtime else {
        return ImageBuildDecision::RebuildRequired(RebuildReason::Missing);
    };
    sources
        .into_iter()
        .find(|(_, mtime)| *mtime > image_mtime)
        .map(|(path, _)| ImageBuildDecision::RebuildRequired(RebuildReason::SourceNewer(path)))
        .unwrap_or(ImageBuildDecision::RebuildNotRequired)
}

/// Compare `image` against every regular file under `data_dir`.
pub fn needs_rebuild(
    force: bool,
    image: &Path,
    data_dir: &Path,
) -> std::io::Result<ImageBuildDecision> {
    if force {
        return Ok(ImageBuildDecision::ForceRebuild);
    }
    let image_mtime = match std::fs::metadata(image) {
        Ok(meta) if meta.is_file() => Some(meta.modified()?),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    if image_mtime.is_none() {
        return Ok(decide(false, None, std::iter::empty()));
    }
    // No data directory means no sources to be newer than the image.
    if !data_dir.try_exists()? {
        debug!("{} does not exist, nothing to compare", data_dir.display());
        return Ok(decide(false, image_mtime, std::iter::empty()));
    }

    // The walk is lazy, so `decide` stops reading at the first newer file.
    let mut walk_error = None;
    let sources = WalkDir::new(data_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                walk_error.get_or_insert(e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let mtime = entry.metadata().ok()?.modified().ok()?;
            Some((entry.into_path(), mtime))
        });
    let decision = decide(false, image_mtime, sources);

    if let Some(err) = walk_error
        && decision == ImageBuildDecision::RebuildNotRequired
    {
        return Err(err.into());
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn force_wins_over_everything() {
        assert_eq!(decide(true, None, []), ImageBuildDecision::ForceRebuild);
        assert_eq!(
            decide(true, Some(at(10)), [(PathBuf::from("a"), at(1))]),
            ImageBuildDecision::ForceRebuild
        );
    }

    #[test]
    fn missing_image_needs_a_build() {
        assert_eq!(
            decide(false, None, []),
            ImageBuildDecision::RebuildRequired(RebuildReason::Missing)
        );
    }

    #[test]
    fn newer_source_needs_a_build() {
        let decision = decide(
            false,
            Some(at(100)),
            [(PathBuf::from("old.html"), at(50)), (PathBuf::from("new.js"), at(101))],
        );
        assert_eq!(
            decision,
            ImageBuildDecision::RebuildRequired(RebuildReason::SourceNewer("new.js".into()))
        );
        assert!(decision.should_build());
    }

    #[test]
    fn equal_timestamps_are_not_stale() {
        let decision = decide(false, Some(at(100)), [(PathBuf::from("same.css"), at(100))]);
        assert_eq!(decision, ImageBuildDecision::RebuildNotRequired);
        assert!(!decision.should_build());
    }

    #[test]
    fn stops_at_the_first_newer_file() {
        let mut seen = 0;
        let sources = (0..10u64).map(|i| {
            seen += 1;
            (PathBuf::from(format!("f{i}")), at(if i == 2 { 200 } else { 1 }))
        });
        let decision = decide(false, Some(at(100)), sources);
        assert!(decision.should_build());
        assert_eq!(seen, 3);
    }
}
