//! Gathers finished artifacts into one folder per format.
//!
//! `<root>/<platform>/<series>/<chapter>/<artifact>` becomes
//! `<root>/<ext>/<series>/<artifact>`.

use crate::logging::LogSink;
use crate::packager::ArtifactFormat;
use std::io;
use std::path::{Path, PathBuf};

const TAG: &str = "Collect";

/// Moves every artifact under `root` into `<root>/<ext>/<series>/`.
///
/// With `format` set only that format is moved. Returns the number of
/// artifacts moved.
pub fn move_artifacts(
    root: &Path,
    format: Option<ArtifactFormat>,
    log: &dyn LogSink,
) -> io::Result<usize> {
    let formats: Vec<ArtifactFormat> = match format {
        Some(format) => vec![format],
        None => ArtifactFormat::ALL.to_vec(),
    };
    let destinations: Vec<PathBuf> = ArtifactFormat::ALL
        .iter()
        .map(|f| root.join(f.extension()))
        .collect();

    let mut artifacts = Vec::new();
    find_artifacts(root, &formats, &destinations, &mut artifacts)?;
    artifacts.sort();

    let mut moved = 0;
    for artifact in &artifacts {
        let Some(format) = format_of(artifact) else {
            continue;
        };
        let series = artifact
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(file_name) = artifact.file_name() else {
            continue;
        };

        let target_dir = root.join(format.extension()).join(&series);
        std::fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(file_name);

        if let Err(e) = std::fs::rename(artifact, &target) {
            log.warn(
                TAG,
                &format!("Could not move {}: {}", artifact.display(), e),
            );
            continue;
        }

        log.debug(
            TAG,
            &format!("{} -> {}", artifact.display(), target.display()),
        );
        moved += 1;
    }

    log.info(TAG, &format!("Moved {} artifacts", moved));
    Ok(moved)
}

fn format_of(path: &Path) -> Option<ArtifactFormat> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    ArtifactFormat::ALL
        .into_iter()
        .find(|f| f.extension() == ext)
}

fn find_artifacts(
    dir: &Path,
    formats: &[ArtifactFormat],
    skip: &[PathBuf],
    found: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if !skip.contains(&path) {
                find_artifacts(&path, formats, skip, found)?;
            }
        } else if format_of(&path).is_some_and(|f| formats.contains(&f)) {
            found.push(path);
        }
    }
    Ok(())
}
