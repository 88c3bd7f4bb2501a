use std::{cmp::Ordering, path::Path};

use walkdir::WalkDir;

use crate::{
    error::{Result, VideoTitlerError},
    record::ItemRecord,
};

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub frame_index: u32,
    pub include_subdirs: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            frame_index: 1,
            include_subdirs: false,
        }
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}

/// Lists the videos under `dir` in natural file-name order and numbers them from 1.
pub fn scan_directory(dir: &Path, options: &ScanOptions) -> Result<Vec<ItemRecord>> {
    let root = dir
        .canonicalize()
        .map_err(|e| directory_error(dir, e.to_string()))?;
    if !root.is_dir() {
        return Err(directory_error(dir, "not a directory".into()));
    }

    // symlinks are not followed, so a link back up the tree cannot list a
    // video twice
    let max_depth = if options.include_subdirs { usize::MAX } else { 1 };
    let mut videos = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_file() && is_video_file(entry.path()) {
            videos.push(entry.into_path());
        }
    }

    videos.sort_by(|a, b| compare_paths(a, b));
    log::info!("found {} videos in {}", videos.len(), root.display());

    Ok(videos
        .into_iter()
        .zip(1u32..)
        .map(|(path, sequence_index)| ItemRecord::new(path, sequence_index, options.frame_index))
        .collect())
}

fn directory_error(path: &Path, reason: String) -> VideoTitlerError {
    VideoTitlerError::DirectoryError {
        path: path.to_path_buf(),
        reason,
    }
}

fn compare_paths(a: &Path, b: &Path) -> Ordering {
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    natural_cmp(&name(a), &name(b)).then_with(|| a.cmp(b))
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(String),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(chunk(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(digit) = in_digits {
        out.push(chunk(&s[start..], digit));
    }
    out
}

fn chunk(part: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Digits(part)
    } else {
        Chunk::Text(part.to_lowercase())
    }
}

fn cmp_chunk(a: &Chunk<'_>, b: &Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Digits(x), Chunk::Digits(y)) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
    }
}

/// Compares names with digit runs ordered by value and text case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = chunks(a);
    let b = chunks(b);
    for (x, y) in a.iter().zip(&b) {
        match cmp_chunk(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_natural_order() {
        let mut names = vec!["clip10.mp4", "Clip2.mp4", "clip1.mp4", "a.mp4", "10.mp4", "9.mp4"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["9.mp4", "10.mp4", "a.mp4", "clip1.mp4", "Clip2.mp4", "clip10.mp4"]
        );
    }

    #[test]
    fn test_leading_zeros_compare_by_value() {
        assert_eq!(natural_cmp("ep007", "ep7"), Ordering::Equal);
        assert_eq!(natural_cmp("ep007", "ep8"), Ordering::Less);
    }

    #[test]
    fn test_video_extensions_case_insensitive() {
        assert!(is_video_file(Path::new("/x/A.MP4")));
        assert!(is_video_file(Path::new("b.webm")));
        assert!(!is_video_file(Path::new("c.txt")));
        assert!(!is_video_file(Path::new("mp4")));
    }

    #[test]
    fn test_scan_numbers_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ep10.mp4", "ep2.MOV", "ep1.mkv", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let records = scan_directory(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<_> = records.iter().map(|r| (r.sequence_index(), r.file_name())).collect();
        assert_eq!(
            names,
            vec![
                (1, "ep1.mkv".to_string()),
                (2, "ep2.MOV".to_string()),
                (3, "ep10.mp4".to_string())
            ]
        );
        assert!(records.iter().all(|r| r.source_path().is_absolute()));
    }

    #[test]
    fn test_scan_recurses_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.mp4"), b"").unwrap();
        fs::write(dir.path().join("sub").join("inner.mp4"), b"").unwrap();

        let flat = scan_directory(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(flat.len(), 1);

        let options = ScanOptions {
            include_subdirs: true,
            ..ScanOptions::default()
        };
        let deep = scan_directory(dir.path(), &options).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_lists_each_video_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.mp4"), b"").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub").join("loop")).unwrap();

        let options = ScanOptions {
            include_subdirs: true,
            ..ScanOptions::default()
        };
        let records = scan_directory(dir.path(), &options).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.file_name()).collect();
        assert_eq!(names, vec!["top.mp4".to_string()]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let err = scan_directory(Path::new("/no/such/dir/anywhere"), &ScanOptions::default())
            .unwrap_err();
        assert!(matches!(err, VideoTitlerError::DirectoryError { .. }));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        fs::write(&file, b"").unwrap();
        assert!(scan_directory(&file, &ScanOptions::default()).is_err());
    }
}
