//! Photo discovery and capture-time extraction.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    config::ImagesConfig,
    model::{Timeline, Timestamped},
};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Files directly inside `dir` whose extension is in `extensions`, sorted by path.
pub fn list_image_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Image directory not found: {}", dir.display()));
    }

    let mut files = Vec::new();
    let walker =
        WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();
    for entry in walker {
        let entry = entry
            .with_context(|| format!("Failed to list image directory: {}", dir.display()))?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            extensions.iter().any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

/// `DateTimeOriginal` of the photo at `path`.
///
/// Anything short of a readable timestamp (no EXIF block, no tag, garbage
/// value, unreadable file) is `None`.
pub fn capture_time(path: &Path) -> Option<NaiveDateTime> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open image");
            return None;
        }
    };

    let exif = match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable EXIF data");
            return None;
        }
    };

    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    let raw = match &field.value {
        Value::Ascii(parts) => parts.first()?,
        other => {
            debug!(path = %path.display(), value = ?other, "DateTimeOriginal is not ASCII");
            return None;
        }
    };

    let parsed = std::str::from_utf8(raw).ok().and_then(parse_exif_datetime);
    if parsed.is_none() {
        debug!(path = %path.display(), "unparsable DateTimeOriginal");
    }

    parsed
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value. Trailing NULs and blanks are ignored.
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(trimmed, EXIF_DATETIME_FORMAT).ok()
}

/// Result of scanning the image directory.
#[derive(Debug, Clone)]
pub struct ImageScan {
    pub files_found: usize,
    pub timeline: Timeline<PathBuf>,
}

impl ImageScan {
    pub fn without_timestamp(&self) -> usize {
        self.files_found - self.timeline.len()
    }
}

/// List photos and order the timestamped ones into a timeline.
pub fn scan_images(config: &ImagesConfig) -> Result<ImageScan> {
    let files = list_image_files(&config.dir, &config.extensions)?;
    let files_found = files.len();

    let stamped = files
        .into_iter()
        .filter_map(|path| capture_time(&path).map(|at| Timestamped::new(at, path)))
        .collect();

    Ok(ImageScan { files_found, timeline: Timeline::from_unsorted(stamped) })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    /// Smallest JPEG that carries a `DateTimeOriginal` tag: SOI, one APP1
    /// segment with a big-endian TIFF block (IFD0 -> Exif IFD -> ASCII), EOI.
    pub(crate) fn jpeg_with_capture_time(datetime: &str) -> Vec<u8> {
        assert_eq!(datetime.len(), 19);

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
        // IFD0 @8: one entry, ExifIFDPointer -> 26
        tiff.extend_from_slice(&[0x00, 0x01]);
        tiff.extend_from_slice(&[0x87, 0x69, 0x00, 0x04]);
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 26]);
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        // Exif IFD @26: one entry, DateTimeOriginal, ASCII x20 @44
        tiff.extend_from_slice(&[0x00, 0x01]);
        tiff.extend_from_slice(&[0x90, 0x03, 0x00, 0x02]);
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 20, 0x00, 0x00, 0x00, 44]);
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        tiff.extend_from_slice(datetime.as_bytes());
        tiff.push(0);

        let seg_len = (2 + 6 + tiff.len()) as u16;
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&seg_len.to_be_bytes());
        jpeg.extend_from_slice(b"Exif\x00\x00");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn parses_exif_datetime_format() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap().and_hms_opt(12, 30, 5);
        assert_eq!(parse_exif_datetime("2023:01:15 12:30:05"), expected);
        assert_eq!(parse_exif_datetime("2023:01:15 12:30:05\0"), expected);
        assert_eq!(parse_exif_datetime("    :  :     :  :  "), None);
        assert_eq!(parse_exif_datetime("15.01.2023 12:30"), None);
    }

    #[test]
    fn lists_matching_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.JPG", "c.Jpg", "d.png", "e.jpeg", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let files = list_image_files(dir.path(), &["jpg".to_string()]).unwrap();
        let names: Vec<_> =
            files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.jpg", "b.JPG", "c.Jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_photos_are_listed_and_dated() {
        let store = tempfile::tempdir().unwrap();
        let target = store.path().join("original.jpg");
        fs::write(&target, jpeg_with_capture_time("2023:01:15 12:30:00")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("linked.jpg")).unwrap();

        let files = list_image_files(dir.path(), &["jpg".to_string()]).unwrap();
        assert_eq!(files, vec![dir.path().join("linked.jpg")]);
        assert!(capture_time(&files[0]).is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_image_files(&dir.path().join("gone"), &["jpg".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Image directory not found"));
    }

    #[test]
    fn reads_capture_time_from_exif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, jpeg_with_capture_time("2023:01:15 12:30:00")).unwrap();

        let expected = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap().and_hms_opt(12, 30, 0);
        assert_eq!(capture_time(&path), expected);
    }

    #[test]
    fn file_without_exif_has_no_capture_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.jpg");
        fs::write(&path, b"\xFF\xD8\xFF\xD9").unwrap();

        assert_eq!(capture_time(&path), None);
        assert_eq!(capture_time(&dir.path().join("missing.jpg")), None);
    }

    #[test]
    fn scan_builds_sorted_timeline_and_counts_skips() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_with_capture_time("2023:01:15 18:00:00")).unwrap();
        fs::write(dir.path().join("b.jpg"), jpeg_with_capture_time("2023:01:15 06:00:00")).unwrap();
        fs::write(dir.path().join("c.jpg"), b"not a jpeg").unwrap();

        let scan = scan_images(&ImagesConfig {
            dir: dir.path().to_path_buf(),
            extensions: vec!["jpg".into()],
        })
        .unwrap();

        assert_eq!(scan.files_found, 3);
        assert_eq!(scan.without_timestamp(), 1);
        let order: Vec<_> = scan
            .timeline
            .entries()
            .iter()
            .map(|e| e.item.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, vec!["b.jpg", "a.jpg"]);
    }
}
