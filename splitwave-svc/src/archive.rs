//! ZIP bundle of a session's tracks

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("No tracks to archive")]
    NoTracks,

    #[error("IO error while archiving: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Build an in-memory deflate ZIP of the given `.wav` track files
///
/// Entries are named by base name only; when two paths share a base name
/// the later one wins. Anything that is not a `.wav` is ignored, and an
/// empty selection is [`ArchiveError::NoTracks`].
pub fn build_track_archive(tracks: &[PathBuf]) -> Result<Vec<u8>, ArchiveError> {
    let files = select_wav_files(tracks);
    if files.is_empty() {
        return Err(ArchiveError::NoTracks);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, path) in &files {
        let bytes = std::fs::read(path)?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes)?;
    }

    let cursor = zip.finish()?;
    tracing::debug!(entries = files.len(), "Track archive built");
    Ok(cursor.into_inner())
}

fn select_wav_files(tracks: &[PathBuf]) -> BTreeMap<String, &Path> {
    let mut files = BTreeMap::new();

    for path in tracks {
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.insert(name.to_string(), path.as_path());
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_has_no_tracks() {
        assert!(matches!(build_track_archive(&[]), Err(ArchiveError::NoTracks)));
    }

    #[test]
    fn test_only_wav_files_are_selected() {
        let tracks = vec![
            PathBuf::from("/t/vocals.wav"),
            PathBuf::from("/t/notes.txt"),
            PathBuf::from("/t/.drums.wav.partial"),
            PathBuf::from("/t/BASS.WAV"),
        ];
        let files = select_wav_files(&tracks);
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["BASS.WAV", "vocals.wav"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = build_track_archive(&[dir.path().join("gone.wav")]);
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }
}
