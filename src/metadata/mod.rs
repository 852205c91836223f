//! Audio file tag reading.
//!
//! Uses the lofty crate for format-independent metadata access. Only the
//! extracted fields matter to the rest of the system; the tag formats
//! themselves never leak past this module.

use std::path::Path;

use anyhow::{Context, Result, bail};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

/// Metadata extracted from one audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMeta {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub duration_seconds: u64,
}

/// Read tags from an audio file.
///
/// Artist and title are required (the song id is derived from them); a file
/// missing either is rejected so the scan can report it. A zero duration is
/// rejected for the same reason.
pub fn read(path: &Path) -> Result<SongMeta> {
    let tagged_file = Probe::open(path)
        .context("failed to open file for probing")?
        .read()
        .context("failed to read file metadata")?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let artist = tag.and_then(|t| t.artist().map(|s| s.trim().to_string()));
    let title = tag.and_then(|t| t.title().map(|s| s.trim().to_string()));

    let (Some(artist), Some(title)) = (artist, title) else {
        bail!("missing artist or title tag");
    };
    if artist.is_empty() || title.is_empty() {
        bail!("empty artist or title tag");
    }

    let album = tag.and_then(|t| t.album().map(|s| s.to_string())).filter(|s| !s.is_empty());
    let year = tag.and_then(|t| t.year()).map(|y| y as i32);

    let duration_seconds = tagged_file.properties().duration().as_secs();
    if duration_seconds == 0 {
        bail!("file reports zero duration");
    }

    Ok(SongMeta { artist, title, album, year, duration_seconds })
}

/// Check if a path has a supported audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    let ext = path.extension().and_then(|s| s.to_str()).map(|s| s.to_lowercase());
    matches!(ext.as_deref(), Some("mp3" | "flac" | "ogg" | "m4a" | "wav"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_non_audio_file_returns_error() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        writeln!(file, "This is just some text, not music.").unwrap();

        assert!(read(file.path()).is_err());
    }

    #[test]
    fn test_read_non_existent_file_returns_error() {
        assert!(read(Path::new("no_such_file.mp3")).is_err());
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("song.mp3")));
        assert!(is_audio_file(Path::new("SONG.FLAC")));
        assert!(!is_audio_file(Path::new("cover.png")));
        assert!(!is_audio_file(Path::new("notes")));
    }
}
