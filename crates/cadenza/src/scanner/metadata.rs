//! Phase 2: Metadata extraction using lofty.

use cadenza_core::ExtractedMetadata;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::fs;
use std::path::Path;

/// Reads tags and audio properties from one file.
///
/// Implementations must not panic on unreadable input; they report the
/// failure through [`ExtractedMetadata::failed`] instead.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> ExtractedMetadata;
}

/// Extractor backed by lofty
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyExtractor;

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> ExtractedMetadata {
        let filepath = path.to_string_lossy().into_owned();

        let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
            Ok(file) => file,
            Err(e) => {
                return ExtractedMetadata::failed(filepath, format!("Failed to read file: {}", e));
            }
        };

        let mut metadata = ExtractedMetadata {
            path: filepath,
            file_size: fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0),
            ..Default::default()
        };

        let properties = tagged_file.properties();
        metadata.duration = Some(properties.duration().as_secs_f64());
        metadata.bitrate = properties.audio_bitrate();
        metadata.sample_rate = properties.sample_rate();
        metadata.channels = properties.channels();

        // Get tag (primary or first available)
        if let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        {
            metadata.title = tag.title().map(|s| s.to_string());
            metadata.artist = tag.artist().map(|s| s.to_string());
            metadata.album = tag.album().map(|s| s.to_string());
            metadata.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string());
            metadata.track_number = tag.track();
            metadata.disc_number = tag.disk();
            metadata.year = tag.year().and_then(|y| i32::try_from(y).ok());
            metadata.genres = tag.genre().map(|g| split_genres(&g)).unwrap_or_default();
            metadata.embedded_art = tag.pictures().first().map(|p| p.data().to_vec());
            metadata.embedded_lyrics = tag
                .get_string(&ItemKey::Lyrics)
                .filter(|l| !l.trim().is_empty())
                .map(|s| s.to_string());
        }

        if metadata.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
            metadata.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string());
        }

        metadata
    }
}

/// Split a multi-valued genre tag (`Rock; Pop`, `Rock/Pop`, NUL-separated ID3v2.4)
pub fn split_genres(raw: &str) -> Vec<String> {
    let mut genres: Vec<String> = Vec::new();
    for genre in raw.split([';', '/', '\0']).map(str::trim) {
        if !genre.is_empty() && !genres.iter().any(|g| g.eq_ignore_ascii_case(genre)) {
            genres.push(genre.to_string());
        }
    }
    genres
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_split_genres() {
        assert_eq!(split_genres("Rock; Pop"), vec!["Rock", "Pop"]);
        assert_eq!(split_genres("Rock/Pop/rock"), vec!["Rock", "Pop"]);
        assert_eq!(split_genres("Jazz\0Blues"), vec!["Jazz", "Blues"]);
        assert!(split_genres(" ; ").is_empty());
    }

    #[test]
    fn test_extract_garbage_file_reports_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"definitely not audio").unwrap();

        let metadata = LoftyExtractor.extract(&path);

        assert!(metadata.extraction_failed);
        assert!(metadata.error_message.is_some());
        assert_eq!(metadata.path, path.to_string_lossy());
    }

    #[test]
    fn test_extract_missing_file_reports_failure() {
        let dir = tempdir().unwrap();
        let metadata = LoftyExtractor.extract(&dir.path().join("missing.flac"));
        assert!(metadata.extraction_failed);
    }
}
