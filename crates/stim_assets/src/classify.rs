//! Media-kind classification.
//!
//! Resources are routed to a loader by file extension. The kind set is
//! closed so every loader route is checkable at compile time.

/// The media kind of a named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Tabular data (condition files); fetched as raw bytes by the bulk
    /// loader, parsing is the consumer's business.
    Tabular,
    /// Audio; loaded item by item, the audio subsystem does not batch.
    Audio,
    /// Everything else (images, video, text); bulk loader.
    Generic,
}

const TABULAR_EXTENSIONS: &[&str] = &["csv", "odp", "xls", "xlsx"];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "mpeg", "opus", "ogg", "oga", "wav", "aac", "caf", "m4a", "weba", "dolby", "flac",
];

/// Classify a resource by the extension of its name.
///
/// Names without an extension are [`MediaKind::Generic`]. Matching is
/// case-insensitive.
#[must_use]
pub fn classify(name: &str) -> MediaKind {
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return MediaKind::Generic,
    };
    if TABULAR_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Tabular
    } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Generic
    }
}

impl MediaKind {
    /// Whether this kind is fetched through the bulk manifest loader.
    #[must_use]
    pub fn is_bulk(self) -> bool {
        !matches!(self, Self::Audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabular_extensions() {
        for name in ["conditions.csv", "data.xlsx", "x.xls", "slides.odp"] {
            assert_eq!(classify(name), MediaKind::Tabular, "{name}");
        }
    }

    #[test]
    fn test_audio_extensions() {
        for name in ["beep.mp3", "noise.wav", "voice.ogg", "chord.flac"] {
            assert_eq!(classify(name), MediaKind::Audio, "{name}");
        }
    }

    #[test]
    fn test_generic_fallback() {
        for name in ["face.png", "movie.mp4", "readme", "notes.txt"] {
            assert_eq!(classify(name), MediaKind::Generic, "{name}");
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("BEEP.MP3"), MediaKind::Audio);
        assert_eq!(classify("DATA.XLSX"), MediaKind::Tabular);
    }

    #[test]
    fn test_bulk_routing() {
        assert!(MediaKind::Tabular.is_bulk());
        assert!(MediaKind::Generic.is_bulk());
        assert!(!MediaKind::Audio.is_bulk());
    }
}
