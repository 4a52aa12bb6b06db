use serde::{Deserialize, Serialize};

/// Quality choices offered in the dropdown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QualityPreset {
    /// Up to 2160p video
    Uhd4k,
    /// Up to 1080p video (the fallback for unknown labels)
    #[default]
    P1080,
    /// Up to 720p video
    P720,
    /// Up to 480p video
    P480,
    /// Best audio track, extracted to a single codec
    AudioOnly,
}

/// What yt-dlp does with the fetched streams once they are on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostProcessing {
    /// Merge/remux into a single container
    Remux { container: &'static str },
    /// Transcode to a single audio codec at a fixed bitrate
    ExtractAudio { codec: &'static str, bitrate: &'static str },
}

impl QualityPreset {
    /// All presets in dropdown order
    pub const ALL: [QualityPreset; 5] = [
        QualityPreset::Uhd4k,
        QualityPreset::P1080,
        QualityPreset::P720,
        QualityPreset::P480,
        QualityPreset::AudioOnly,
    ];

    pub fn label(self) -> &'static str {
        match self {
            QualityPreset::Uhd4k => "4K",
            QualityPreset::P1080 => "1080p",
            QualityPreset::P720 => "720p",
            QualityPreset::P480 => "480p",
            QualityPreset::AudioOnly => "Audio Only",
        }
    }

    /// Parses a display label. Anything unrecognised maps to the default (1080p).
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
            .unwrap_or_default()
    }

    /// yt-dlp `-f` expression. Video presets avoid webm so the remux to mp4 stays lossless.
    pub fn format_expression(self) -> &'static str {
        match self {
            QualityPreset::Uhd4k => {
                "bestvideo[height<=2160][ext!=webm]+bestaudio[ext!=webm]/best[height<=2160][ext!=webm]"
            }
            QualityPreset::P1080 => {
                "bestvideo[height<=1080][ext!=webm]+bestaudio[ext!=webm]/best[height<=1080][ext!=webm]"
            }
            QualityPreset::P720 => {
                "bestvideo[height<=720][ext!=webm]+bestaudio[ext!=webm]/best[height<=720][ext!=webm]"
            }
            QualityPreset::P480 => {
                "bestvideo[height<=480][ext!=webm]+bestaudio[ext!=webm]/best[height<=480][ext!=webm]"
            }
            QualityPreset::AudioOnly => "bestaudio[ext!=webm]/best[ext!=webm]",
        }
    }

    pub fn is_audio_only(self) -> bool {
        matches!(self, QualityPreset::AudioOnly)
    }

    /// Final container or codec extension
    pub fn container(self) -> &'static str {
        match self.post_processing() {
            PostProcessing::Remux { container } => container,
            PostProcessing::ExtractAudio { codec, .. } => codec,
        }
    }

    pub fn post_processing(self) -> PostProcessing {
        if self.is_audio_only() {
            PostProcessing::ExtractAudio { codec: "mp3", bitrate: "192K" }
        } else {
            PostProcessing::Remux { container: "mp4" }
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for QualityPreset {
    fn from(label: String) -> Self {
        QualityPreset::from_label(&label)
    }
}

impl From<QualityPreset> for String {
    fn from(preset: QualityPreset) -> Self {
        preset.label().to_string()
    }
}

/// Window colour scheme stored in the settings file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the platform
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::System, Theme::Light, Theme::Dark];

    pub fn label(self) -> &'static str {
        match self {
            Theme::System => "System",
            Theme::Light => "Light",
            Theme::Dark => "Dark",
        }
    }
}

/// Stage reported by yt-dlp for the current file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Bytes are still arriving
    Downloading,
    /// Transfer done; post-processing may still be running
    Finished,
}

/// One progress report for the in-flight download
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    pub phase: ProgressPhase,
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Exact or estimated size, if the site reports one
    pub total_bytes: Option<u64>,
    /// Transfer rate in bytes per second
    pub speed_bytes_per_sec: Option<f64>,
    /// Seconds remaining
    pub eta_seconds: Option<u64>,
}
