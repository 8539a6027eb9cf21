//! Video source detection and thumbnails.

use std::sync::LazyLock;

use lms_common::VideoSource;
use regex::Regex;

static YOUTUBE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([^&?/]+)",
    )
    .unwrap()
});

static YOUTUBE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Placeholder shown for Google Drive videos.
pub const GOOGLE_DRIVE_THUMBNAIL: &str = "/thumbnails/google-drive-placeholder.png";

/// Where a video URL is hosted.
pub fn detect_source(url: &str) -> VideoSource {
    if url.contains("youtube.com") || url.contains("youtu.be") {
        VideoSource::Youtube
    } else if url.contains("drive.google.com") {
        VideoSource::GoogleDrive
    } else {
        VideoSource::DirectUpload
    }
}

/// YouTube video id from a watch/short/embed URL or a bare id.
pub fn youtube_id(url: &str) -> Option<&str> {
    if let Some(caps) = YOUTUBE_URL_REGEX.captures(url) {
        return caps.get(1).map(|m| m.as_str());
    }
    YOUTUBE_ID_REGEX.is_match(url).then_some(url)
}

/// Thumbnail URL for a video, if one can be derived.
pub fn thumbnail(url: &str, source: VideoSource) -> Option<String> {
    match source {
        VideoSource::Youtube => {
            youtube_id(url).map(|id| format!("https://img.youtube.com/vi/{id}/hqdefault.jpg"))
        }
        VideoSource::GoogleDrive => Some(GOOGLE_DRIVE_THUMBNAIL.to_string()),
        VideoSource::DirectUpload => None,
    }
}

/// Source and thumbnail for a lesson's video URL.
pub fn derive(url: &str) -> (VideoSource, Option<String>) {
    let source = detect_source(url);
    (source, thumbnail(url, source))
}
