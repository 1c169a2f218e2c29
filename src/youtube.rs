use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_ID: Regex =
        Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*").unwrap();
    static ref YOUTUBE_URL: Regex =
        Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.?be)/.+$").unwrap();
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThumbnailQuality {
    Default,
    Medium,
    #[default]
    High,
    Standard,
    MaxRes,
}

impl ThumbnailQuality {
    fn file_name(self) -> &'static str {
        match self {
            ThumbnailQuality::Default => "default",
            ThumbnailQuality::Medium => "mqdefault",
            ThumbnailQuality::High => "hqdefault",
            ThumbnailQuality::Standard => "sddefault",
            ThumbnailQuality::MaxRes => "maxresdefault",
        }
    }
}

// Video ids are exactly 11 characters
pub fn extract_video_id(url: &str) -> Option<&str> {
    let id = VIDEO_ID.captures(url)?.get(2)?.as_str();
    (id.len() == 11).then_some(id)
}

pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

// Empty when the url carries no video id
pub fn embed_url(url: &str) -> String {
    extract_video_id(url)
        .map(|id| format!("https://www.youtube.com/embed/{}", id))
        .unwrap_or_default()
}

pub fn thumbnail_url(url: &str, quality: ThumbnailQuality) -> String {
    extract_video_id(url)
        .map(|id| format!("https://img.youtube.com/vi/{}/{}.jpg", id, quality.file_name()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_common_url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?start=10",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ#t=5",
        ] {
            assert_eq!(extract_video_id(url), Some("dQw4w9WgXcQ"), "{url}");
        }
    }

    #[test]
    fn rejects_ids_of_the_wrong_length() {
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
        assert_eq!(extract_video_id("https://example.com/page"), None);
    }

    #[test]
    fn builds_embed_and_thumbnail_urls() {
        let url = "https://youtu.be/dQw4w9WgXcQ";
        assert_eq!(embed_url(url), "https://www.youtube.com/embed/dQw4w9WgXcQ");
        assert_eq!(
            thumbnail_url(url, ThumbnailQuality::default()),
            "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
        );
        assert_eq!(thumbnail_url("not a video", ThumbnailQuality::MaxRes), "");
    }

    #[test]
    fn recognizes_youtube_hosts() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("youtu.be/dQw4w9WgXcQ"));
        assert!(!is_youtube_url("https://vimeo.com/12345"));
    }
}
