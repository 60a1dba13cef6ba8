//! HLS playlist parsing and structural validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::probe;
use crate::validator::HlsDepth;

/// Structural problems found while descending an HLS tree.
#[derive(Debug, Error)]
pub enum HlsError {
    #[error("no HLS playlist found in {0}")]
    NoPlaylist(PathBuf),

    #[error("playlist syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    #[error("referenced media playlist not found: {0}")]
    PlaylistMissing(PathBuf),

    #[error("segment file not found: {0}")]
    SegmentMissing(PathBuf),

    #[error("segment unreadable: {path}: {message}")]
    SegmentUnreadable { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed structure of an HLS output tree.
#[derive(Debug, Clone, Default)]
pub struct HlsInfo {
    /// The entry manifest (master when present, otherwise a media playlist)
    pub entry_playlist: PathBuf,
    /// Whether the entry manifest is a master playlist
    pub is_master: bool,
    pub playlists: Vec<PlaylistInfo>,
    pub total_segments: usize,
    pub target_duration: f64,
}

/// One media playlist (variant) of an HLS tree.
#[derive(Debug, Clone, Default)]
pub struct PlaylistInfo {
    pub path: PathBuf,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
    pub codecs: Option<String>,
    pub segments: Vec<SegmentInfo>,
}

/// One segment referenced from a media playlist.
#[derive(Debug, Clone, Default)]
pub struct SegmentInfo {
    pub path: PathBuf,
    /// Declared (or at Full depth, probed) duration in seconds
    pub duration: f64,
    pub size: u64,
}

/// Locate the entry manifest, preferring `master.m3u8` over
/// `playlist.m3u8` over any other `.m3u8`.
pub async fn find_entry_playlist(dir: &Path) -> Result<PathBuf, HlsError> {
    for preferred in ["master.m3u8", "playlist.m3u8"] {
        let candidate = dir.join(preferred);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_str().map(|n| n.ends_with(".m3u8")).unwrap_or(false) {
            return Ok(entry.path());
        }
    }

    Err(HlsError::NoPlaylist(dir.to_path_buf()))
}

/// Parse and validate the HLS tree at `path` (a directory, or a playlist
/// file directly) to the requested depth.
///
/// Recursion is inherently bounded at master → media → segments: segment
/// lines inside media playlists are never descended into, so a degenerate
/// playlist referencing another playlist cannot loop.
pub async fn inspect(path: &Path, depth: HlsDepth) -> Result<HlsInfo, HlsError> {
    let (base_dir, entry) = if path.is_dir() {
        (path.to_path_buf(), find_entry_playlist(path).await?)
    } else {
        (
            path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            path.to_path_buf(),
        )
    };

    let content = tokio::fs::read_to_string(&entry).await?;
    check_header(&entry, &content)?;

    if is_master_playlist(&content) {
        inspect_master(&base_dir, &entry, &content, depth).await
    } else {
        let playlist = inspect_media_playlist(&entry, &content, depth).await?;
        Ok(HlsInfo {
            entry_playlist: entry,
            is_master: false,
            total_segments: playlist.info.segments.len(),
            target_duration: playlist.target_duration,
            playlists: vec![playlist.info],
        })
    }
}

fn check_header(path: &Path, content: &str) -> Result<(), HlsError> {
    if !content.trim_start().starts_with("#EXTM3U") {
        return Err(HlsError::Syntax {
            path: path.to_path_buf(),
            message: "playlist must start with #EXTM3U".to_string(),
        });
    }
    Ok(())
}

/// Master playlists carry `#EXT-X-STREAM-INF`; media playlists carry
/// `#EXTINF`.
fn is_master_playlist(content: &str) -> bool {
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("#EXT-X-STREAM-INF") {
            return true;
        }
        if line.starts_with("#EXTINF") {
            return false;
        }
    }
    false
}

async fn inspect_master(
    base_dir: &Path,
    entry: &Path,
    content: &str,
    depth: HlsDepth,
) -> Result<HlsInfo, HlsError> {
    let mut info = HlsInfo {
        entry_playlist: entry.to_path_buf(),
        is_master: true,
        ..Default::default()
    };

    let mut stream_attrs: Option<HashMap<String, String>> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.starts_with("#EXT-X-STREAM-INF") {
            stream_attrs = Some(parse_attributes(line));
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(attrs) = stream_attrs.take() else {
            continue;
        };

        let media_path = base_dir.join(line);
        let mut playlist = PlaylistInfo {
            path: media_path.clone(),
            bandwidth: attrs.get("BANDWIDTH").and_then(|b| b.parse().ok()),
            resolution: attrs.get("RESOLUTION").cloned(),
            codecs: attrs.get("CODECS").cloned(),
            segments: Vec::new(),
        };

        if depth >= HlsDepth::Medium {
            if !tokio::fs::try_exists(&media_path).await.unwrap_or(false) {
                return Err(HlsError::PlaylistMissing(media_path));
            }
            let media_content = tokio::fs::read_to_string(&media_path).await?;
            check_header(&media_path, &media_content)?;
            let parsed = inspect_media_playlist(&media_path, &media_content, depth).await?;
            playlist.segments = parsed.info.segments;
            info.total_segments += playlist.segments.len();
            if parsed.target_duration > info.target_duration {
                info.target_duration = parsed.target_duration;
            }
        }

        info.playlists.push(playlist);
    }

    Ok(info)
}

struct ParsedMediaPlaylist {
    info: PlaylistInfo,
    target_duration: f64,
}

async fn inspect_media_playlist(
    playlist_path: &Path,
    content: &str,
    depth: HlsDepth,
) -> Result<ParsedMediaPlaylist, HlsError> {
    let dir = playlist_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let mut info = PlaylistInfo {
        path: playlist_path.to_path_buf(),
        ..Default::default()
    };
    let mut target_duration = 0.0f64;
    let mut current_duration = 0.0f64;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            if let Ok(duration) = rest.parse::<f64>() {
                target_duration = duration;
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let duration_str = rest.split(',').next().unwrap_or_default();
            if let Ok(duration) = duration_str.parse::<f64>() {
                current_duration = duration;
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        // A URI line: a segment. Not descended into even if it names
        // another playlist.
        let segment_path = dir.join(line);
        let mut segment = SegmentInfo {
            path: segment_path.clone(),
            duration: current_duration,
            size: 0,
        };
        current_duration = 0.0;

        if depth >= HlsDepth::Medium {
            let meta = tokio::fs::metadata(&segment_path)
                .await
                .map_err(|_| HlsError::SegmentMissing(segment_path.clone()))?;
            segment.size = meta.len();
        }

        if depth >= HlsDepth::Full {
            let probed = probe::media_info(&segment_path).await.map_err(|e| {
                HlsError::SegmentUnreadable {
                    path: segment_path.clone(),
                    message: e.to_string(),
                }
            })?;
            segment.duration = probed.duration;
        }

        info.segments.push(segment);
    }

    Ok(ParsedMediaPlaylist {
        info,
        target_duration,
    })
}

/// Parse an attribute line such as
/// `#EXT-X-STREAM-INF:BANDWIDTH=2800000,CODECS="avc1.64001f,mp4a.40.2"`.
/// Quoted values may contain commas; surrounding quotes are stripped.
fn parse_attributes(line: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    let Some((_, attr_str)) = line.split_once(':') else {
        return attributes;
    };

    let mut key = String::new();
    let mut value = String::new();
    let mut in_quotes = false;
    let mut reading_key = true;

    for ch in attr_str.chars() {
        match ch {
            '=' if !in_quotes && reading_key => {
                reading_key = false;
            }
            ',' if !in_quotes => {
                if !key.is_empty() {
                    attributes.insert(std::mem::take(&mut key), std::mem::take(&mut value));
                }
                reading_key = true;
            }
            '"' => in_quotes = !in_quotes,
            _ => {
                if reading_key {
                    key.push(ch);
                } else {
                    value.push(ch);
                }
            }
        }
    }
    if !key.is_empty() {
        attributes.insert(key, value);
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA_PLAYLIST: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:6\n\
        #EXTINF:6.000,\n\
        segment_000.ts\n\
        #EXTINF:4.500,\n\
        segment_001.ts\n\
        #EXT-X-ENDLIST\n";

    const MASTER_PLAYLIST: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS=\"avc1.64001f,mp4a.40.2\"\n\
        stream_0.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=854x480\n\
        stream_1.m3u8\n";

    fn write_tree(dir: &Path) {
        std::fs::write(dir.join("master.m3u8"), MASTER_PLAYLIST).unwrap();
        for variant in ["stream_0.m3u8", "stream_1.m3u8"] {
            std::fs::write(dir.join(variant), MEDIA_PLAYLIST).unwrap();
        }
        for segment in ["segment_000.ts", "segment_001.ts"] {
            std::fs::write(dir.join(segment), b"fake segment data").unwrap();
        }
    }

    #[test]
    fn test_parse_attributes_quoted_commas() {
        let attrs = parse_attributes(
            "#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS=\"avc1.64001f,mp4a.40.2\"",
        );
        assert_eq!(attrs.get("BANDWIDTH").unwrap(), "2800000");
        assert_eq!(attrs.get("RESOLUTION").unwrap(), "1280x720");
        assert_eq!(attrs.get("CODECS").unwrap(), "avc1.64001f,mp4a.40.2");
    }

    #[test]
    fn test_master_detection() {
        assert!(is_master_playlist(MASTER_PLAYLIST));
        assert!(!is_master_playlist(MEDIA_PLAYLIST));
        assert!(!is_master_playlist("#EXTM3U\n"));
    }

    #[tokio::test]
    async fn test_entry_playlist_preference() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("other.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(tmp.path().join("playlist.m3u8"), "#EXTM3U\n").unwrap();

        let entry = find_entry_playlist(tmp.path()).await.unwrap();
        assert_eq!(entry.file_name().unwrap(), "playlist.m3u8");

        std::fs::write(tmp.path().join("master.m3u8"), "#EXTM3U\n").unwrap();
        let entry = find_entry_playlist(tmp.path()).await.unwrap();
        assert_eq!(entry.file_name().unwrap(), "master.m3u8");
    }

    #[tokio::test]
    async fn test_inspect_full_tree_at_medium() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path());

        let info = inspect(tmp.path(), HlsDepth::Medium).await.unwrap();
        assert!(info.is_master);
        assert_eq!(info.playlists.len(), 2);
        assert_eq!(info.total_segments, 4);
        assert!((info.target_duration - 6.0).abs() < 0.001);
        assert_eq!(info.playlists[0].bandwidth, Some(2_800_000));
        assert!((info.playlists[0].segments[1].duration - 4.5).abs() < 0.001);
        assert!(info.playlists[0].segments[0].size > 0);
    }

    #[tokio::test]
    async fn test_inspect_basic_skips_media_playlists() {
        let tmp = tempfile::tempdir().unwrap();
        // Master referencing playlists that do not exist: fine at Basic.
        std::fs::write(tmp.path().join("master.m3u8"), MASTER_PLAYLIST).unwrap();

        let info = inspect(tmp.path(), HlsDepth::Basic).await.unwrap();
        assert_eq!(info.playlists.len(), 2);
        assert_eq!(info.total_segments, 0);
    }

    #[tokio::test]
    async fn test_missing_media_playlist_at_medium() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("master.m3u8"), MASTER_PLAYLIST).unwrap();

        let err = inspect(tmp.path(), HlsDepth::Medium).await.unwrap_err();
        assert!(matches!(err, HlsError::PlaylistMissing(_)));
    }

    #[tokio::test]
    async fn test_missing_segment_at_medium() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path());
        std::fs::remove_file(tmp.path().join("segment_001.ts")).unwrap();

        let err = inspect(tmp.path(), HlsDepth::Medium).await.unwrap_err();
        assert!(matches!(err, HlsError::SegmentMissing(p) if p.ends_with("segment_001.ts")));
    }

    #[tokio::test]
    async fn test_bad_header_is_syntax_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("playlist.m3u8"), "not a playlist\n").unwrap();

        let err = inspect(tmp.path(), HlsDepth::Basic).await.unwrap_err();
        assert!(matches!(err, HlsError::Syntax { .. }));
    }

    #[tokio::test]
    async fn test_self_referencing_playlist_does_not_diverge() {
        let tmp = tempfile::tempdir().unwrap();
        // A media playlist that lists itself as a "segment".
        let content = "#EXTM3U\n#EXTINF:6.0,\nplaylist.m3u8\n";
        std::fs::write(tmp.path().join("playlist.m3u8"), content).unwrap();

        let info = inspect(tmp.path(), HlsDepth::Medium).await.unwrap();
        // Treated as a segment reference, never descended into.
        assert_eq!(info.total_segments, 1);
    }

    #[tokio::test]
    async fn test_inspect_single_media_playlist_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path());

        let info = inspect(&tmp.path().join("stream_0.m3u8"), HlsDepth::Medium)
            .await
            .unwrap();
        assert!(!info.is_master);
        assert_eq!(info.total_segments, 2);
    }
}
