use serde::{Deserialize, Serialize};

use crate::{detect_provider, MediaError, ProviderKind};

/// Caller input accepted by the library: a URI, a configuration record, or
/// an ordered list of either (which becomes a gallery).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaInput {
    Uri(String),
    Record(MediaRecord),
    List(Vec<MediaItem>),
}

/// One entry of a gallery input list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaItem {
    Uri(String),
    Record(MediaRecord),
}

/// Configuration record for a single media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub uri: UriInput,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Display name, shown by gallery chrome.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: MediaOptions,
}

/// URI field of a record: one location, or a quality-variant list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UriInput {
    One(String),
    Sources(Vec<SourceSpec>),
}

/// One quality/track variant of a local video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Label shown on the quality selector (e.g. "1080p").
    pub label: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub src: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Element preload hint forwarded to the wrapped video element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preload {
    None,
    Metadata,
    Auto,
}

/// Options for a media item. Unset fields take the provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaOptions {
    pub muted: bool,
    pub preload: Preload,
    /// Construct without starting the initial load; the host triggers it
    /// later via `change_source`.
    pub noload: bool,
    pub poster: Option<String>,
    /// Index of the initially active source.
    pub default_source: usize,
    pub youtube: YouTubeEmbedOptions,
    pub vimeo: VimeoEmbedOptions,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            muted: false,
            preload: Preload::Auto,
            noload: false,
            poster: None,
            default_source: 0,
            youtube: YouTubeEmbedOptions::default(),
            vimeo: VimeoEmbedOptions::default(),
        }
    }
}

/// YouTube embed parameters, named as the embed URL expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YouTubeEmbedOptions {
    pub api: u8,
    pub rel: u8,
    pub showinfo: u8,
    pub color: String,
    pub iv_load_policy: u8,
    pub disablekb: u8,
    pub cc_load_policy: u8,
}

impl Default for YouTubeEmbedOptions {
    fn default() -> Self {
        Self {
            api: 1,
            rel: 0,
            showinfo: 0,
            color: "white".to_string(),
            iv_load_policy: 3,
            disablekb: 1,
            cc_load_policy: 0,
        }
    }
}

/// Vimeo embed parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VimeoEmbedOptions {
    pub api: u8,
    pub title: u8,
    pub portrait: u8,
    pub color: String,
    pub byline: u8,
    pub badge: u8,
}

impl Default for VimeoEmbedOptions {
    fn default() -> Self {
        Self {
            api: 1,
            title: 0,
            portrait: 0,
            color: "f0f0f0".to_string(),
            byline: 0,
            badge: 0,
        }
    }
}

/// A media item with its provider resolved; immutable from here on.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub provider: ProviderKind,
    /// Quality variants, at least one; exactly one is active at a time.
    pub sources: Vec<SourceSpec>,
    pub name: Option<String>,
    pub options: MediaOptions,
}

impl MediaDescriptor {
    /// Location of the first track of the first source.
    pub fn primary_uri(&self) -> &str {
        self.sources
            .first()
            .and_then(|source| source.tracks.first())
            .map(|track| track.src.as_str())
            .unwrap_or("")
    }
}

/// Result of normalizing caller input.
#[derive(Debug, Clone)]
pub enum ResolvedMedia {
    Single(MediaDescriptor),
    Gallery(Vec<MediaDescriptor>),
}

/// Normalize caller input into resolved descriptors.
///
/// Unrecognized sources and empty lists are rejected here, so every
/// descriptor handed to construction names a concrete provider.
pub fn resolve(input: MediaInput) -> Result<ResolvedMedia, MediaError> {
    match input {
        MediaInput::Uri(uri) => resolve_record(MediaRecord {
            uri: UriInput::One(uri),
            provider: None,
            name: None,
            options: MediaOptions::default(),
        })
        .map(ResolvedMedia::Single),
        MediaInput::Record(record) => resolve_record(record).map(ResolvedMedia::Single),
        MediaInput::List(items) => {
            if items.is_empty() {
                return Err(MediaError::EmptyInput);
            }
            let slides = items
                .into_iter()
                .map(|item| match item {
                    MediaItem::Uri(uri) => resolve_record(MediaRecord {
                        uri: UriInput::One(uri),
                        provider: None,
                        name: None,
                        options: MediaOptions::default(),
                    }),
                    MediaItem::Record(record) => resolve_record(record),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ResolvedMedia::Gallery(slides))
        }
    }
}

fn resolve_record(record: MediaRecord) -> Result<MediaDescriptor, MediaError> {
    let sources = match record.uri {
        UriInput::One(uri) => vec![SourceSpec {
            label: "default".to_string(),
            tracks: vec![Track {
                mime_type: guess_mime(&uri).to_string(),
                src: uri,
            }],
        }],
        UriInput::Sources(sources) => sources,
    };
    let primary = sources
        .first()
        .and_then(|source| source.tracks.first())
        .map(|track| track.src.clone())
        .ok_or(MediaError::NoSources)?;

    let provider = match record.provider {
        // An explicit provider is trusted without validation.
        Some(provider) => provider,
        None => detect_provider(&primary)
            .ok_or_else(|| MediaError::UnrecognizedSource(primary.clone()))?,
    };

    if record.options.default_source >= sources.len() {
        return Err(MediaError::SourceIndex(record.options.default_source));
    }

    Ok(MediaDescriptor {
        provider,
        sources,
        name: record.name,
        options: record.options,
    })
}

fn guess_mime(uri: &str) -> &'static str {
    let lower = uri.to_ascii_lowercase();
    match lower.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogv") => "video/ogg",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
