pub mod config;
pub mod gallery;
pub mod media;
pub mod router;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-exports
pub use config::{
    MediaDescriptor, MediaInput, MediaItem, MediaOptions, MediaRecord, Preload, ResolvedMedia,
    SourceSpec, Track, UriInput, VimeoEmbedOptions, YouTubeEmbedOptions,
};
pub use gallery::{Direction, Gallery, GalleryChrome, GallerySlide};
pub use media::{
    EmbedFrame, EventHub, ExternalProvider, ExternalVideo, Key, LoadPoll, LoadSample, LocalVideo,
    MediaEvent, Picture, Playable, PlaybackState, ReadyState, Subscription, VideoChrome,
    VideoElement,
};
pub use router::MessageRouter;

/// Technology rendering a media item. Serialized names match the provider
/// strings configuration records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "video")]
    LocalVideo,
    Picture,
    YouTube,
    Vimeo,
}

/// Errors surfaced by descriptor resolution and media construction.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unrecognized media source: {0}")]
    UnrecognizedSource(String),
    #[error("empty media input")]
    EmptyInput,
    #[error("descriptor carries no sources")]
    NoSources,
    #[error("source index {0} is out of range")]
    SourceIndex(usize),
    #[error("no {provider:?} video id found in {uri:?}")]
    RemoteId { provider: ProviderKind, uri: String },
}

/// Map a URI to its provider from extension and host heuristics.
///
/// Pure and case-insensitive; `None` means the input is unrecognized and
/// construction must fail.
pub fn detect_provider(uri: &str) -> Option<ProviderKind> {
    const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".webm", ".ogv"];
    const PICTURE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".svg"];

    let lower = uri.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Some(ProviderKind::LocalVideo);
    }
    if PICTURE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Some(ProviderKind::Picture);
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let host = lower.split('/').nth(2).unwrap_or("");
        if host.contains("vimeo") {
            return Some(ProviderKind::Vimeo);
        }
        if host.contains("youtube") || host.contains("youtu.be") {
            return Some(ProviderKind::YouTube);
        }
    }
    None
}

/// A constructed media object of any provider.
///
/// The closed set keeps provider dispatch exhaustive; adding a provider is
/// a compile-time-checked change everywhere this is matched.
#[derive(Clone)]
pub enum Media {
    Video(LocalVideo),
    External(ExternalVideo),
    Picture(Picture),
    Gallery(Gallery),
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Media::Video(_) => "Video",
            Media::External(_) => "External",
            Media::Picture(_) => "Picture",
            Media::Gallery(_) => "Gallery",
        };
        f.debug_tuple(variant).finish()
    }
}

impl Media {
    pub fn as_playable(&self) -> &dyn Playable {
        match self {
            Media::Video(video) => video,
            Media::External(video) => video,
            Media::Picture(picture) => picture,
            Media::Gallery(gallery) => gallery,
        }
    }
}

impl Playable for Media {
    fn play(&self) {
        self.as_playable().play()
    }

    fn pause(&self) {
        self.as_playable().pause()
    }

    fn state(&self) -> PlaybackState {
        self.as_playable().state()
    }

    fn events(&self) -> &EventHub {
        self.as_playable().events()
    }
}

impl From<LocalVideo> for Media {
    fn from(video: LocalVideo) -> Self {
        Media::Video(video)
    }
}

impl From<ExternalVideo> for Media {
    fn from(video: ExternalVideo) -> Self {
        Media::External(video)
    }
}

impl From<Picture> for Media {
    fn from(picture: Picture) -> Self {
        Media::Picture(picture)
    }
}

impl From<Gallery> for Media {
    fn from(gallery: Gallery) -> Self {
        Media::Gallery(gallery)
    }
}

/// Collaborator factory the host supplies to [`create_media`].
///
/// The library asks it for the rendering resources and chrome hooks each
/// constructed media object wraps.
pub trait MediaHost {
    /// The native element a local video will drive.
    fn video_element(&mut self, descriptor: &MediaDescriptor) -> Box<dyn VideoElement>;

    /// Chrome hooks for a local video; `Box::new(())` for none.
    fn video_chrome(&mut self, descriptor: &MediaDescriptor) -> Box<dyn VideoChrome>;

    /// Outbound message sink for an embedded frame the host creates from
    /// `embed_url`, identified by `element_id`.
    fn embed_frame(
        &mut self,
        descriptor: &MediaDescriptor,
        element_id: &str,
        embed_url: &str,
    ) -> Box<dyn EmbedFrame>;

    /// Chrome hooks for a gallery; `Box::new(())` for none.
    fn gallery_chrome(&mut self) -> Box<dyn GalleryChrome>;
}

/// Build a media object (or a gallery of them) from caller input.
///
/// The single public entry point of the library: input is resolved, every
/// item is classified, and the matching concrete player is constructed
/// around the collaborators the host provides.
pub fn create_media(
    input: MediaInput,
    host: &mut dyn MediaHost,
    router: &Arc<MessageRouter>,
) -> Result<Media, MediaError> {
    match config::resolve(input)? {
        ResolvedMedia::Single(descriptor) => build_single(descriptor, host, router),
        ResolvedMedia::Gallery(descriptors) => {
            let slides = descriptors
                .into_iter()
                .map(|descriptor| {
                    let name = descriptor.name.clone();
                    build_single(descriptor, host, router)
                        .map(|media| GallerySlide { media, name })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Gallery::new(slides, host.gallery_chrome()).map(Media::Gallery)
        }
    }
}

fn build_single(
    descriptor: MediaDescriptor,
    host: &mut dyn MediaHost,
    router: &Arc<MessageRouter>,
) -> Result<Media, MediaError> {
    match descriptor.provider {
        ProviderKind::LocalVideo => {
            let element = host.video_element(&descriptor);
            let chrome = host.video_chrome(&descriptor);
            LocalVideo::new(descriptor, element, chrome).map(Media::Video)
        }
        ProviderKind::Picture => Picture::new(&descriptor).map(Media::Picture),
        ProviderKind::YouTube => {
            build_external(ExternalProvider::YouTube, descriptor, host, router)
        }
        ProviderKind::Vimeo => build_external(ExternalProvider::Vimeo, descriptor, host, router),
    }
}

fn build_external(
    provider: ExternalProvider,
    descriptor: MediaDescriptor,
    host: &mut dyn MediaHost,
    router: &Arc<MessageRouter>,
) -> Result<Media, MediaError> {
    let uri = descriptor.primary_uri().to_string();
    let remote_id =
        media::extract_remote_id(provider, &uri).ok_or_else(|| MediaError::RemoteId {
            provider: descriptor.provider,
            uri: uri.clone(),
        })?;
    let element_id = media::element_id(provider, &remote_id);
    let embed_url = media::embed_url(provider, &remote_id, &element_id, &descriptor.options);
    let frame = host.embed_frame(&descriptor, &element_id, &embed_url);
    Ok(Media::External(ExternalVideo::new(
        provider,
        &remote_id,
        &descriptor.options,
        frame,
        router.clone(),
    )))
}
