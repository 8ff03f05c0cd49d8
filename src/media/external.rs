use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::MediaOptions;
use crate::media::{EventHub, Key, MediaEvent, Playable, PlaybackState};
use crate::router::{InboundBody, MessageRouter, MessageTarget};
use crate::ProviderKind;

/// The two embedded third-party players this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalProvider {
    YouTube,
    Vimeo,
}

impl ExternalProvider {
    pub fn from_kind(kind: ProviderKind) -> Option<Self> {
        match kind {
            ProviderKind::YouTube => Some(Self::YouTube),
            ProviderKind::Vimeo => Some(Self::Vimeo),
            ProviderKind::LocalVideo | ProviderKind::Picture => None,
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Vimeo => "vimeo",
        }
    }

    /// Event name the provider uses to announce readiness.
    fn ready_event(self) -> &'static str {
        match self {
            Self::YouTube => "onReady",
            Self::Vimeo => "ready",
        }
    }
}

/// Pull the remote video id out of a URI, or recognize a bare id.
pub fn extract_remote_id(provider: ExternalProvider, uri: &str) -> Option<String> {
    match provider {
        ExternalProvider::YouTube => extract_youtube_id(uri),
        ExternalProvider::Vimeo => extract_vimeo_id(uri),
    }
}

fn id_after<'a>(uri: &'a str, marker: &str) -> Option<&'a str> {
    let start = uri.find(marker)? + marker.len();
    let rest = &uri[start..];
    let end = rest.find(['&', '#', '?', '/']).unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

fn extract_youtube_id(uri: &str) -> Option<String> {
    for marker in ["youtube.com/watch?v=", "youtu.be/", "youtube.com/embed/"] {
        if let Some(id) = id_after(uri, marker) {
            return Some(id.to_string());
        }
    }
    // Bare video ids are 11 URL-safe characters.
    let is_bare_id = uri.len() == 11
        && uri
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    is_bare_id.then(|| uri.to_string())
}

fn extract_vimeo_id(uri: &str) -> Option<String> {
    for marker in ["vimeo.com/video/", "vimeo.com/"] {
        if let Some(id) = id_after(uri, marker) {
            return id
                .chars()
                .all(|c| c.is_ascii_digit())
                .then(|| id.to_string());
        }
    }
    (!uri.is_empty() && uri.chars().all(|c| c.is_ascii_digit())).then(|| uri.to_string())
}

/// Globally unique identifier for one embedded frame; doubles as the
/// routing key inbound messages carry.
pub fn element_id(provider: ExternalProvider, remote_id: &str) -> String {
    format!("{}{}", provider.id_prefix(), remote_id)
}

/// Build the provider's embed URL, carrying the option set and the element
/// id so inbound messages can be routed back.
pub fn embed_url(
    provider: ExternalProvider,
    remote_id: &str,
    element_id: &str,
    options: &MediaOptions,
) -> String {
    match provider {
        ExternalProvider::YouTube => {
            let yt = &options.youtube;
            format!(
                "https://youtube.com/embed/{remote_id}?enablejsapi={}&playerapiid={element_id}\
                 &rel={}&showinfo={}&color={}&iv_load_policy={}&disablekb={}&cc_load_policy={}",
                yt.api, yt.rel, yt.showinfo, yt.color, yt.iv_load_policy, yt.disablekb,
                yt.cc_load_policy
            )
        }
        ExternalProvider::Vimeo => {
            let vm = &options.vimeo;
            format!(
                "https://player.vimeo.com/video/{remote_id}?api={}&player_id={element_id}\
                 &title={}&portrait={}&color={}&byline={}&badge={}",
                vm.api, vm.title, vm.portrait, vm.color, vm.byline, vm.badge
            )
        }
    }
}

/// Outbound sink for the embedded frame's content window.
///
/// Implementations must not call back into the library from
/// `post_message`.
pub trait EmbedFrame: Send {
    /// Post a serialized message, targeted at `target_origin` (`*` only
    /// before the provider's origin was pinned).
    fn post_message(&mut self, payload: &str, target_origin: &str);
}

#[derive(Serialize)]
struct YouTubePayload<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    func: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a [&'a str]>,
}

#[derive(Serialize)]
struct VimeoPayload<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
}

struct ExternalState {
    provider: ExternalProvider,
    element_id: String,
    embed_url: String,
    playback: PlaybackState,
    frame: Box<dyn EmbedFrame>,
}

struct ExternalShared {
    state: Mutex<ExternalState>,
    events: EventHub,
}

/// A player wrapping an embedded third-party frame, normalizing the two
/// provider messaging APIs onto the common [`Playable`] surface.
///
/// Inbound messages reach it through the [`MessageRouter`]; the host only
/// has to forward the frame's load event to
/// [`frame_loaded`](ExternalVideo::frame_loaded).
#[derive(Clone)]
pub struct ExternalVideo {
    shared: Arc<ExternalShared>,
    router: Arc<MessageRouter>,
}

impl ExternalVideo {
    pub fn new(
        provider: ExternalProvider,
        remote_id: &str,
        options: &MediaOptions,
        frame: Box<dyn EmbedFrame>,
        router: Arc<MessageRouter>,
    ) -> Self {
        let element_id = element_id(provider, remote_id);
        let embed_url = embed_url(provider, remote_id, &element_id, options);
        let shared = Arc::new(ExternalShared {
            state: Mutex::new(ExternalState {
                provider,
                element_id: element_id.clone(),
                embed_url,
                playback: PlaybackState::Unready,
                frame,
            }),
            events: EventHub::new(),
        });
        let weak = Arc::downgrade(&shared);
        let target: std::sync::Weak<dyn MessageTarget> = weak;
        router.register(element_id.clone(), target);
        info!("created {} player {element_id}", provider.id_prefix());
        Self { shared, router }
    }

    pub fn provider(&self) -> ExternalProvider {
        self.shared.state.lock().provider
    }

    /// The routing identifier assigned at construction.
    pub fn element_id(&self) -> String {
        self.shared.state.lock().element_id.clone()
    }

    /// URL the host should point the embedded frame at.
    pub fn embed_url(&self) -> String {
        self.shared.state.lock().embed_url.clone()
    }

    /// The embedded frame finished loading its document.
    pub fn frame_loaded(&self) {
        let mut state = self.shared.state.lock();
        match state.provider {
            // YouTube wants a listening handshake before it reports anything.
            ExternalProvider::YouTube => {
                post_locked(&mut state, &self.router, "listening", None, None);
            }
            ExternalProvider::Vimeo => {}
        }
    }

    /// Send a raw provider command through the API translator.
    pub fn post(&self, action: &str, value: Option<&str>, args: Option<&[&str]>) {
        post_locked(&mut self.shared.state.lock(), &self.router, action, value, args);
    }

    /// Handle a key the host captured for this player. Returns whether the
    /// key was consumed (the host must not let another handler see it).
    pub fn handle_key(&self, key: Key) -> bool {
        match key {
            Key::Space => {
                match self.state() {
                    PlaybackState::Playing => self.pause(),
                    PlaybackState::Paused | PlaybackState::Ended => self.play(),
                    // Nothing cached to toggle against yet.
                    PlaybackState::Unready | PlaybackState::Ready => {}
                }
                true
            }
            Key::Escape => {
                self.pause();
                self.shared.events.emit(&MediaEvent::Paused);
                true
            }
            _ => false,
        }
    }

    /// Remove this player from the router registry.
    pub fn close(&self) {
        self.router.unregister(&self.shared.state.lock().element_id);
    }
}

impl Playable for ExternalVideo {
    fn play(&self) {
        self.post("play", None, None);
    }

    fn pause(&self) {
        self.post("pause", None, None);
    }

    fn state(&self) -> PlaybackState {
        self.shared.state.lock().playback
    }

    fn events(&self) -> &EventHub {
        &self.shared.events
    }
}

impl MessageTarget for ExternalShared {
    fn receive(&self, origin: &str, body: &InboundBody, router: &MessageRouter) {
        let provider = {
            let state = self.state.lock();
            state.provider
        };
        // First verified contact narrows the outbound trust boundary from
        // the wildcard to the provider's actual origin.
        router.pin_origin(provider, origin);

        if body.event.as_deref() == Some(provider.ready_event()) {
            {
                let mut state = self.state.lock();
                if state.playback == PlaybackState::Unready {
                    state.playback = PlaybackState::Ready;
                }
                match provider {
                    ExternalProvider::YouTube => post_locked(
                        &mut state,
                        router,
                        "command",
                        Some("setPlaybackQuality"),
                        Some(&["highres"]),
                    ),
                    ExternalProvider::Vimeo => {
                        for event in ["play", "pause", "finish"] {
                            post_locked(&mut state, router, "addEventListener", Some(event), None);
                        }
                    }
                }
            }
            // Readiness is announced unconditionally; consumers treat it as
            // idempotent.
            self.events.emit(&MediaEvent::Ready);
            return;
        }

        let mapped = match provider {
            ExternalProvider::YouTube => body
                .info
                .as_ref()
                .and_then(|info| info.player_state)
                .and_then(|state| match state {
                    0 => Some(PlaybackState::Ended),
                    1 => Some(PlaybackState::Playing),
                    2 => Some(PlaybackState::Paused),
                    _ => None,
                }),
            ExternalProvider::Vimeo => body.event.as_deref().and_then(|event| match event {
                "finish" => Some(PlaybackState::Ended),
                "play" => Some(PlaybackState::Playing),
                "pause" => Some(PlaybackState::Paused),
                _ => None,
            }),
        };
        let Some(next) = mapped else {
            debug!("ignoring unmapped {} message", provider.id_prefix());
            return;
        };

        {
            let mut state = self.state.lock();
            if state.playback == next {
                // Stale repeat of the cached state; suppress downstream
                // notifications entirely.
                return;
            }
            state.playback = next;
        }
        if next == PlaybackState::Ended {
            self.events.emit(&MediaEvent::Ended);
        }
    }
}

fn post_locked(
    state: &mut ExternalState,
    router: &MessageRouter,
    action: &str,
    value: Option<&str>,
    args: Option<&[&str]>,
) {
    // Usual commands first, then the provider API translator.
    let (action, value) = match (state.provider, action) {
        (ExternalProvider::YouTube, "play") => ("command", Some("playVideo")),
        (ExternalProvider::YouTube, "pause") => ("command", Some("pauseVideo")),
        _ => (action, value),
    };
    let payload = match state.provider {
        ExternalProvider::YouTube => serde_json::to_string(&YouTubePayload {
            event: action,
            id: Some(&state.element_id),
            func: value,
            args,
        }),
        ExternalProvider::Vimeo => serde_json::to_string(&VimeoPayload {
            method: action,
            value,
        }),
    };
    match payload {
        Ok(payload) => {
            let target_origin = router.pinned_origin(state.provider);
            debug!("posting to {}: {payload}", state.element_id);
            state.frame.post_message(&payload, &target_origin);
        }
        Err(err) => warn!("failed to serialize outbound message: {err}"),
    }
}
