use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;

use crate::media::ExternalProvider;

/// Origins embedded players are allowed to message us from. Everything else
/// is dropped before parsing.
static ALLOWED_ORIGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(www\.)?(youtube|player\.vimeo)\.com")
        .expect("origin allow-list pattern is valid")
});

/// Parsed shape of an inbound provider message; unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundBody {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub info: Option<InboundInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InboundInfo {
    #[serde(default, rename = "playerState")]
    pub player_state: Option<i64>,
}

/// Receiving end of routed messages, implemented by external players.
pub(crate) trait MessageTarget: Send + Sync {
    fn receive(&self, origin: &str, body: &InboundBody, router: &MessageRouter);
}

/// Process-wide dispatcher for inbound cross-origin messages.
///
/// All messages arrive at one boundary (the hosting page) and are fanned out
/// here by the element identifier they carry. The router owns no state
/// beyond its target registry and the per-provider pinned-origin map.
pub struct MessageRouter {
    targets: Mutex<HashMap<String, Weak<dyn MessageTarget>>>,
    origins: Mutex<HashMap<ExternalProvider, String>>,
}

static GLOBAL_ROUTER: Lazy<Arc<MessageRouter>> = Lazy::new(|| Arc::new(MessageRouter::new()));

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// The shared process-wide instance most hosts wire their message
    /// boundary to.
    pub fn global() -> Arc<MessageRouter> {
        GLOBAL_ROUTER.clone()
    }

    /// Feed one inbound message through the filter and on to its target.
    ///
    /// Untrusted origins, unparseable bodies and unresolvable targets are
    /// dropped silently; none of them are errors to the caller.
    pub fn deliver(&self, origin: &str, data: &str) {
        if !ALLOWED_ORIGIN.is_match(origin) {
            debug!("dropping message from untrusted origin {origin}");
            return;
        }
        let body: InboundBody = match serde_json::from_str(data) {
            Ok(body) => body,
            Err(err) => {
                debug!("dropping unparseable message: {err}");
                return;
            }
        };
        let Some(id) = body.id.clone().or_else(|| body.player_id.clone()) else {
            debug!("dropping message without a target id");
            return;
        };
        let target = {
            let mut targets = self.targets.lock();
            match targets.get(&id).map(Weak::upgrade) {
                Some(Some(target)) => Some(target),
                Some(None) => {
                    // The owning player is gone; clean the stale entry up.
                    targets.remove(&id);
                    None
                }
                None => None,
            }
        };
        match target {
            Some(target) => target.receive(origin, &body, self),
            None => debug!("dropping message for unknown target {id}"),
        }
    }

    /// Pin `origin` for `provider` if it is still the wildcard.
    ///
    /// First writer wins: once pinned the value never changes, so every
    /// instance of the same provider converges on the same origin.
    pub fn pin_origin(&self, provider: ExternalProvider, origin: &str) -> bool {
        let mut origins = self.origins.lock();
        if origins.contains_key(&provider) {
            return false;
        }
        origins.insert(provider, origin.to_string());
        true
    }

    /// Outbound target origin for `provider`: the pinned origin, or the
    /// wildcard before first contact.
    pub fn pinned_origin(&self, provider: ExternalProvider) -> String {
        self.origins
            .lock()
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| "*".to_string())
    }

    pub(crate) fn register(&self, id: String, target: Weak<dyn MessageTarget>) {
        self.targets.lock().insert(id, target);
    }

    /// Drop a target at teardown; messages for it are ignored afterwards.
    pub fn unregister(&self, id: &str) {
        self.targets.lock().remove(id);
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaOptions;
    use crate::media::{EmbedFrame, ExternalVideo, MediaEvent, Playable, PlaybackState};

    #[derive(Clone, Default)]
    struct RecordingFrame {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl EmbedFrame for RecordingFrame {
        fn post_message(&mut self, payload: &str, target_origin: &str) {
            self.sent
                .lock()
                .push((payload.to_string(), target_origin.to_string()));
        }
    }

    fn youtube_on(router: &Arc<MessageRouter>, id: &str) -> (ExternalVideo, RecordingFrame) {
        let frame = RecordingFrame::default();
        let video = ExternalVideo::new(
            ExternalProvider::YouTube,
            id,
            &MediaOptions::default(),
            Box::new(frame.clone()),
            router.clone(),
        );
        (video, frame)
    }

    fn vimeo_on(router: &Arc<MessageRouter>, id: &str) -> (ExternalVideo, RecordingFrame) {
        let frame = RecordingFrame::default();
        let video = ExternalVideo::new(
            ExternalProvider::Vimeo,
            id,
            &MediaOptions::default(),
            Box::new(frame.clone()),
            router.clone(),
        );
        (video, frame)
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn recorded_events(
        video: &ExternalVideo,
    ) -> (Arc<Mutex<Vec<MediaEvent>>>, crate::media::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = video
            .events()
            .subscribe(move |event| sink.lock().push(*event));
        (seen, sub)
    }

    #[test]
    fn test_untrusted_origin_is_dropped() {
        init_logging();
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");

        router.deliver(
            "https://evil.example.com",
            r#"{"event":"infoDelivery","id":"youtubeabc12345678","info":{"playerState":1}}"#,
        );

        assert_eq!(video.state(), PlaybackState::Unready);
        assert_eq!(router.pinned_origin(ExternalProvider::YouTube), "*");
    }

    #[test]
    fn test_rejected_origin_shapes() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");

        for origin in [
            "http://notyoutube.org",
            "https://youtube.org",
            "ftp://youtube.com",
            "https://m.youtube.com",
            "https://vimeo.com", // players message from player.vimeo.com
        ] {
            router.deliver(origin, r#"{"event":"onReady","id":"youtubeabc12345678"}"#);
        }

        assert_eq!(video.state(), PlaybackState::Unready);
    }

    #[test]
    fn test_unparseable_and_unaddressed_messages_are_dropped() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");

        router.deliver("https://www.youtube.com", "not json at all");
        router.deliver("https://www.youtube.com", r#"{"event":"onReady"}"#);
        router.deliver(
            "https://www.youtube.com",
            r#"{"event":"onReady","id":"youtubesomeoneelse"}"#,
        );

        assert_eq!(video.state(), PlaybackState::Unready);
    }

    #[test]
    fn test_ready_routes_and_triggers_handshake() {
        let router = Arc::new(MessageRouter::new());
        let (video, frame) = youtube_on(&router, "abc12345678");
        let (events, _sub) = recorded_events(&video);

        router.deliver(
            "https://www.youtube.com",
            r#"{"event":"onReady","id":"youtubeabc12345678"}"#,
        );

        assert_eq!(video.state(), PlaybackState::Ready);
        assert_eq!(*events.lock(), vec![MediaEvent::Ready]);
        let sent = frame.sent.lock();
        assert_eq!(
            sent[0].0,
            r#"{"event":"command","id":"youtubeabc12345678","func":"setPlaybackQuality","args":["highres"]}"#
        );
        // The handshake already goes to the origin pinned by this message.
        assert_eq!(sent[0].1, "https://www.youtube.com");
    }

    #[test]
    fn test_vimeo_ready_subscribes_to_events() {
        let router = Arc::new(MessageRouter::new());
        let (video, frame) = vimeo_on(&router, "76979871");

        router.deliver(
            "https://player.vimeo.com",
            r#"{"event":"ready","player_id":"vimeo76979871"}"#,
        );

        assert_eq!(video.state(), PlaybackState::Ready);
        let sent = frame.sent.lock();
        let payloads: Vec<&str> = sent.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            payloads,
            vec![
                r#"{"method":"addEventListener","value":"play"}"#,
                r#"{"method":"addEventListener","value":"pause"}"#,
                r#"{"method":"addEventListener","value":"finish"}"#,
            ]
        );
    }

    #[test]
    fn test_ready_notification_is_idempotent() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");
        let (events, _sub) = recorded_events(&video);

        for _ in 0..2 {
            router.deliver(
                "https://www.youtube.com",
                r#"{"event":"onReady","id":"youtubeabc12345678"}"#,
            );
        }

        // Readiness fires per message; the state machine stays Ready.
        assert_eq!(*events.lock(), vec![MediaEvent::Ready, MediaEvent::Ready]);
        assert_eq!(video.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_duplicate_state_message_is_suppressed() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = vimeo_on(&router, "76979871");
        let (events, _sub) = recorded_events(&video);

        for _ in 0..2 {
            router.deliver(
                "https://player.vimeo.com",
                r#"{"event":"finish","player_id":"vimeo76979871"}"#,
            );
        }

        // One transition, one ended notification; the repeat is a no-op.
        assert_eq!(video.state(), PlaybackState::Ended);
        assert_eq!(*events.lock(), vec![MediaEvent::Ended]);
    }

    #[test]
    fn test_duplicate_playing_changes_state_once() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");

        for _ in 0..2 {
            router.deliver(
                "https://www.youtube.com",
                r#"{"event":"infoDelivery","id":"youtubeabc12345678","info":{"playerState":1}}"#,
            );
        }
        assert_eq!(video.state(), PlaybackState::Playing);

        // A genuine change still applies afterwards.
        router.deliver(
            "https://www.youtube.com",
            r#"{"event":"infoDelivery","id":"youtubeabc12345678","info":{"playerState":2}}"#,
        );
        assert_eq!(video.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_origin_pins_to_first_writer() {
        let router = MessageRouter::new();
        assert_eq!(router.pinned_origin(ExternalProvider::YouTube), "*");

        assert!(router.pin_origin(ExternalProvider::YouTube, "https://www.youtube.com"));
        assert!(!router.pin_origin(ExternalProvider::YouTube, "https://youtube.com"));
        assert_eq!(
            router.pinned_origin(ExternalProvider::YouTube),
            "https://www.youtube.com"
        );

        // Providers pin independently.
        assert_eq!(router.pinned_origin(ExternalProvider::Vimeo), "*");
    }

    #[test]
    fn test_routing_by_element_identity() {
        let router = Arc::new(MessageRouter::new());
        let (youtube, _yt_frame) = youtube_on(&router, "abc12345678");
        let (vimeo, _vm_frame) = vimeo_on(&router, "76979871");

        router.deliver(
            "https://player.vimeo.com",
            r#"{"event":"play","player_id":"vimeo76979871"}"#,
        );

        assert_eq!(vimeo.state(), PlaybackState::Playing);
        assert_eq!(youtube.state(), PlaybackState::Unready);
    }

    #[test]
    fn test_messages_after_teardown_are_ignored() {
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");
        video.close();

        router.deliver(
            "https://www.youtube.com",
            r#"{"event":"infoDelivery","id":"youtubeabc12345678","info":{"playerState":1}}"#,
        );
        assert_eq!(video.state(), PlaybackState::Unready);
    }

    #[test]
    fn test_dead_targets_are_pruned() {
        init_logging();
        let router = Arc::new(MessageRouter::new());
        let (video, _frame) = youtube_on(&router, "abc12345678");
        drop(video);

        // Must not panic, and must clean the registry up.
        router.deliver(
            "https://www.youtube.com",
            r#"{"event":"onReady","id":"youtubeabc12345678"}"#,
        );
        assert!(router.targets.lock().is_empty());
    }
}
