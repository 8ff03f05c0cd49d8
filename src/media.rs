mod external;
mod local;
mod picture;

pub use external::{
    element_id, embed_url, extract_remote_id, EmbedFrame, ExternalProvider, ExternalVideo,
};
pub use local::{LoadPoll, LoadSample, LocalVideo, ReadyState, VideoChrome, VideoElement};
pub use picture::Picture;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Current playback state of a media object.
///
/// State is `Unready` until the underlying resource has announced readiness
/// once; after that it never reports `Unready` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// The resource has not announced readiness yet.
    Unready,
    /// Readiness announced, playback not started.
    Ready,
    Playing,
    Paused,
    /// Playback reached its natural end.
    Ended,
}

/// Notification emitted by a media object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    /// Fired once the resource has buffered/decoded enough to be shown.
    Ready,
    /// Load-progress fraction in `[0, 1]`, emitted while a local video loads.
    Loading(f64),
    Paused,
    Ended,
}

/// Keys the library interprets; everything else is host chrome territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    Escape,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

/// Common contract implemented by every concrete media kind and the gallery.
pub trait Playable: Send + Sync {
    /// Start or resume playback. No-op for media kinds without motion.
    fn play(&self);

    /// Pause playback.
    fn pause(&self);

    /// Current playback state.
    fn state(&self) -> PlaybackState;

    /// Notification hub for ready/loading/paused/ended events.
    fn events(&self) -> &EventHub;
}

type Handler = Box<dyn FnMut(&MediaEvent) + Send>;

struct HubInner {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    // ids cancelled while an emit had the handlers checked out
    dead: Vec<u64>,
}

/// Subscription list for [`MediaEvent`] notifications.
///
/// Handlers run on the caller's stack, after the emitting object has released
/// its own locks; a handler may therefore call back into any playable.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 0,
                handlers: Vec::new(),
                dead: Vec::new(),
            })),
        }
    }

    /// Register a handler. Dropping the returned [`Subscription`] detaches it.
    pub fn subscribe(&self, handler: impl FnMut(&MediaEvent) + Send + 'static) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Box::new(handler)));
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every live handler with `event`.
    pub fn emit(&self, event: &MediaEvent) {
        // Check the handlers out so a handler can subscribe/cancel on this
        // same hub without deadlocking.
        let mut running = std::mem::take(&mut self.inner.lock().handlers);
        for (_, handler) in running.iter_mut() {
            handler(event);
        }
        let mut inner = self.inner.lock();
        let dead = std::mem::take(&mut inner.dead);
        running.retain(|(id, _)| !dead.contains(id));
        // Handlers registered during the emit land behind the existing ones.
        let added = std::mem::take(&mut inner.handlers);
        inner.handlers = running;
        inner.handlers.extend(added);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered event handler; detaches on drop.
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    /// Detach the handler now instead of waiting for drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let mut inner = inner.lock();
            let before = inner.handlers.len();
            inner.handlers.retain(|(id, _)| *id != self.id);
            if inner.handlers.len() == before {
                // Checked out by a running emit; flag it for removal there.
                inner.dead.push(self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<Mutex<Vec<MediaEvent>>>, impl FnMut(&MediaEvent) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |event: &MediaEvent| sink.lock().push(*event))
    }

    #[test]
    fn test_subscribe_and_emit() {
        let hub = EventHub::new();
        let (seen, handler) = counter();
        let _sub = hub.subscribe(handler);

        hub.emit(&MediaEvent::Ready);
        hub.emit(&MediaEvent::Ended);

        assert_eq!(*seen.lock(), vec![MediaEvent::Ready, MediaEvent::Ended]);
    }

    #[test]
    fn test_dropped_subscription_detaches() {
        let hub = EventHub::new();
        let (seen, handler) = counter();
        let sub = hub.subscribe(handler);

        hub.emit(&MediaEvent::Ready);
        sub.cancel();
        hub.emit(&MediaEvent::Ended);

        assert_eq!(*seen.lock(), vec![MediaEvent::Ready]);
    }

    #[test]
    fn test_cancel_during_emit() {
        let hub = EventHub::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (seen, handler) = counter();

        // First handler cancels the second while the emit is running.
        let slot_in_handler = slot.clone();
        let _canceller = hub.subscribe(move |_| {
            if let Some(sub) = slot_in_handler.lock().take() {
                sub.cancel();
            }
        });
        *slot.lock() = Some(hub.subscribe(handler));

        // The checked-out handler still runs this round, then detaches.
        hub.emit(&MediaEvent::Ready);
        hub.emit(&MediaEvent::Ended);

        assert_eq!(*seen.lock(), vec![MediaEvent::Ready]);
    }

    #[test]
    fn test_subscribe_during_emit() {
        let hub = EventHub::new();
        let (seen, handler) = counter();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let hub_in_handler = hub.clone();
        let handler_slot = Arc::new(Mutex::new(Some(handler)));
        let slot_in_handler = slot.clone();
        let _sub = hub.subscribe(move |_| {
            if let Some(late) = handler_slot.lock().take() {
                *slot_in_handler.lock() = Some(hub_in_handler.subscribe(late));
            }
        });

        hub.emit(&MediaEvent::Ready);
        hub.emit(&MediaEvent::Ended);

        // The late handler only sees events emitted after it subscribed.
        assert_eq!(*seen.lock(), vec![MediaEvent::Ended]);
    }
}
