use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::media::{EventHub, Key, MediaEvent, Playable, PlaybackState, Subscription};
use crate::{Media, MediaError};

/// Navigation direction through a gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Visual chrome collaborator for a gallery.
///
/// Implementations must not call back into the library from these methods.
pub trait GalleryChrome: Send {
    /// Show the navigation controls and re-arm their auto-hide timer.
    fn show_controls(&mut self);
    fn set_previous_visible(&mut self, visible: bool);
    fn set_next_visible(&mut self, visible: bool);
    /// Toggle the loading indicator while a slide preloads.
    fn set_loading(&mut self, loading: bool);
    /// Display name of the newly selected slide.
    fn slide_name(&mut self, name: Option<&str>);
    /// Arm or disarm the gallery keyboard capture.
    fn capture_keyboard(&mut self, capture: bool);
}

/// Chrome-less operation, used by headless hosts and tests.
impl GalleryChrome for () {
    fn show_controls(&mut self) {}
    fn set_previous_visible(&mut self, _visible: bool) {}
    fn set_next_visible(&mut self, _visible: bool) {}
    fn set_loading(&mut self, _loading: bool) {}
    fn slide_name(&mut self, _name: Option<&str>) {}
    fn capture_keyboard(&mut self, _capture: bool) {}
}

/// One slide handed to [`Gallery::new`]; composition is fixed from there on.
pub struct GallerySlide {
    pub media: Media,
    pub name: Option<String>,
}

struct SlideState {
    media: Media,
    name: Option<String>,
    loaded: bool,
}

struct GalleryState {
    slides: Vec<SlideState>,
    selected: usize,
    loading: Option<usize>,
    announced: bool,
    chrome: Box<dyn GalleryChrome>,
    _subs: Vec<Subscription>,
}

/// Orchestrates an ordered slide sequence over already-built media objects.
///
/// Owns navigation, one-slide-ahead preloading and the discipline that at
/// most one slide is ever mid-load. Selection of a not-yet-loaded slide is
/// deferred until that slide's readiness notification fires.
#[derive(Clone)]
pub struct Gallery {
    inner: Arc<Mutex<GalleryState>>,
    events: EventHub,
}

impl Gallery {
    pub fn new(
        slides: Vec<GallerySlide>,
        chrome: Box<dyn GalleryChrome>,
    ) -> Result<Self, MediaError> {
        if slides.is_empty() {
            return Err(MediaError::EmptyInput);
        }

        // Event hub handles are grabbed up front; the media objects move
        // into the shared state below.
        let hubs: Vec<EventHub> = slides
            .iter()
            .map(|slide| slide.media.events().clone())
            .collect();

        let mut chrome = chrome;
        let last = slides.len() - 1;
        chrome.set_previous_visible(false);
        chrome.set_next_visible(last != 0);
        chrome.slide_name(slides[0].name.as_deref());

        let inner = Arc::new(Mutex::new(GalleryState {
            slides: slides
                .into_iter()
                .map(|slide| SlideState {
                    // A slide that was ready before the gallery existed
                    // must not be waited on again.
                    loaded: slide.media.state() != PlaybackState::Unready,
                    media: slide.media,
                    name: slide.name,
                })
                .collect(),
            selected: 0,
            loading: None,
            announced: false,
            chrome,
            _subs: Vec::new(),
        }));
        let events = EventHub::new();

        let subs = hubs
            .iter()
            .enumerate()
            .map(|(index, hub)| {
                let weak = Arc::downgrade(&inner);
                let gallery_events = events.clone();
                hub.subscribe(move |event| {
                    if !matches!(event, MediaEvent::Ready) {
                        return;
                    }
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let mut to_pause = None;
                    let mut announce = false;
                    {
                        let mut state = inner.lock();
                        state.slides[index].loaded = true;
                        if index == 0 && !state.announced {
                            state.announced = true;
                            announce = true;
                        }
                        if state.loading == Some(index) {
                            // The awaited preload finished; it becomes the
                            // selection immediately.
                            state.loading = None;
                            state.chrome.set_loading(false);
                            to_pause = select_locked(&mut state, index);
                        }
                    }
                    if let Some(media) = to_pause {
                        media.pause();
                    }
                    if announce {
                        gallery_events.emit(&MediaEvent::Ready);
                    }
                })
            })
            .collect();
        inner.lock()._subs = subs;

        Ok(Self { inner, events })
    }

    /// Navigate one slide in `direction`.
    ///
    /// `Next` past the last slide wraps to the first; `Previous` below the
    /// first stays put. A preload in flight for a different slide is
    /// abandoned; one in flight for the requested slide keeps running and
    /// becomes the selection when it finishes.
    pub fn advance(&self, direction: Direction) {
        let to_pause = {
            let mut state = self.inner.lock();
            let len = state.slides.len();
            let target = match direction {
                Direction::Next => {
                    let next = state.selected + 1;
                    if next == len { 0 } else { next }
                }
                Direction::Previous => {
                    if state.selected == 0 {
                        // Navigation stays put, but an in-flight preload
                        // for another slide is still abandoned.
                        if state.loading.take().is_some() {
                            state.chrome.set_loading(false);
                        }
                        return;
                    }
                    state.selected - 1
                }
            };

            if let Some(loading) = state.loading {
                if loading == target {
                    // That load already satisfies this request; let it
                    // finish rather than restarting it.
                    return;
                }
                debug!("abandoning preload of slide {loading}");
                state.loading = None;
                state.chrome.set_loading(false);
            }
            if direction == Direction::Next {
                state.chrome.show_controls();
            }

            if state.slides[target].loaded {
                select_locked(&mut state, target)
            } else {
                state.loading = Some(target);
                state.chrome.set_loading(true);
                None
            }
        };
        if let Some(media) = to_pause {
            media.pause();
        }
    }

    /// Handle a key the host captured for the gallery; always consumed.
    pub fn handle_key(&self, key: Key) -> bool {
        match key {
            Key::Space | Key::ArrowUp | Key::ArrowRight => self.advance(Direction::Next),
            Key::ArrowDown | Key::ArrowLeft => self.advance(Direction::Previous),
            Key::Escape => self.pause(),
        }
        true
    }

    pub fn selected_index(&self) -> usize {
        self.inner.lock().selected
    }

    /// Index of the slide currently preloading, if any.
    pub fn loading_index(&self) -> Option<usize> {
        self.inner.lock().loading
    }

    pub fn slide_count(&self) -> usize {
        self.inner.lock().slides.len()
    }

    /// Handle to the media object of slide `index`.
    pub fn slide(&self, index: usize) -> Option<Media> {
        self.inner
            .lock()
            .slides
            .get(index)
            .map(|slide| slide.media.clone())
    }
}

impl Playable for Gallery {
    /// Delegates to the selected slide only; other slides stay dormant.
    fn play(&self) {
        let media = {
            let mut state = self.inner.lock();
            state.chrome.capture_keyboard(true);
            state.slides[state.selected].media.clone()
        };
        media.play();
    }

    fn pause(&self) {
        let media = {
            let mut state = self.inner.lock();
            state.chrome.capture_keyboard(false);
            state.slides[state.selected].media.clone()
        };
        media.pause();
        self.events.emit(&MediaEvent::Paused);
    }

    fn state(&self) -> PlaybackState {
        let (announced, media) = {
            let state = self.inner.lock();
            (state.announced, state.slides[state.selected].media.clone())
        };
        if announced {
            media.state()
        } else {
            PlaybackState::Unready
        }
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

/// Switch the selection; returns the previous slide's media so the caller
/// can pause it once the gallery lock is released.
fn select_locked(state: &mut GalleryState, index: usize) -> Option<Media> {
    let previous = state.selected;
    state.selected = index;
    let last = state.slides.len() - 1;
    state.chrome.set_previous_visible(index != 0);
    state.chrome.set_next_visible(index != last);
    let name = state.slides[index].name.clone();
    state.chrome.slide_name(name.as_deref());
    state.chrome.show_controls();
    debug!("selected slide {index}");
    (previous != index).then(|| state.slides[previous].media.clone())
}
