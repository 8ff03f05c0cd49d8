use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::config::{MediaDescriptor, MediaOptions, Preload, SourceSpec, Track};
use crate::media::{EventHub, MediaEvent, Playable, PlaybackState};
use crate::MediaError;

/// Readiness ladder reported by the wrapped element, mirroring the native
/// media element's `readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// The native playable element wrapped by a [`LocalVideo`].
///
/// The host implements this over whatever actually renders the video and
/// forwards the element's natural-end signal to [`LocalVideo::handle_ended`].
pub trait VideoElement: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;

    /// Total duration in seconds; NaN while unknown.
    fn duration(&self) -> f64;
    fn current_time(&self) -> f64;
    fn seek(&mut self, position: f64);

    fn ready_state(&self) -> ReadyState;
    /// End of the last buffered range in seconds, if anything is buffered.
    fn buffered_end(&self) -> Option<f64>;

    /// Replace all attached sources with `tracks`.
    fn set_tracks(&mut self, tracks: &[Track]);
    /// Re-run resource selection after the sources changed.
    fn load(&mut self);
    /// Remove every source, leaving no playable sink.
    fn detach_sources(&mut self);

    fn set_muted(&mut self, muted: bool);
    fn set_preload(&mut self, preload: Preload);
    fn set_poster(&mut self, poster: &str);
}

/// Visual chrome collaborator for a local video.
///
/// Implementations must not call back into the library from these methods.
pub trait VideoChrome: Send {
    /// Show the controls and re-arm their auto-hide timer.
    fn show_controls(&mut self);
    /// Reflect play/pause on the play button affordance.
    fn set_paused_affordance(&mut self, paused: bool);
    /// Highlight the active entry of the quality selector.
    fn mark_quality(&mut self, index: usize);
    /// Arm or disarm the keyboard shortcut capture.
    fn capture_keyboard(&mut self, capture: bool);
    fn is_fullscreen(&self) -> bool;
    fn request_fullscreen(&mut self);
    fn exit_fullscreen(&mut self);
}

/// Chrome-less operation, used by headless hosts and tests.
impl VideoChrome for () {
    fn show_controls(&mut self) {}
    fn set_paused_affordance(&mut self, _paused: bool) {}
    fn mark_quality(&mut self, _index: usize) {}
    fn capture_keyboard(&mut self, _capture: bool) {}
    fn is_fullscreen(&self) -> bool {
        false
    }
    fn request_fullscreen(&mut self) {}
    fn exit_fullscreen(&mut self) {}
}

/// Poll cadence; also the interval term of the rate formula.
const POLL_INTERVAL_SECS: f64 = 0.5;

/// Outcome of one load-progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadSample {
    /// Emit this fraction as the current loading value.
    Progress(f64),
    /// Maximum readiness seen, waiting out the debounce window.
    Debouncing,
    /// Load complete; the poll stopped.
    Ready,
}

/// Load-progress state machine, sampled once per poll tick.
///
/// The reported fraction is a smoothed rate-of-progress indicator, not the
/// raw buffered fraction: `p * (1 + (p - p_prev) / interval)` with
/// `p = buffered_end / duration`. A stalling load therefore reports less
/// than its buffered fraction before any buffered time regresses.
#[derive(Debug)]
pub struct LoadPoll {
    interval_secs: f64,
    previous: f64,
    last_loaded: f64,
    enough_count: u8,
    active: bool,
}

impl LoadPoll {
    pub fn new() -> Self {
        Self {
            interval_secs: POLL_INTERVAL_SECS,
            previous: 0.0,
            last_loaded: 0.0,
            enough_count: 0,
            active: false,
        }
    }

    /// Begin (or re-begin, after a source switch) polling from scratch.
    pub fn restart(&mut self) {
        self.previous = 0.0;
        self.last_loaded = 0.0;
        self.enough_count = 0;
        self.active = true;
    }

    /// Stop polling without reaching readiness.
    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Last fraction computed; 1.0 once readiness was reached.
    pub fn loaded(&self) -> f64 {
        self.last_loaded
    }

    /// Feed one sample of the element's state through the machine.
    pub fn sample(
        &mut self,
        ready_state: ReadyState,
        buffered_end: Option<f64>,
        duration: f64,
    ) -> LoadSample {
        match ready_state {
            ReadyState::HaveNothing | ReadyState::HaveMetadata => {
                self.enough_count = 0;
                self.last_loaded = 0.0;
                LoadSample::Progress(0.0)
            }
            ReadyState::HaveCurrentData | ReadyState::HaveFutureData => {
                // An unknown duration is a defined zero, not an error.
                let fraction = match buffered_end {
                    Some(end) if duration.is_finite() && duration > 0.0 => end / duration,
                    _ => 0.0,
                };
                let loaded = if fraction > 0.0 {
                    let rate = 1.0 + (fraction - self.previous) / self.interval_secs;
                    (fraction * rate).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if fraction > 0.0 {
                    self.previous = fraction;
                }
                self.enough_count = 0;
                self.last_loaded = loaded;
                LoadSample::Progress(loaded)
            }
            ReadyState::HaveEnoughData => {
                // Debounces flicker at the readiness boundary: either the
                // computed load is nearly complete, or maximum readiness has
                // held for three consecutive samples.
                if self.last_loaded > 0.9 || self.enough_count >= 2 {
                    self.last_loaded = 1.0;
                    self.active = false;
                    LoadSample::Ready
                } else {
                    self.enough_count += 1;
                    LoadSample::Debouncing
                }
            }
        }
    }
}

impl Default for LoadPoll {
    fn default() -> Self {
        Self::new()
    }
}

struct LocalState {
    element: Box<dyn VideoElement>,
    chrome: Box<dyn VideoChrome>,
    sources: Vec<SourceSpec>,
    active_source: usize,
    options: MediaOptions,
    playback: PlaybackState,
    poll: LoadPoll,
}

/// A player wrapping a native video element, with quality switching and a
/// polled load-progress machine.
///
/// The host drives it: call [`update`](LocalVideo::update) on a fixed
/// 500 ms timer while it returns `true`, and forward the element's ended
/// signal to [`handle_ended`](LocalVideo::handle_ended).
#[derive(Clone)]
pub struct LocalVideo {
    inner: Arc<Mutex<LocalState>>,
    events: EventHub,
}

impl LocalVideo {
    pub fn new(
        descriptor: MediaDescriptor,
        element: Box<dyn VideoElement>,
        chrome: Box<dyn VideoChrome>,
    ) -> Result<Self, MediaError> {
        if descriptor.sources.is_empty() {
            return Err(MediaError::NoSources);
        }
        if descriptor.options.default_source >= descriptor.sources.len() {
            return Err(MediaError::SourceIndex(descriptor.options.default_source));
        }

        let mut state = LocalState {
            element,
            chrome,
            sources: descriptor.sources,
            active_source: descriptor.options.default_source,
            options: descriptor.options,
            playback: PlaybackState::Unready,
            poll: LoadPoll::new(),
        };
        state.element.set_muted(state.options.muted);
        state.element.set_preload(state.options.preload);
        if let Some(poster) = state.options.poster.clone() {
            state.element.set_poster(&poster);
        }
        if !state.options.noload {
            change_source_locked(&mut state, None)?;
        }
        info!("created local video with {} source(s)", state.sources.len());

        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            events: EventHub::new(),
        })
    }

    /// Swap the active quality variant.
    ///
    /// Stops running playback, reloads the element with the new tracks,
    /// restores the previous position clamped to the new duration and
    /// restarts the load poll. `None` selects the configured default.
    pub fn change_source(&self, index: Option<usize>) -> Result<(), MediaError> {
        change_source_locked(&mut self.inner.lock(), index)
    }

    /// One poll tick; returns `true` while the poll wants further ticks.
    pub fn update(&self) -> bool {
        let outcome = {
            let mut state = self.inner.lock();
            if !state.poll.is_active() {
                return false;
            }
            let ready_state = state.element.ready_state();
            let buffered_end = state.element.buffered_end();
            let duration = state.element.duration();
            let outcome = state.poll.sample(ready_state, buffered_end, duration);
            if outcome == LoadSample::Ready && state.playback == PlaybackState::Unready {
                state.playback = PlaybackState::Ready;
            }
            outcome
        };
        match outcome {
            LoadSample::Progress(fraction) => {
                self.events.emit(&MediaEvent::Loading(fraction));
                true
            }
            LoadSample::Debouncing => true,
            LoadSample::Ready => {
                debug!("local video load complete");
                self.events.emit(&MediaEvent::Ready);
                false
            }
        }
    }

    /// The wrapped element reached its natural end.
    pub fn handle_ended(&self) {
        {
            let mut state = self.inner.lock();
            state.element.pause();
            state.chrome.set_paused_affordance(true);
            state.chrome.capture_keyboard(false);
            state.playback = PlaybackState::Ended;
            state.element.seek(0.0);
            if state.chrome.is_fullscreen() {
                state.chrome.exit_fullscreen();
            }
        }
        self.events.emit(&MediaEvent::Ended);
    }

    /// Force-pause, cancel the poll and detach every source.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        if !state.element.is_paused() {
            state.element.pause();
        }
        state.chrome.set_paused_affordance(true);
        state.chrome.capture_keyboard(false);
        state.poll.cancel();
        state.element.detach_sources();
        state.element.load();
    }

    /// User-requested fullscreen toggle.
    pub fn toggle_fullscreen(&self) {
        let mut state = self.inner.lock();
        if state.chrome.is_fullscreen() {
            state.chrome.exit_fullscreen();
        } else {
            state.chrome.request_fullscreen();
        }
    }

    /// Last computed loading fraction; 1.0 once ready.
    pub fn load_progress(&self) -> f64 {
        self.inner.lock().poll.loaded()
    }

    /// Fraction of the media already played, 0 while duration is unknown.
    pub fn played_fraction(&self) -> f64 {
        let state = self.inner.lock();
        let duration = state.element.duration();
        if duration.is_finite() && duration > 0.0 {
            (state.element.current_time() / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn active_source(&self) -> usize {
        self.inner.lock().active_source
    }

    /// Labels of the quality variants, for building a selector.
    pub fn source_labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .sources
            .iter()
            .map(|source| source.label.clone())
            .collect()
    }
}

impl Playable for LocalVideo {
    fn play(&self) {
        let mut state = self.inner.lock();
        state.element.play();
        state.chrome.set_paused_affordance(false);
        state.chrome.show_controls();
        // Keyboard capture is armed only while actually Playing; before
        // readiness the element call is a request, not a state change.
        if state.playback != PlaybackState::Unready {
            state.playback = PlaybackState::Playing;
            state.chrome.capture_keyboard(true);
        }
    }

    fn pause(&self) {
        let was_playing = {
            let mut state = self.inner.lock();
            state.element.pause();
            state.chrome.set_paused_affordance(true);
            state.chrome.show_controls();
            state.chrome.capture_keyboard(false);
            let was_playing = state.playback == PlaybackState::Playing;
            if was_playing {
                state.playback = PlaybackState::Paused;
            }
            was_playing
        };
        if was_playing {
            self.events.emit(&MediaEvent::Paused);
        }
    }

    fn state(&self) -> PlaybackState {
        self.inner.lock().playback
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

fn change_source_locked(state: &mut LocalState, index: Option<usize>) -> Result<(), MediaError> {
    let index = index.unwrap_or(state.options.default_source);
    if index >= state.sources.len() {
        return Err(MediaError::SourceIndex(index));
    }

    if !state.element.is_paused() {
        state.element.pause();
        state.chrome.set_paused_affordance(true);
        state.chrome.capture_keyboard(false);
        if state.playback == PlaybackState::Playing {
            state.playback = PlaybackState::Paused;
        }
    }
    state.poll.cancel();

    let position = state.element.current_time();
    let tracks = state.sources[index].tracks.clone();
    state.element.set_tracks(&tracks);
    state.element.load();

    let duration = state.element.duration();
    let restored = if duration.is_finite() {
        position.min(duration)
    } else {
        position
    };
    state.element.seek(restored);

    state.active_source = index;
    state.poll.restart();
    state.chrome.mark_quality(index);
    debug!("switched to source {index} at {restored:.2}s");
    Ok(())
}
