use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MediaDescriptor;
use crate::media::{EventHub, MediaEvent, Playable, PlaybackState};
use crate::MediaError;

struct PictureState {
    src: String,
    ready: bool,
}

/// A still image behind the [`Playable`] contract.
///
/// Readiness fires on the first decode signal and never again; play and
/// pause are successful no-ops. There is no ended concept — a picture used
/// as a slide advances through the gallery's activation wiring instead.
#[derive(Clone)]
pub struct Picture {
    inner: Arc<Mutex<PictureState>>,
    events: EventHub,
}

impl Picture {
    pub fn new(descriptor: &MediaDescriptor) -> Result<Self, MediaError> {
        let src = descriptor.primary_uri();
        if src.is_empty() {
            return Err(MediaError::NoSources);
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(PictureState {
                src: src.to_string(),
                ready: false,
            })),
            events: EventHub::new(),
        })
    }

    /// Location the host should decode the image from.
    pub fn src(&self) -> String {
        self.inner.lock().src.clone()
    }

    /// The host finished decoding the image. Repeat signals are ignored.
    pub fn decoded(&self) {
        let first = {
            let mut state = self.inner.lock();
            !std::mem::replace(&mut state.ready, true)
        };
        if first {
            self.events.emit(&MediaEvent::Ready);
        }
    }
}

impl Playable for Picture {
    fn play(&self) {}

    fn pause(&self) {}

    fn state(&self) -> PlaybackState {
        if self.inner.lock().ready {
            PlaybackState::Ready
        } else {
            PlaybackState::Unready
        }
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}
