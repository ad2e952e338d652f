//! Keyframed animation tracks.
//!
//! Tracks target nodes by name and carry independent translation, rotation
//! and scale channels. Translation and scale interpolate linearly between
//! keys; rotation uses spherical interpolation.

use glam::{Quat, Vec3};

/// One keyframe.
#[derive(Clone, Copy, Debug)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

/// Per-key interpolation used by [`Channel::sample`].
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }
}

/// A sorted list of keyframes for one transform component.
#[derive(Clone, Debug, Default)]
pub struct Channel<T> {
    pub keys: Vec<Keyframe<T>>,
}

impl<T: Interpolate> Channel<T> {
    #[must_use]
    pub fn new(keys: Vec<Keyframe<T>>) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn duration(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.time)
    }

    /// Samples at `time`, clamping to the first/last key outside the range.
    /// On a key boundary the blend weight is exactly 0 or 1.
    #[must_use]
    pub fn sample(&self, time: f32) -> Option<T> {
        let first = self.keys.first()?;
        if self.keys.len() == 1 || time <= first.time {
            return Some(first.value);
        }
        let last = self.keys[self.keys.len() - 1];
        if time >= last.time {
            return Some(last.value);
        }

        // First key strictly after `time`; the segment start precedes it.
        let next = self.keys.partition_point(|k| k.time <= time);
        let k0 = self.keys[next - 1];
        let k1 = self.keys[next];
        let span = k1.time - k0.time;
        let t = if span > 1e-6 {
            ((time - k0.time) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(T::interpolate(k0.value, k1.value, t))
    }
}

/// An animation track bound to a node by name.
#[derive(Clone, Debug, Default)]
pub struct AnimationTrack {
    pub node_name: String,
    pub translation: Channel<Vec3>,
    pub rotation: Channel<Quat>,
    pub scale: Channel<Vec3>,
    time: f32,
    duration: f32,
    playing: bool,
}

impl AnimationTrack {
    #[must_use]
    pub fn new(
        node_name: impl Into<String>,
        translation: Channel<Vec3>,
        rotation: Channel<Quat>,
        scale: Channel<Vec3>,
    ) -> Self {
        let duration = translation
            .duration()
            .max(rotation.duration())
            .max(scale.duration());
        Self {
            node_name: node_name.into(),
            translation,
            rotation,
            scale,
            time: 0.0,
            duration,
            playing: false,
        }
    }

    #[must_use]
    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[must_use]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Advances playback, wrapping at the track duration.
    pub fn advance(&mut self, dt: f32) {
        if !self.playing || self.duration <= 0.0 {
            return;
        }
        self.time += dt;
        while self.time >= self.duration {
            self.time -= self.duration;
        }
    }

    /// Samples all three channels at the current playback time.
    #[must_use]
    pub fn sample(&self) -> (Option<Vec3>, Option<Quat>, Option<Vec3>) {
        (
            self.translation.sample(self.time),
            self.rotation.sample(self.time),
            self.scale.sample(self.time),
        )
    }
}
