//! Shared running totals of the measured flow.
//!
//! The analyzer is the only writer; any number of readers on other threads
//! take snapshots. Values live in a sequence-counter cell of atomic words: a
//! writer makes the counter odd, stores the words and makes it even again,
//! and readers retry whenever the counter was odd or changed under them.
//! Neither side ever takes a lock.

use std::{
    hint,
    sync::{
        atomic::{fence, AtomicU32, Ordering},
        Arc,
    },
};

use glam::{Vec2, Vec3};

use crate::transform::FlowTransform;

/// Scale of the 16.16 fixed-point integrators.
pub const FIXED_ONE: f32 = 65536.0;

/// Convert a value to a 16.16 fixed-point increment.
#[inline]
pub fn to_fixed(value: f32) -> u32 {
    (value * FIXED_ONE) as i32 as u32
}

/// Signed difference of two 16.16 fixed-point totals, as a float.
#[inline]
pub fn fixed_delta(current: u32, origin: u32) -> f32 {
    current.wrapping_sub(origin) as i32 as f32 / FIXED_ONE
}

pub(crate) struct SeqCell<const N: usize> {
    seq: AtomicU32,
    words: [AtomicU32; N],
}

impl<const N: usize> SeqCell<N> {
    pub fn new(words: [u32; N]) -> Self {
        Self {
            seq: AtomicU32::new(0),
            words: words.map(AtomicU32::new),
        }
    }

    pub fn load(&self) -> [u32; N] {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }

            let words = std::array::from_fn(|i| self.words[i].load(Ordering::Relaxed));

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return words;
            }
        }
    }

    /// Read-modify-write the words as one consistent update.
    pub fn update(&self, f: impl FnOnce(&mut [u32; N])) {
        let mut seq = self.seq.load(Ordering::Relaxed);
        loop {
            if seq & 1 == 1 {
                hint::spin_loop();
                seq = self.seq.load(Ordering::Relaxed);
                continue;
            }
            match self.seq.compare_exchange_weak(
                seq,
                seq.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => seq = current,
            }
        }
        fence(Ordering::Release);

        let mut words = std::array::from_fn(|i| self.words[i].load(Ordering::Relaxed));
        f(&mut words);
        for (cell, word) in self.words.iter().zip(words) {
            cell.store(word, Ordering::Relaxed);
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn store(&self, words: [u32; N]) {
        self.update(|w| *w = words);
    }
}

/// A consistent copy of the three integrators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorSnapshot {
    /// Horizontal displacement total, 16.16 fixed point.
    pub x: u32,
    /// Vertical displacement total, 16.16 fixed point.
    pub y: u32,
    /// Motion length total, 16.16 fixed point.
    pub length: u32,
}

impl IntegratorSnapshot {
    /// Displacement accumulated since `origin`, in pixels.
    pub fn displacement_since(&self, origin: &IntegratorSnapshot) -> Vec2 {
        Vec2::new(fixed_delta(self.x, origin.x), fixed_delta(self.y, origin.y))
    }

    /// Motion length accumulated since `origin`.
    pub fn length_since(&self, origin: &IntegratorSnapshot) -> f32 {
        fixed_delta(self.length, origin.length)
    }
}

struct SharedFlow {
    integrator: SeqCell<3>,
    transform: SeqCell<9>,
}

/// Handle to the integrators and model transform of one analyzer.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct FlowSource {
    shared: Arc<SharedFlow>,
}

impl Default for FlowSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSource")
            .field("integrator", &self.snapshot())
            .field("transform", &self.transform())
            .finish()
    }
}

impl FlowSource {
    /// Create zeroed integrators with the default transform.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedFlow {
                integrator: SeqCell::new([0; 3]),
                transform: SeqCell::new(FlowTransform::default().to_words()),
            }),
        }
    }

    /// Take a consistent snapshot of the integrators.
    pub fn snapshot(&self) -> IntegratorSnapshot {
        let [x, y, length] = self.shared.integrator.load();
        IntegratorSnapshot { x, y, length }
    }

    /// The current model transform.
    pub fn transform(&self) -> FlowTransform {
        FlowTransform::from_words(self.shared.transform.load())
    }

    /// Replace the model transform. Captures see it on their next capture.
    pub fn set_transform(&self, basis_x: Vec3, basis_y: Vec3, origin: Vec3) {
        self.shared
            .transform
            .store(FlowTransform::new(basis_x, basis_y, origin).to_words());
    }

    /// Add one field's measurements to the integrators.
    ///
    /// Absent values leave their integrators untouched.
    pub(crate) fn accumulate(&self, displacement: Option<Vec2>, length: Option<f32>) {
        if displacement.is_none() && length.is_none() {
            return;
        }
        self.shared.integrator.update(|[x, y, l]: &mut [u32; 3]| {
            if let Some(d) = displacement {
                *x = x.wrapping_add(to_fixed(d.x));
                *y = y.wrapping_add(to_fixed(d.y));
            }
            if let Some(len) = length {
                *l = l.wrapping_add(to_fixed(len));
            }
        });
    }
}
