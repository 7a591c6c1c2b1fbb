//! Shared activation flag
//!
//! The gate is the only writer; the state machine and recorder read it.
//! State and a keepalive epoch are packed into one atomic word so that a
//! keepalive expiry only lands when nothing else touched the flag since the
//! keepalive was armed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// Activation mode of the wake gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Waiting for a wake word; user input is blocked
    #[default]
    Asleep,
    /// Wake word heard; user input passes until the keepalive expires
    Awake,
    /// Detection disabled; all user input is dropped
    Muted,
}

impl ActivationState {
    const fn to_bits(self) -> u64 {
        match self {
            Self::Asleep => 0,
            Self::Awake => 1,
            Self::Muted => 2,
        }
    }

    const fn from_bits(bits: u64) -> Self {
        match bits {
            1 => Self::Awake,
            2 => Self::Muted,
            _ => Self::Asleep,
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asleep => write!(f, "asleep"),
            Self::Awake => write!(f, "awake"),
            Self::Muted => write!(f, "muted"),
        }
    }
}

const fn encode(state: ActivationState, epoch: u64) -> u64 {
    (epoch << STATE_BITS) | state.to_bits()
}

const fn decode(word: u64) -> (ActivationState, u64) {
    (ActivationState::from_bits(word & STATE_MASK), word >> STATE_BITS)
}

/// Cloneable read handle to the gate's activation state
#[derive(Debug, Clone, Default)]
pub struct ActivationHandle {
    word: Arc<AtomicU64>,
}

impl ActivationHandle {
    /// Create a handle in the `Asleep` state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current activation state
    #[must_use]
    pub fn get(&self) -> ActivationState {
        decode(self.word.load(Ordering::Acquire)).0
    }

    /// Whether the gate is awake
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.get() == ActivationState::Awake
    }

    /// Whether the gate is muted
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.get() == ActivationState::Muted
    }

    /// Apply `next` atomically, bumping the epoch
    ///
    /// Returns the previous state and the new epoch, or `None` when `next`
    /// declined the transition.
    pub(crate) fn update(
        &self,
        next: impl Fn(ActivationState) -> Option<ActivationState>,
    ) -> Option<(ActivationState, u64)> {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (state, epoch) = decode(word);
                next(state).map(|target| encode(target, epoch.wrapping_add(1)))
            })
            .ok()
            .map(|previous| {
                let (state, epoch) = decode(previous);
                (state, epoch.wrapping_add(1))
            })
    }

    /// Move `Awake` to `Asleep` only if the epoch still matches
    pub(crate) fn expire(&self, epoch: u64) -> bool {
        self.word
            .compare_exchange(
                encode(ActivationState::Awake, epoch),
                encode(ActivationState::Asleep, epoch),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
