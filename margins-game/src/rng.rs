//! Injectable randomness with one independent stream per gameplay domain.
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::{BTreeMap, VecDeque};

/// Gameplay domains that draw random numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomStream {
    /// Walk-away draws when committing a negotiated price.
    Negotiation,
    /// Units sold per sales tick.
    SalesTick,
    /// Market event occurrence and selection.
    MarketEvent,
}

impl RandomStream {
    pub const ALL: [Self; 3] = [Self::Negotiation, Self::SalesTick, Self::MarketEvent];

    const fn domain_tag(self) -> &'static [u8] {
        match self {
            Self::Negotiation => b"negotiation",
            Self::SalesTick => b"sales_tick",
            Self::MarketEvent => b"market_event",
        }
    }
}

/// Source of uniform draws, keyed by stream.
pub trait RandomSource: std::fmt::Debug {
    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self, stream: RandomStream) -> f64;

    /// Uniform draw in `[0, upper)`; 0 when `upper` is 0.
    fn next_below(&mut self, stream: RandomStream, upper: u32) -> u32;

    /// Uniform draw in `[low, high]`.
    fn next_between(&mut self, stream: RandomStream, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let span = high - low;
        low + self.next_below(stream, span.saturating_add(1))
    }
}

/// Deterministic bundle of RNG streams segregated by gameplay domain.
#[derive(Debug, Clone)]
pub struct RngBundle {
    seed: u64,
    negotiation: CountingRng<ChaCha20Rng>,
    sales_tick: CountingRng<ChaCha20Rng>,
    market_event: CountingRng<ChaCha20Rng>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            seed,
            negotiation: CountingRng::seeded(seed, RandomStream::Negotiation),
            sales_tick: CountingRng::seeded(seed, RandomStream::SalesTick),
            market_event: CountingRng::seeded(seed, RandomStream::MarketEvent),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws performed on a stream.
    #[must_use]
    pub const fn draws(&self, stream: RandomStream) -> u64 {
        match stream {
            RandomStream::Negotiation => self.negotiation.draws(),
            RandomStream::SalesTick => self.sales_tick.draws(),
            RandomStream::MarketEvent => self.market_event.draws(),
        }
    }

    fn stream_mut(&mut self, stream: RandomStream) -> &mut CountingRng<ChaCha20Rng> {
        match stream {
            RandomStream::Negotiation => &mut self.negotiation,
            RandomStream::SalesTick => &mut self.sales_tick,
            RandomStream::MarketEvent => &mut self.market_event,
        }
    }
}

impl RandomSource for RngBundle {
    fn next_unit(&mut self, stream: RandomStream) -> f64 {
        self.stream_mut(stream).gen_range(0.0..1.0)
    }

    fn next_below(&mut self, stream: RandomStream, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        self.stream_mut(stream).gen_range(0..upper)
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<ChaCha20Rng> {
    fn seeded(user_seed: u64, stream: RandomStream) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(derive_stream_seed(user_seed, stream.domain_tag())),
            draws: 0,
        }
    }
}

impl<R: RngCore> CountingRng<R> {
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    // HMAC accepts keys of any length, so the error arm is unreachable in practice.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()) else {
        return user_seed;
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Replays fixed per-stream sequences; exhausted streams return the fallback.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    units: BTreeMap<RandomStream, VecDeque<f64>>,
    integers: BTreeMap<RandomStream, VecDeque<u32>>,
    fallback_unit: f64,
    fallback_integer: u32,
}

impl ScriptedRandom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned by `next_unit` once a stream's script runs out.
    #[must_use]
    pub const fn with_fallback_unit(mut self, value: f64) -> Self {
        self.fallback_unit = value;
        self
    }

    /// Value returned by `next_below` once a stream's script runs out (clamped below `upper`).
    #[must_use]
    pub const fn with_fallback_integer(mut self, value: u32) -> Self {
        self.fallback_integer = value;
        self
    }

    #[must_use]
    pub fn with_units(mut self, stream: RandomStream, values: impl IntoIterator<Item = f64>) -> Self {
        self.units.entry(stream).or_default().extend(values);
        self
    }

    #[must_use]
    pub fn with_integers(
        mut self,
        stream: RandomStream,
        values: impl IntoIterator<Item = u32>,
    ) -> Self {
        self.integers.entry(stream).or_default().extend(values);
        self
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self, stream: RandomStream) -> f64 {
        self.units
            .get_mut(&stream)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback_unit)
    }

    fn next_below(&mut self, stream: RandomStream, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        let value = self
            .integers
            .get_mut(&stream)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback_integer);
        value.min(upper - 1)
    }
}
