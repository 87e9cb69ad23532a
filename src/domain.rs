//! Arithmetic over the shared numeric domain.
//!
//! All three parties must agree on the same [`Ring`]. It is injected into every component at
//! construction time and never read from global state.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::PARTIES;

/// The largest modulus accepted in [`Ring::Prime`] mode.
///
/// Two reduced elements below this bound multiply without overflowing an `i128`.
pub const MAX_MODULUS: u64 = 1 << 62;

/// Errors raised when validating a [`Ring`] configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// The modulus is too small to hold any secret.
    #[error("modulus {0} is smaller than 2")]
    ModulusTooSmall(u64),
    /// The modulus would overflow intermediate products.
    #[error("modulus {0} exceeds the maximum of 2^62")]
    ModulusTooLarge(u64),
}

/// An additive share of a secret value (or a value already reduced to the domain).
///
/// A share carries no identity of the value it partially represents; its meaning comes solely
/// from its position (record index, attribute, party).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Share(pub i128);

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ring all shares live in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Ring {
    /// Integers modulo `2^128`, implemented as wrapping `i128` arithmetic.
    #[default]
    Wrapping,
    /// Integers modulo a public modulus `p` with `2 <= p <= 2^62`.
    Prime {
        /// The public modulus.
        modulus: u64,
    },
}

impl Ring {
    /// Checks that the configuration can be used for arithmetic.
    pub fn validate(&self) -> Result<(), DomainError> {
        match *self {
            Ring::Wrapping => Ok(()),
            Ring::Prime { modulus } if modulus < 2 => Err(DomainError::ModulusTooSmall(modulus)),
            Ring::Prime { modulus } if modulus > MAX_MODULUS => {
                Err(DomainError::ModulusTooLarge(modulus))
            }
            Ring::Prime { .. } => Ok(()),
        }
    }

    /// Maps an arbitrary integer to its canonical representative.
    pub fn reduce(&self, v: i128) -> Share {
        match *self {
            Ring::Wrapping => Share(v),
            Ring::Prime { modulus } => Share(v.rem_euclid(modulus as i128)),
        }
    }

    /// `a + b`
    pub fn add(&self, a: Share, b: Share) -> Share {
        match self {
            Ring::Wrapping => Share(a.0.wrapping_add(b.0)),
            Ring::Prime { .. } => self.reduce(self.reduce(a.0).0 + self.reduce(b.0).0),
        }
    }

    /// `a - b`
    pub fn sub(&self, a: Share, b: Share) -> Share {
        match self {
            Ring::Wrapping => Share(a.0.wrapping_sub(b.0)),
            Ring::Prime { .. } => self.reduce(self.reduce(a.0).0 - self.reduce(b.0).0),
        }
    }

    /// `-a`
    pub fn neg(&self, a: Share) -> Share {
        self.sub(Share(0), a)
    }

    /// `a * b`
    ///
    /// Operands received from other parties need not be canonical; they are reduced first.
    pub fn mul(&self, a: Share, b: Share) -> Share {
        match self {
            Ring::Wrapping => Share(a.0.wrapping_mul(b.0)),
            Ring::Prime { .. } => self.reduce(self.reduce(a.0).0 * self.reduce(b.0).0),
        }
    }

    /// Multiplies a share with a public scalar.
    pub fn scale(&self, a: Share, k: i128) -> Share {
        let k = self.reduce(k);
        self.mul(a, k)
    }

    /// Sums shares locally. The result does not depend on the order of the shares.
    pub fn sum(&self, shares: impl IntoIterator<Item = Share>) -> Share {
        shares
            .into_iter()
            .fold(Share(0), |acc, share| self.add(acc, share))
    }

    /// Embeds a plaintext integer into the ring.
    pub fn encode(&self, v: i64) -> Share {
        self.reduce(v as i128)
    }

    /// Lifts a reconstructed value back to a signed integer.
    ///
    /// In prime mode, values above `p / 2` are interpreted as negative.
    pub fn decode(&self, s: Share) -> i128 {
        match *self {
            Ring::Wrapping => s.0,
            Ring::Prime { modulus } => {
                let modulus = modulus as i128;
                let v = s.0.rem_euclid(modulus);
                if v > modulus / 2 { v - modulus } else { v }
            }
        }
    }

    /// Samples a uniformly random element.
    pub fn random(&self, rng: &mut impl Rng) -> Share {
        match *self {
            Ring::Wrapping => Share(rng.random()),
            Ring::Prime { modulus } => Share(rng.random_range(0..modulus as i128)),
        }
    }

    /// Splits a value into additive shares, one per party.
    ///
    /// The first shares are uniformly random, the last one makes the shares sum up to `value`.
    pub fn split(&self, value: Share, rng: &mut impl Rng) -> [Share; PARTIES] {
        let mut shares = [Share(0); PARTIES];
        let mut rest = value;
        for share in shares.iter_mut().take(PARTIES - 1) {
            *share = self.random(rng);
            rest = self.sub(rest, *share);
        }
        shares[PARTIES - 1] = rest;
        shares
    }
}
