//! The Beaver triple source, a (semi-)trusted dealer providing correlated randomness.
//!
//! For every multiplication the dealer samples `a` and `b` uniformly, computes `c = a·b` and
//! splits all three values additively between the parties. The shares of the local party are
//! returned as plain values; the shares of the two peers are sealed under their public keys so
//! that they can be forwarded without exposing them to the transport.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    PARTIES, PartyId,
    domain::{Ring, Share},
    seal::{PublicKey, SealError, Sealed, seal},
};

/// The default upper bound for the number of triples in a single batch.
pub const DEFAULT_MAX_BATCH: usize = 1 << 20;

/// Errors that can occur while generating triples.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The operating system could not provide randomness to seed the dealer.
    #[error("randomness source unavailable: {0}")]
    Entropy(String),
    /// More triples were requested than the dealer is configured to hand out at once.
    #[error("requested {requested} triples, but at most {max} can be generated per batch")]
    BatchTooLarge {
        /// The requested number of triples.
        requested: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The local party index is not one of the three parties.
    #[error("party {0} does not exist")]
    UnknownParty(PartyId),
    /// The batch holds no sealed shares for a peer.
    #[error("no triple shares were dealt for party {0}")]
    MissingPeer(PartyId),
    /// A share could not be sealed for its recipient.
    #[error("unable to seal triple share for party {party}")]
    Seal {
        /// The intended recipient.
        party: PartyId,
        /// The underlying failure.
        #[source]
        source: SealError,
    },
}

/// A single party's share of a Beaver triple.
///
/// This type is intentionally not `Clone`: a triple share is consumed by exactly one
/// multiplication.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleShare {
    /// Share of the random `a`.
    pub a: Share,
    /// Share of the random `b`.
    pub b: Share,
    /// Share of `c = a·b`.
    pub c: Share,
}

/// A peer's share of a Beaver triple, with every component sealed separately.
///
/// `a` and `b` are needed in the masking round, `c` only when combining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedTripleShare {
    /// Sealed share of `a`.
    pub a: Sealed,
    /// Sealed share of `b`.
    pub b: Sealed,
    /// Sealed share of `c`.
    pub c: Sealed,
}

/// The local party's triple shares of a batch, each of which can be taken only once.
#[derive(Debug)]
pub struct TripleBatch(Vec<Option<TripleShare>>);

/// A batch of triples as handed out by a [`TripleSource`].
#[derive(Debug)]
pub struct DealtTriples {
    local: TripleBatch,
    sealed: Vec<(PartyId, Vec<SealedTripleShare>)>,
}

/// A source of Beaver triples.
pub trait TripleSource: Send + Sync {
    /// Generates `count` fresh triples. `count == 0` yields an empty batch.
    fn generate(&self, count: usize) -> Result<DealtTriples, GenerationError>;
}

/// A dealer that generates triples locally and seals the peers' shares.
#[derive(Debug, Clone)]
pub struct TripleDealer {
    ring: Ring,
    party: PartyId,
    public_keys: [PublicKey; PARTIES],
    max_batch: usize,
    seed: Option<u64>,
}

impl TripleDealer {
    /// Creates a dealer for `party`, sealing peer shares under the given public keys.
    pub fn new(ring: Ring, party: PartyId, public_keys: [PublicKey; PARTIES]) -> Self {
        Self {
            ring,
            party,
            public_keys,
            max_batch: DEFAULT_MAX_BATCH,
            seed: None,
        }
    }

    /// Limits the number of triples per batch.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Uses a fixed seed instead of OS randomness. Only suitable for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> Result<ChaCha20Rng, GenerationError> {
        match self.seed {
            Some(seed) => Ok(ChaCha20Rng::seed_from_u64(seed)),
            None => ChaCha20Rng::try_from_os_rng()
                .map_err(|e| GenerationError::Entropy(e.to_string())),
        }
    }
}

impl TripleSource for TripleDealer {
    #[instrument(level = Level::DEBUG, skip(self), err)]
    fn generate(&self, count: usize) -> Result<DealtTriples, GenerationError> {
        if self.party >= PARTIES {
            return Err(GenerationError::UnknownParty(self.party));
        }
        if count > self.max_batch {
            return Err(GenerationError::BatchTooLarge {
                requested: count,
                max: self.max_batch,
            });
        }
        let mut rng = self.rng()?;
        let ring = self.ring;

        let mut local = Vec::with_capacity(count);
        let mut sealed: Vec<(PartyId, Vec<SealedTripleShare>)> = (0..PARTIES)
            .filter(|p| *p != self.party)
            .map(|p| (p, Vec::with_capacity(count)))
            .collect();
        for _ in 0..count {
            let a = ring.random(&mut rng);
            let b = ring.random(&mut rng);
            let c = ring.mul(a, b);
            let a_shares = ring.split(a, &mut rng);
            let b_shares = ring.split(b, &mut rng);
            let c_shares = ring.split(c, &mut rng);
            local.push(Some(TripleShare {
                a: a_shares[self.party],
                b: b_shares[self.party],
                c: c_shares[self.party],
            }));
            for (p, triples) in sealed.iter_mut() {
                let p = *p;
                let pk = &self.public_keys[p];
                let seal_err = |source| GenerationError::Seal { party: p, source };
                triples.push(SealedTripleShare {
                    a: seal(pk, &a_shares[p], &mut rng).map_err(seal_err)?,
                    b: seal(pk, &b_shares[p], &mut rng).map_err(seal_err)?,
                    c: seal(pk, &c_shares[p], &mut rng).map_err(seal_err)?,
                });
            }
        }
        debug!("dealt {count} triples");
        Ok(DealtTriples {
            local: TripleBatch(local),
            sealed,
        })
    }
}

impl TripleBatch {
    /// The number of triples in the batch, whether taken or not.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the batch contains no triples.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Takes the triple at `index`, or returns `None` if it was already taken or never existed.
    pub fn take(&mut self, index: usize) -> Option<TripleShare> {
        self.0.get_mut(index).and_then(Option::take)
    }
}

impl DealtTriples {
    /// The number of triples in the batch.
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// Returns `true` if the batch contains no triples.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// The sealed triple shares destined for `party`, index-aligned with the local batch.
    pub fn sealed_for(&self, party: PartyId) -> Option<&[SealedTripleShare]> {
        self.sealed
            .iter()
            .find(|(p, _)| *p == party)
            .map(|(_, triples)| triples.as_slice())
    }

    /// Splits the batch into the local shares and the sealed peer shares.
    pub fn into_parts(self) -> (TripleBatch, Vec<(PartyId, Vec<SealedTripleShare>)>) {
        (self.local, self.sealed)
    }
}
