//! The statistic protocols, driven by the orchestrating party.
//!
//! The orchestrator sums its own shares, asks both peers for theirs and, for statistics that need
//! products of secret values, runs a batched Beaver multiplication:
//!
//! 1. local shares are gathered and a fresh triple is dealt per record,
//! 2. every party masks its operands (`d_i`, `e_i`) and the masks of all parties are collected,
//! 3. every party combines the opened masks into its share of the summed products,
//! 4. the three product shares are added up.
//!
//! The orchestrating party is always the designated party of the multiplication. Both peers are
//! contacted concurrently within a round, but a round only completes once both have answered.

use std::sync::Arc;

use futures::future::try_join;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    PARTIES, PartyId,
    attribute::{Attribute, UnknownAttribute},
    beaver::{AlignmentError, MaskedPair, Multiplier, OpenedMasks, check_len},
    domain::{Ring, Share},
    party::{Party, PartyError},
    peer::{ComputeRequest, LocalPeers, MaskRequest, PeerClient, SumRequest},
    peers_of,
    seal::SecretKey,
    store::ShareStore,
    triples::{GenerationError, SealedTripleShare, TripleDealer, TripleShare, TripleSource},
};

/// A boxed error as returned by a peer client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while computing a statistic.
///
/// No partial or approximate result is ever returned together with an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested attribute is not tracked.
    #[error(transparent)]
    InvalidAttribute(#[from] UnknownAttribute),
    /// A peer call did not return successfully.
    #[error("party {party} is unavailable")]
    PeerUnavailable {
        /// The peer that failed.
        party: PartyId,
        /// The cause reported by the peer client.
        #[source]
        source: BoxError,
    },
    /// Beaver triples could not be generated.
    #[error("triple generation failed")]
    Generation(#[from] GenerationError),
    /// Peer batches do not line up with the local records.
    #[error("record batches are misaligned")]
    Alignment(#[from] AlignmentError),
    /// The aggregated squared deviation is negative, which indicates an inconsistent protocol run.
    #[error("aggregated squared deviation {0} is negative")]
    NegativeVariance(i128),
    /// The squared deviation of an attribute does not fit into 128 bits.
    #[error("squared deviation of {0} exceeds the 128-bit range")]
    OutOfRange(Attribute),
    /// The standard deviation of an attribute is zero, so the correlation is undefined.
    #[error("standard deviation of {0} is zero, correlation is undefined")]
    DivisionByZero(Attribute),
    /// There are no records, so the statistic is undefined.
    #[error("the dataset is empty")]
    EmptyDataset,
    /// The local party could not serve its own part of the protocol.
    #[error("local party failed")]
    Local(#[from] PartyError),
    /// A triple was handed out twice.
    #[error("triple {index} was already used")]
    TripleReused {
        /// The index of the triple in its batch.
        index: usize,
    },
}

/// How an [`Error`] should be presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself is invalid.
    Configuration,
    /// The parties could not complete the protocol.
    Coordination,
    /// The statistic is mathematically undefined for the data.
    UndefinedMath,
}

impl Error {
    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidAttribute(_) => ErrorClass::Configuration,
            Error::NegativeVariance(_)
            | Error::OutOfRange(_)
            | Error::DivisionByZero(_)
            | Error::EmptyDataset => ErrorClass::UndefinedMath,
            Error::PeerUnavailable { .. }
            | Error::Generation(_)
            | Error::Alignment(_)
            | Error::Local(_)
            | Error::TripleReused { .. } => ErrorClass::Coordination,
        }
    }
}

/// The phases of a statistic request.
///
/// Within a sub-protocol (a sum or a batched multiplication) the phases only move forward. A
/// request ends in exactly one of the terminal phases [`Phase::Done`] and [`Phase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// The request has been accepted.
    Init,
    /// Local shares are read and evaluated.
    GatheringLocalShares,
    /// Fresh triples are dealt.
    RequestingTriples,
    /// All parties' masks are collected.
    ExchangingMasks,
    /// The local product shares are combined.
    CombiningShares,
    /// The peers' sums or product shares are collected.
    AggregatingPeers,
    /// The statistic has been computed.
    Done,
    /// The request failed.
    Failed(String),
}

impl Phase {
    /// Returns `true` for [`Phase::Done`] and [`Phase::Failed`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed(_))
    }
}

/// Tracks the phase of a single statistic request.
#[derive(Debug)]
pub(crate) struct Run {
    request_id: Uuid,
    statistic: &'static str,
    phase: Phase,
    history: Vec<Phase>,
}

impl Run {
    pub(crate) fn new(statistic: &'static str) -> Self {
        let request_id = Uuid::new_v4();
        debug!(%request_id, statistic, "starting statistic request");
        Self {
            request_id,
            statistic,
            phase: Phase::Init,
            history: vec![Phase::Init],
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug_assert!(
            !self.phase.is_terminal(),
            "{:?} entered after terminal phase {:?}",
            phase,
            self.phase
        );
        debug_assert!(
            phase == Phase::GatheringLocalShares || phase > self.phase,
            "{:?} cannot follow {:?}",
            phase,
            self.phase
        );
        debug!(request_id = %self.request_id, from = ?self.phase, to = ?phase, "phase transition");
        self.history.push(phase.clone());
        self.phase = phase;
    }

    pub(crate) fn conclude<R>(&mut self, result: Result<R, Error>) -> Result<R, Error> {
        match &result {
            Ok(_) => {
                self.enter(Phase::Done);
                info!(
                    request_id = %self.request_id,
                    statistic = self.statistic,
                    phases = self.history.len(),
                    "statistic computed"
                );
            }
            Err(e) => {
                self.enter(Phase::Failed(e.to_string()));
                warn!(
                    request_id = %self.request_id,
                    statistic = self.statistic,
                    error = %e,
                    "statistic failed"
                );
            }
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &[Phase] {
        &self.history
    }
}

/// A statistic over one or two attributes, named as in client requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatisticRequest {
    /// The sum of an attribute.
    Sum {
        /// The attribute name.
        statistic: String,
    },
    /// The mean of an attribute.
    Mean {
        /// The attribute name.
        statistic: String,
    },
    /// The population standard deviation of an attribute.
    Stddev {
        /// The attribute name.
        statistic: String,
    },
    /// The Pearson correlation of two attributes.
    Correlation {
        /// The first attribute name.
        statistic1: String,
        /// The second attribute name.
        statistic2: String,
    },
}

/// The plaintext result of a statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatisticResult {
    /// See [`StatisticRequest::Sum`].
    Sum(i128),
    /// See [`StatisticRequest::Mean`].
    Mean(f64),
    /// See [`StatisticRequest::Stddev`].
    Stddev(f64),
    /// See [`StatisticRequest::Correlation`].
    Correlation(f64),
}

impl StatisticResult {
    /// The result as a floating point number.
    pub fn value(&self) -> f64 {
        match *self {
            StatisticResult::Sum(v) => v as f64,
            StatisticResult::Mean(v)
            | StatisticResult::Stddev(v)
            | StatisticResult::Correlation(v) => v,
        }
    }
}

/// The reconstructed sum of an attribute.
#[derive(Debug, Clone, Copy)]
struct Totals {
    total: Share,
    count: usize,
}

/// Drives the statistic protocols on behalf of the local party.
#[derive(Debug)]
pub struct Orchestrator<S, P, T> {
    party: Arc<Party<S>>,
    peers: P,
    triples: T,
}

impl<S: ShareStore, P: PeerClient, T: TripleSource> Orchestrator<S, P, T> {
    /// Creates an orchestrator for `party`, reaching the other parties through `peers`.
    pub fn new(party: Arc<Party<S>>, peers: P, triples: T) -> Self {
        Self {
            party,
            peers,
            triples,
        }
    }

    /// The local party.
    pub fn party(&self) -> &Party<S> {
        &self.party
    }

    fn ring(&self) -> Ring {
        self.party.ring()
    }

    /// Computes a statistic given by attribute names.
    ///
    /// Attribute names are validated before any protocol work begins.
    pub async fn compute(&self, req: StatisticRequest) -> Result<StatisticResult, Error> {
        match req {
            StatisticRequest::Sum { statistic } => {
                let attribute = statistic.parse()?;
                Ok(StatisticResult::Sum(self.compute_sum(attribute).await?))
            }
            StatisticRequest::Mean { statistic } => {
                let attribute = statistic.parse()?;
                Ok(StatisticResult::Mean(self.compute_mean(attribute).await?))
            }
            StatisticRequest::Stddev { statistic } => {
                let attribute = statistic.parse()?;
                Ok(StatisticResult::Stddev(self.compute_stddev(attribute).await?))
            }
            StatisticRequest::Correlation {
                statistic1,
                statistic2,
            } => {
                let x = statistic1.parse()?;
                let y = statistic2.parse()?;
                Ok(StatisticResult::Correlation(
                    self.compute_correlation(x, y).await?,
                ))
            }
        }
    }

    /// Computes the sum of an attribute over all records.
    #[instrument(level = Level::DEBUG, skip(self), fields(party = self.party.id()), err)]
    pub async fn compute_sum(&self, attribute: Attribute) -> Result<i128, Error> {
        let mut run = Run::new("sum");
        let result = self.sum(&mut run, attribute).await;
        run.conclude(result)
    }

    /// Computes the mean of an attribute over all records.
    #[instrument(level = Level::DEBUG, skip(self), fields(party = self.party.id()), err)]
    pub async fn compute_mean(&self, attribute: Attribute) -> Result<f64, Error> {
        let mut run = Run::new("mean");
        let result = self.mean(&mut run, attribute).await;
        run.conclude(result)
    }

    /// Computes the population standard deviation of an attribute.
    #[instrument(level = Level::DEBUG, skip(self), fields(party = self.party.id()), err)]
    pub async fn compute_stddev(&self, attribute: Attribute) -> Result<f64, Error> {
        let mut run = Run::new("stddev");
        let result = self.stddev(&mut run, attribute).await;
        run.conclude(result)
    }

    /// Computes the Pearson correlation of two attributes.
    #[instrument(level = Level::DEBUG, skip(self), fields(party = self.party.id()), err)]
    pub async fn compute_correlation(&self, x: Attribute, y: Attribute) -> Result<f64, Error> {
        let mut run = Run::new("correlation");
        let result = self.correlation(&mut run, x, y).await;
        run.conclude(result)
    }

    async fn sum(&self, run: &mut Run, attribute: Attribute) -> Result<i128, Error> {
        let totals = self.aggregate(run, attribute).await?;
        Ok(self.ring().decode(totals.total))
    }

    async fn mean(&self, run: &mut Run, attribute: Attribute) -> Result<f64, Error> {
        let totals = self.aggregate(run, attribute).await?;
        if totals.count == 0 {
            return Err(Error::EmptyDataset);
        }
        Ok(self.ring().decode(totals.total) as f64 / totals.count as f64)
    }

    async fn stddev(&self, run: &mut Run, attribute: Attribute) -> Result<f64, Error> {
        let totals = self.aggregate(run, attribute).await?;
        if totals.count == 0 {
            return Err(Error::EmptyDataset);
        }
        self.deviation(run, attribute, totals).await
    }

    async fn correlation(
        &self,
        run: &mut Run,
        x: Attribute,
        y: Attribute,
    ) -> Result<f64, Error> {
        let totals_x = self.aggregate(run, x).await?;
        let totals_y = self.aggregate(run, y).await?;
        check_len("second attribute", totals_x.count, totals_y.count)?;
        let n = totals_x.count;
        if n == 0 {
            return Err(Error::EmptyDataset);
        }
        let sd_x = self.deviation(run, x, totals_x).await?;
        if sd_x == 0.0 {
            return Err(Error::DivisionByZero(x));
        }
        let sd_y = self.deviation(run, y, totals_y).await?;
        if sd_y == 0.0 {
            return Err(Error::DivisionByZero(y));
        }
        let dot = self.secure_product(run, x, y, n).await?;

        let ring = self.ring();
        let n = n as f64;
        let dot = ring.decode(dot) as f64;
        let sum_x = ring.decode(totals_x.total) as f64;
        let sum_y = ring.decode(totals_y.total) as f64;
        let (mean_x, mean_y) = (sum_x / n, sum_y / n);
        let covariance = dot - mean_y * sum_x - mean_x * sum_y + n * mean_x * mean_y;
        Ok(covariance / (sd_x * sd_y * n))
    }

    /// Computes the standard deviation from the already reconstructed totals.
    ///
    /// Only the sum of squares `Σv²` is computed under sharing. The remaining
    /// `n·Σv² - (Σv)² = n²·Σ(v - mean)²` is evaluated exactly on the revealed sums.
    async fn deviation(
        &self,
        run: &mut Run,
        attribute: Attribute,
        totals: Totals,
    ) -> Result<f64, Error> {
        let ring = self.ring();
        let squares = self.secure_product(run, attribute, attribute, totals.count).await?;
        let squares = ring.decode(squares);
        let total = ring.decode(totals.total);
        let n = totals.count as i128;
        let spread = n
            .checked_mul(squares)
            .zip(total.checked_mul(total))
            .and_then(|(scaled, total)| scaled.checked_sub(total))
            .ok_or(Error::OutOfRange(attribute))?;
        if spread < 0 {
            return Err(Error::NegativeVariance(spread));
        }
        Ok((spread as f64).sqrt() / n as f64)
    }

    /// Reconstructs the sum of an attribute from the local sum and both peers' sums.
    async fn aggregate(&self, run: &mut Run, attribute: Attribute) -> Result<Totals, Error> {
        run.enter(Phase::GatheringLocalShares);
        let (local, count) = self.party.local_sum(attribute)?;

        run.enter(Phase::AggregatingPeers);
        let [p, q] = peers_of(self.party.id());
        let req = SumRequest {
            request_id: run.request_id,
            attribute,
        };
        let (from_p, from_q) = try_join(
            call(p, self.peers.sum(p, req.clone())),
            call(q, self.peers.sum(q, req)),
        )
        .await?;
        for (party, response) in [(p, &from_p), (q, &from_q)] {
            if response.count != count {
                return Err(AlignmentError::Party {
                    party,
                    expected: count,
                    actual: response.count,
                }
                .into());
            }
        }
        let total = self.ring().sum([local, from_p.data, from_q.data]);
        Ok(Totals { total, count })
    }

    /// Computes the shared sum of `left·right` over all `count` records.
    ///
    /// Every record consumes one fresh triple.
    async fn secure_product(
        &self,
        run: &mut Run,
        left: Attribute,
        right: Attribute,
        count: usize,
    ) -> Result<Share, Error> {
        let me = self.party.id();
        let [p, q] = peers_of(me);
        let request_id = run.request_id;
        let multiplier = Multiplier::new(self.ring());

        run.enter(Phase::GatheringLocalShares);
        let (xs, ys) = self.party.operands(left, right)?;
        check_len("left operand", count, xs.len())?;

        run.enter(Phase::RequestingTriples);
        let (mut batch, mut sealed) = self.triples.generate(count)?.into_parts();
        check_len("dealt triples", count, batch.len())?;
        let own = (0..count)
            .map(|index| batch.take(index).ok_or(Error::TripleReused { index }))
            .collect::<Result<Vec<TripleShare>, _>>()?;
        let sealed_p = take_sealed(&mut sealed, p, count)?;
        let sealed_q = take_sealed(&mut sealed, q, count)?;
        debug!(%request_id, records = count, "dealt triples");

        run.enter(Phase::ExchangingMasks);
        let a: Vec<Share> = own.iter().map(|t| t.a).collect();
        let b: Vec<Share> = own.iter().map(|t| t.b).collect();
        let own_masks = multiplier.mask_batch(&xs, &ys, &a, &b)?;
        let mask_request = |shares: &[SealedTripleShare]| MaskRequest {
            request_id,
            left,
            right,
            a_shares: shares.iter().map(|t| t.a.clone()).collect(),
            b_shares: shares.iter().map(|t| t.b.clone()).collect(),
        };
        let (masks_p, masks_q) = try_join(
            call(p, self.peers.beaver_mask(p, mask_request(&sealed_p))),
            call(q, self.peers.beaver_mask(q, mask_request(&sealed_q))),
        )
        .await?;
        let mut masks: [Vec<MaskedPair>; PARTIES] = Default::default();
        masks[me] = own_masks;
        masks[p] = masks_p.into_pairs(p)?;
        masks[q] = masks_q.into_pairs(q)?;
        let opened = OpenedMasks::collect(masks.each_ref().map(Vec::as_slice), count)?;

        run.enter(Phase::CombiningShares);
        let c: Vec<Share> = own.iter().map(|t| t.c).collect();
        let z = multiplier.combine_sum(&xs, &ys, &c, &opened, true)?;

        run.enter(Phase::AggregatingPeers);
        let (d_shares, e_shares) = opened.to_wire();
        let compute_request = |shares: &[SealedTripleShare]| ComputeRequest {
            request_id,
            designated: me,
            left,
            right,
            c_shares: shares.iter().map(|t| t.c.clone()).collect(),
            d_shares: d_shares.clone(),
            e_shares: e_shares.clone(),
        };
        let (z_p, z_q) = try_join(
            call(p, self.peers.beaver_compute(p, compute_request(&sealed_p))),
            call(q, self.peers.beaver_compute(q, compute_request(&sealed_q))),
        )
        .await?;
        Ok(self.ring().sum([z, z_p.data, z_q.data]))
    }
}

fn take_sealed(
    sealed: &mut Vec<(PartyId, Vec<SealedTripleShare>)>,
    party: PartyId,
    count: usize,
) -> Result<Vec<SealedTripleShare>, Error> {
    let index = sealed
        .iter()
        .position(|(p, _)| *p == party)
        .ok_or(GenerationError::MissingPeer(party))?;
    let (_, shares) = sealed.swap_remove(index);
    check_len("sealed triples", count, shares.len())?;
    Ok(shares)
}

async fn call<R, E>(
    party: PartyId,
    response: impl Future<Output = Result<R, E>>,
) -> Result<R, Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    response.await.map_err(|e| {
        warn!(party, error = %e, "peer call failed");
        Error::PeerUnavailable {
            party,
            source: Box::new(e),
        }
    })
}

/// Sets up three parties in the same process and returns the orchestrator of `leader`.
///
/// Key pairs are generated freshly. The peers are reached through [`LocalPeers`].
pub fn simulate<S: ShareStore>(
    ring: Ring,
    stores: [S; PARTIES],
    leader: PartyId,
) -> Result<Orchestrator<S, LocalPeers<S>, TripleDealer>, Error> {
    let mut rng = rand::rng();
    let keys: [SecretKey; PARTIES] = std::array::from_fn(|_| SecretKey::generate(&mut rng));
    let public_keys = std::array::from_fn(|i| keys[i].public_key());
    let parties = stores
        .into_iter()
        .zip(keys)
        .enumerate()
        .map(|(id, (store, key))| Party::new(id, ring, key, store).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;
    let party = parties
        .get(leader)
        .cloned()
        .ok_or(PartyError::UnknownParty(leader))?;
    let dealer = TripleDealer::new(ring, leader, public_keys);
    Ok(Orchestrator::new(party, LocalPeers::new(parties), dealer))
}
