//! The messages exchanged between parties and the client used to send them.
//!
//! Every party exposes the same three endpoints (`sum`, `beaver_mask`, `beaver_compute`), so the
//! orchestrating party talks to both of its peers through a single [`PeerClient`].

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    PartyId,
    attribute::Attribute,
    beaver::{AlignmentError, MaskedPair},
    domain::Share,
    party::{Party, PartyError},
    seal::Sealed,
    store::ShareStore,
};

/// Asks a party for the sum of its local shares of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumRequest {
    /// Identifies the statistic request in logs.
    pub request_id: Uuid,
    /// The attribute to sum.
    pub attribute: Attribute,
}

/// A party's local sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumResponse {
    /// The sum of the party's shares.
    pub data: Share,
    /// The number of records the sum covers.
    pub count: usize,
}

/// Asks a party to mask its shares of two attributes with its (sealed) triple shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRequest {
    /// Identifies the statistic request in logs.
    pub request_id: Uuid,
    /// The attribute used as left multiplicand.
    pub left: Attribute,
    /// The attribute used as right multiplicand.
    pub right: Attribute,
    /// Sealed shares of `a`, one per record.
    pub a_shares: Vec<Sealed>,
    /// Sealed shares of `b`, one per record.
    pub b_shares: Vec<Sealed>,
}

/// A party's masked contributions `d_i` and `e_i`, one per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskResponse {
    /// `x_i - a_i` per record.
    pub d_shares: Vec<Share>,
    /// `y_i - b_i` per record.
    pub e_shares: Vec<Share>,
}

/// Asks a party to combine the opened masks into its share of the summed products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequest {
    /// Identifies the statistic request in logs.
    pub request_id: Uuid,
    /// The party that applies the `d·e` correction.
    pub designated: PartyId,
    /// The attribute used as left multiplicand.
    pub left: Attribute,
    /// The attribute used as right multiplicand.
    pub right: Attribute,
    /// Sealed shares of `c`, one per record.
    pub c_shares: Vec<Sealed>,
    /// All parties' `d` contributions, one inner vector (indexed by party) per record.
    pub d_shares: Vec<Vec<Share>>,
    /// All parties' `e` contributions, one inner vector (indexed by party) per record.
    pub e_shares: Vec<Vec<Share>>,
}

/// A party's share of the summed products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResponse {
    /// The local sum of the party's product shares.
    pub data: Share,
}

impl MaskResponse {
    /// Pairs up the contributions of `party`, rejecting responses of unequal length.
    pub fn into_pairs(self, party: PartyId) -> Result<Vec<MaskedPair>, AlignmentError> {
        if self.d_shares.len() != self.e_shares.len() {
            return Err(AlignmentError::Party {
                party,
                expected: self.d_shares.len(),
                actual: self.e_shares.len(),
            });
        }
        Ok(self
            .d_shares
            .into_iter()
            .zip(self.e_shares)
            .map(|(d, e)| MaskedPair { d, e })
            .collect())
    }
}

impl From<Vec<MaskedPair>> for MaskResponse {
    fn from(pairs: Vec<MaskedPair>) -> Self {
        let (d_shares, e_shares) = pairs.into_iter().map(|p| (p.d, p.e)).unzip();
        Self { d_shares, e_shares }
    }
}

/// A client for the endpoints of the other parties.
///
/// Implementations are responsible for transport concerns such as timeouts and retries. A call
/// either succeeds with a typed response or fails; the protocol never retries on its own.
pub trait PeerClient: Send + Sync {
    /// The error returned if a call does not succeed.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Requests the local sum of party `to`.
    fn sum(
        &self,
        to: PartyId,
        req: SumRequest,
    ) -> impl Future<Output = Result<SumResponse, Self::Error>> + Send;

    /// Requests the masked contributions of party `to`.
    fn beaver_mask(
        &self,
        to: PartyId,
        req: MaskRequest,
    ) -> impl Future<Output = Result<MaskResponse, Self::Error>> + Send;

    /// Requests the combined product share of party `to`.
    fn beaver_compute(
        &self,
        to: PartyId,
        req: ComputeRequest,
    ) -> impl Future<Output = Result<ComputeResponse, Self::Error>> + Send;
}

/// A [`PeerClient`] that calls parties living in the same process.
#[derive(Debug)]
pub struct LocalPeers<S> {
    parties: Vec<Arc<Party<S>>>,
}

impl<S> Clone for LocalPeers<S> {
    fn clone(&self) -> Self {
        Self {
            parties: self.parties.clone(),
        }
    }
}

impl<S: ShareStore> LocalPeers<S> {
    /// Creates a client for the given parties, which may include the caller itself.
    pub fn new(parties: impl IntoIterator<Item = Arc<Party<S>>>) -> Self {
        Self {
            parties: parties.into_iter().collect(),
        }
    }

    fn party(&self, id: PartyId) -> Result<&Party<S>, PartyError> {
        self.parties
            .iter()
            .find(|p| p.id() == id)
            .map(Arc::as_ref)
            .ok_or(PartyError::UnknownParty(id))
    }
}

impl<S: ShareStore> PeerClient for LocalPeers<S> {
    type Error = PartyError;

    async fn sum(&self, to: PartyId, req: SumRequest) -> Result<SumResponse, PartyError> {
        self.party(to)?.handle_sum(req)
    }

    async fn beaver_mask(&self, to: PartyId, req: MaskRequest) -> Result<MaskResponse, PartyError> {
        self.party(to)?.handle_beaver_mask(req)
    }

    async fn beaver_compute(
        &self,
        to: PartyId,
        req: ComputeRequest,
    ) -> Result<ComputeResponse, PartyError> {
        self.party(to)?.handle_beaver_compute(req)
    }
}
