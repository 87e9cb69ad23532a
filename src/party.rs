//! A single party: its local shares, its secret key and the handlers for peer requests.
//!
//! Parties are stateless between requests. Every request names the attributes it needs, so a
//! party re-reads its inputs from its own store and opens its sealed triple shares on demand.

use serde::de::DeserializeOwned;
use tracing::{Level, debug, instrument};

use crate::{
    PARTIES, PartyId,
    attribute::Attribute,
    beaver::{AlignmentError, Multiplier, OpenedMasks},
    domain::{DomainError, Ring, Share},
    peer::{
        ComputeRequest, ComputeResponse, MaskRequest, MaskResponse, SumRequest, SumResponse,
    },
    seal::{PublicKey, SealError, Sealed, SecretKey},
    store::{ShareStore, StoreError},
};

/// Errors that can occur while a party handles a request.
#[derive(Debug, thiserror::Error)]
pub enum PartyError {
    /// The party index is not one of the three parties.
    #[error("party {0} does not exist")]
    UnknownParty(PartyId),
    /// The ring configuration is invalid.
    #[error("invalid ring configuration")]
    Domain(#[from] DomainError),
    /// The local shares could not be read.
    #[error("unable to read local shares")]
    Store(#[from] StoreError),
    /// A sealed triple share could not be opened.
    #[error("unable to open sealed triple share")]
    Seal(#[from] SealError),
    /// The request does not line up with the local records.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
}

/// One of the three parties, holding shares of every record.
#[derive(Debug)]
pub struct Party<S> {
    id: PartyId,
    ring: Ring,
    secret_key: SecretKey,
    store: S,
}

impl<S: ShareStore> Party<S> {
    /// Creates party `id`, rejecting unknown indices and invalid rings.
    pub fn new(
        id: PartyId,
        ring: Ring,
        secret_key: SecretKey,
        store: S,
    ) -> Result<Self, PartyError> {
        if id >= PARTIES {
            return Err(PartyError::UnknownParty(id));
        }
        ring.validate()?;
        Ok(Self {
            id,
            ring,
            secret_key,
            store,
        })
    }

    /// The index of this party.
    pub fn id(&self) -> PartyId {
        self.id
    }

    /// The ring all shares live in.
    pub fn ring(&self) -> Ring {
        self.ring
    }

    /// The key peers use to seal triple shares for this party.
    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    /// Sums the local shares of `attribute`, returning the sum and the number of records.
    pub fn local_sum(&self, attribute: Attribute) -> Result<(Share, usize), PartyError> {
        let shares = self.store.stream_shares(attribute)?;
        Ok((self.ring.sum(shares.iter().copied()), shares.len()))
    }

    /// Reads the local shares of both multiplicands.
    pub(crate) fn operands(
        &self,
        left: Attribute,
        right: Attribute,
    ) -> Result<(Vec<Share>, Vec<Share>), PartyError> {
        Ok((
            self.store.stream_shares(left)?,
            self.store.stream_shares(right)?,
        ))
    }

    fn open_all<T: DeserializeOwned>(&self, sealed: &[Sealed]) -> Result<Vec<T>, PartyError> {
        sealed
            .iter()
            .map(|s| self.secret_key.open(s).map_err(PartyError::from))
            .collect()
    }

    /// Handles a request for the local sum of an attribute.
    #[instrument(
        level = Level::DEBUG,
        skip_all,
        fields(party = self.id, request_id = %req.request_id),
        err
    )]
    pub fn handle_sum(&self, req: SumRequest) -> Result<SumResponse, PartyError> {
        let (data, count) = self.local_sum(req.attribute)?;
        debug!(attribute = %req.attribute, count, "summed local shares");
        Ok(SumResponse { data, count })
    }

    /// Handles the masking round of a batched multiplication.
    #[instrument(
        level = Level::DEBUG,
        skip_all,
        fields(party = self.id, request_id = %req.request_id),
        err
    )]
    pub fn handle_beaver_mask(&self, req: MaskRequest) -> Result<MaskResponse, PartyError> {
        let (xs, ys) = self.operands(req.left, req.right)?;
        let a: Vec<Share> = self.open_all(&req.a_shares)?;
        let b: Vec<Share> = self.open_all(&req.b_shares)?;
        let masks = Multiplier::new(self.ring).mask_batch(&xs, &ys, &a, &b)?;
        debug!(records = masks.len(), "masked operands");
        Ok(masks.into())
    }

    /// Handles the combining round of a batched multiplication.
    #[instrument(
        level = Level::DEBUG,
        skip_all,
        fields(party = self.id, request_id = %req.request_id),
        err
    )]
    pub fn handle_beaver_compute(
        &self,
        req: ComputeRequest,
    ) -> Result<ComputeResponse, PartyError> {
        if req.designated >= PARTIES {
            return Err(PartyError::UnknownParty(req.designated));
        }
        let (xs, ys) = self.operands(req.left, req.right)?;
        let c: Vec<Share> = self.open_all(&req.c_shares)?;
        let opened = OpenedMasks::from_wire(req.d_shares, req.e_shares)?;
        let data = Multiplier::new(self.ring).combine_sum(
            &xs,
            &ys,
            &c,
            &opened,
            self.id == req.designated,
        )?;
        debug!(records = opened.len(), "combined product shares");
        Ok(ComputeResponse { data })
    }
}
