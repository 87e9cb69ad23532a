//! Private aggregate statistics over data that is additively secret-shared between three parties.
//!
//! Every record of a dataset is split into three additive shares, one held by each party. No
//! party ever reconstructs a raw value; only the final aggregate is revealed. The parties are
//! assumed to be semi-honest and not to collude.
//!
//! ## Main Components
//!
//! * [`domain`]: arithmetic over the shared [`domain::Ring`], injected into every component.
//! * [`triples`]: a [`triples::TripleSource`] dealing Beaver triples, with the peers' shares
//!   sealed under their public keys (see [`seal`]).
//! * [`beaver`]: the masking and combining rounds of a Beaver multiplication.
//! * [`party`]: a single party, answering the requests of the orchestrating party from its
//!   [`store::ShareStore`].
//! * [`peer`]: the wire messages and the [`peer::PeerClient`] used to reach the other parties.
//! * [`protocol`]: the [`protocol::Orchestrator`] computing sum, mean, standard deviation and
//!   Pearson correlation.
//!
//! Any of the three parties can act as the orchestrator. It deals the triples for the current
//! request and acts as the designated party of every multiplication.
//!
//! ## Example
//!
//! ```
//! use rand::rng;
//! use tristat::{
//!     attribute::Attribute,
//!     domain::Ring,
//!     protocol::simulate,
//!     store::{Record, share_records},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ring = Ring::Prime { modulus: 2_305_843_009_213_693_951 };
//! let records: Vec<Record<i64>> = [10, 20, 30]
//!     .into_iter()
//!     .map(|gpa| Record::from([(Attribute::Gpa, gpa)]))
//!     .collect();
//! let stores = share_records(ring, &records, &mut rng());
//!
//! let orchestrator = simulate(ring, stores, 0)?;
//! assert_eq!(orchestrator.compute_mean(Attribute::Gpa).await?, 20.0);
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod attribute;
pub mod beaver;
pub mod domain;
pub mod party;
pub mod peer;
pub mod protocol;
pub mod seal;
pub mod store;
pub mod triples;

/// The number of parties, which is fixed.
pub const PARTIES: usize = 3;

/// The index of a party, in `0..PARTIES`.
pub type PartyId = usize;

/// The two parties other than `party`, in ascending order.
///
/// Party indices are validated on construction, so anything above `1` is treated as party `2`.
pub fn peers_of(party: PartyId) -> [PartyId; 2] {
    match party {
        0 => [1, 2],
        1 => [0, 2],
        _ => [0, 1],
    }
}
