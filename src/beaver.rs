//! Secure multiplication of secret-shared values using Beaver triples.
//!
//! To multiply `x` and `y`, every party `i` masks its shares with its triple shares and reveals
//! `d_i = x_i - a_i` and `e_i = y_i - b_i`. Once all contributions are known, `d = x - a` and
//! `e = y - b` are public and every party computes its share of the product as
//!
//! ```text
//! z_i = c_i + d·y_i + e·x_i - [i is designated]·d·e
//! ```
//!
//! The cross term `d·e` is subtracted by exactly one designated party, so that `Σ z_i = x·y`.
//! All functions here are pure; collecting the contributions of the other parties is the job of
//! the orchestrator.

use serde::{Deserialize, Serialize};

use crate::{
    PARTIES, PartyId,
    domain::{Ring, Share},
};

/// The masked values `(d_i, e_i)` a party reveals for a single multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedPair {
    /// `x_i - a_i`
    pub d: Share,
    /// `y_i - b_i`
    pub e: Share,
}

/// The contributions of all parties for a batch of multiplications, one entry per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenedMasks {
    /// `d` contributions per record, indexed by party.
    pub d: Vec<[Share; PARTIES]>,
    /// `e` contributions per record, indexed by party.
    pub e: Vec<[Share; PARTIES]>,
}

/// Batches that need to line up record by record did not.
///
/// Misaligned batches would silently corrupt the product, so they are always rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    /// A party contributed a batch of the wrong length.
    #[error("party {party} contributed {actual} entries, expected {expected}")]
    Party {
        /// The party whose batch was misaligned.
        party: PartyId,
        /// The number of local records.
        expected: usize,
        /// The number of entries received.
        actual: usize,
    },
    /// A record did not receive exactly one contribution per party.
    #[error("record {record} has {actual} contributions, expected {PARTIES}")]
    Contributions {
        /// The index of the record.
        record: usize,
        /// The number of contributions received.
        actual: usize,
    },
    /// Two local inputs that must have the same length did not.
    #[error("{what} has {actual} entries, expected {expected}")]
    Length {
        /// The input that was misaligned.
        what: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
    },
}

/// Checks that `actual` entries of `what` line up with `expected` records.
pub(crate) fn check_len(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), AlignmentError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AlignmentError::Length {
            what,
            expected,
            actual,
        })
    }
}

/// Computes Beaver multiplications over a fixed ring.
#[derive(Debug, Clone, Copy)]
pub struct Multiplier {
    ring: Ring,
}

impl Multiplier {
    /// Creates a multiplier for the given ring.
    pub fn new(ring: Ring) -> Self {
        Self { ring }
    }

    /// The first round: masks this party's operand shares with its triple shares.
    pub fn mask(&self, x: Share, y: Share, a: Share, b: Share) -> MaskedPair {
        MaskedPair {
            d: self.ring.sub(x, a),
            e: self.ring.sub(y, b),
        }
    }

    /// The second round: computes this party's share of `x·y` from all parties' masks.
    ///
    /// Exactly one party must call this with `designated = true`.
    pub fn combine(
        &self,
        d_all: [Share; PARTIES],
        e_all: [Share; PARTIES],
        c: Share,
        x: Share,
        y: Share,
        designated: bool,
    ) -> Share {
        let ring = &self.ring;
        let d = ring.sum(d_all);
        let e = ring.sum(e_all);
        let z = ring.add(c, ring.add(ring.mul(d, y), ring.mul(e, x)));
        if designated {
            ring.sub(z, ring.mul(d, e))
        } else {
            z
        }
    }

    /// Masks a whole batch, one triple per record.
    pub fn mask_batch(
        &self,
        xs: &[Share],
        ys: &[Share],
        a: &[Share],
        b: &[Share],
    ) -> Result<Vec<MaskedPair>, AlignmentError> {
        let n = xs.len();
        check_len("right operand", n, ys.len())?;
        check_len("a shares", n, a.len())?;
        check_len("b shares", n, b.len())?;
        Ok((0..n).map(|i| self.mask(xs[i], ys[i], a[i], b[i])).collect())
    }

    /// Combines a whole batch and sums the resulting product shares locally.
    pub fn combine_sum(
        &self,
        xs: &[Share],
        ys: &[Share],
        c: &[Share],
        opened: &OpenedMasks,
        designated: bool,
    ) -> Result<Share, AlignmentError> {
        let n = xs.len();
        check_len("right operand", n, ys.len())?;
        check_len("c shares", n, c.len())?;
        check_len("d shares", n, opened.d.len())?;
        check_len("e shares", n, opened.e.len())?;
        let products = (0..n).map(|i| {
            self.combine(opened.d[i], opened.e[i], c[i], xs[i], ys[i], designated)
        });
        Ok(self.ring.sum(products))
    }
}

impl OpenedMasks {
    /// Collects the masks of all parties, indexed by party, into per-record contributions.
    pub fn collect(
        masks: [&[MaskedPair]; PARTIES],
        records: usize,
    ) -> Result<Self, AlignmentError> {
        for (party, batch) in masks.iter().enumerate() {
            if batch.len() != records {
                return Err(AlignmentError::Party {
                    party,
                    expected: records,
                    actual: batch.len(),
                });
            }
        }
        let d = (0..records)
            .map(|r| std::array::from_fn(|p| masks[p][r].d))
            .collect();
        let e = (0..records)
            .map(|r| std::array::from_fn(|p| masks[p][r].e))
            .collect();
        Ok(Self { d, e })
    }

    /// Converts the wire representation (one inner vector per record) into contributions.
    pub fn from_wire(d: Vec<Vec<Share>>, e: Vec<Vec<Share>>) -> Result<Self, AlignmentError> {
        check_len("e shares", d.len(), e.len())?;
        let per_record = |contributions: Vec<Vec<Share>>| {
            contributions
                .into_iter()
                .enumerate()
                .map(|(record, c)| {
                    let actual = c.len();
                    <[Share; PARTIES]>::try_from(c)
                        .map_err(|_| AlignmentError::Contributions { record, actual })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            d: per_record(d)?,
            e: per_record(e)?,
        })
    }

    /// Converts the contributions into their wire representation.
    pub fn to_wire(&self) -> (Vec<Vec<Share>>, Vec<Vec<Share>>) {
        (
            self.d.iter().map(|c| c.to_vec()).collect(),
            self.e.iter().map(|c| c.to_vec()).collect(),
        )
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.d.len()
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    const P: u64 = 2_305_843_009_213_693_951;

    /// Runs one multiplication across three simulated parties, applying the correction at the
    /// parties flagged in `designated`.
    fn multiply(
        ring: Ring,
        x: Share,
        y: Share,
        designated: [bool; PARTIES],
        rng: &mut StdRng,
    ) -> Share {
        let m = Multiplier::new(ring);
        let a = ring.random(rng);
        let b = ring.random(rng);
        let c = ring.mul(a, b);
        let (xs, ys) = (ring.split(x, rng), ring.split(y, rng));
        let (as_, bs, cs) = (ring.split(a, rng), ring.split(b, rng), ring.split(c, rng));
        let masks: [MaskedPair; PARTIES] =
            std::array::from_fn(|i| m.mask(xs[i], ys[i], as_[i], bs[i]));
        let d_all = masks.map(|p| p.d);
        let e_all = masks.map(|p| p.e);
        ring.sum((0..PARTIES).map(|i| m.combine(d_all, e_all, cs[i], xs[i], ys[i], designated[i])))
    }

    fn boundary_values(ring: Ring) -> Vec<Share> {
        let mut values = vec![Share(0), ring.encode(1), ring.encode(-1)];
        match ring {
            Ring::Wrapping => values.extend([Share(i128::MAX), Share(i128::MIN)]),
            Ring::Prime { modulus } => {
                values.extend([Share(modulus as i128 - 1), Share(modulus as i128 / 2)])
            }
        }
        values
    }

    #[test]
    fn multiplication_at_domain_boundaries() {
        let mut rng = StdRng::seed_from_u64(11);
        for ring in [Ring::Wrapping, Ring::Prime { modulus: P }] {
            let values = boundary_values(ring);
            for x in values.iter().copied() {
                for y in values.iter().copied() {
                    let z = multiply(ring, x, y, [true, false, false], &mut rng);
                    assert_eq!(z, ring.mul(x, y), "{x} * {y} in {ring:?}");
                }
            }
        }
    }

    #[test]
    fn correction_must_be_applied_exactly_once() {
        let mut rng = StdRng::seed_from_u64(12);
        let ring = Ring::Prime { modulus: P };
        let (x, y) = (ring.encode(6), ring.encode(-7));
        for _ in 0..16 {
            let once = multiply(ring, x, y, [false, true, false], &mut rng);
            assert_eq!(once, ring.encode(-42));
            // d and e are uniformly random, so d·e == 0 happens with negligible probability
            let never = multiply(ring, x, y, [false; PARTIES], &mut rng);
            assert_ne!(never, ring.encode(-42));
            let twice = multiply(ring, x, y, [true, true, false], &mut rng);
            assert_ne!(twice, ring.encode(-42));
            let always = multiply(ring, x, y, [true; PARTIES], &mut rng);
            assert_ne!(always, ring.encode(-42));
        }
    }

    #[test]
    fn collect_rejects_misaligned_party() {
        let pair = MaskedPair {
            d: Share(1),
            e: Share(2),
        };
        let full = [pair; 3];
        let short = [pair; 2];
        let err = OpenedMasks::collect([&full, &short, &full], 3).unwrap_err();
        assert_eq!(
            err,
            AlignmentError::Party {
                party: 1,
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn wire_contributions_must_be_complete() {
        let complete = vec![Share(1); PARTIES];
        let err = OpenedMasks::from_wire(
            vec![complete.clone(), complete.clone()],
            vec![complete.clone(), vec![Share(1); 2]],
        )
        .unwrap_err();
        assert_eq!(err, AlignmentError::Contributions { record: 1, actual: 2 });

        let err = OpenedMasks::from_wire(vec![complete.clone(); 2], vec![complete.clone()])
            .unwrap_err();
        assert!(matches!(err, AlignmentError::Length { what: "e shares", expected: 2, actual: 1 }));

        let opened = OpenedMasks::from_wire(vec![complete.clone()], vec![complete]).unwrap();
        assert_eq!(opened.len(), 1);
        let (d, e) = opened.to_wire();
        assert_eq!(OpenedMasks::from_wire(d, e), Ok(opened));
    }

    #[test]
    fn batches_never_truncate() {
        let m = Multiplier::new(Ring::Wrapping);
        let two = [Share(1), Share(2)];
        let one = [Share(1)];
        assert!(m.mask_batch(&two, &two, &two, &one).is_err());
        assert!(m.mask_batch(&two, &one, &two, &two).is_err());
        let opened = OpenedMasks {
            d: vec![[Share(0); PARTIES]],
            e: vec![[Share(0); PARTIES]],
        };
        assert!(m.combine_sum(&two, &two, &two, &opened, true).is_err());
    }

    proptest! {
        #[test]
        fn batched_dot_product(values in prop::collection::vec((any::<i16>(), any::<i16>()), 0..16), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let ring = Ring::Prime { modulus: P };
            let m = Multiplier::new(ring);
            let n = values.len();
            let xs: Vec<[Share; PARTIES]> = values.iter().map(|(x, _)| ring.split(ring.encode(*x as i64), &mut rng)).collect();
            let ys: Vec<[Share; PARTIES]> = values.iter().map(|(_, y)| ring.split(ring.encode(*y as i64), &mut rng)).collect();
            let triples: Vec<[[Share; PARTIES]; 3]> = (0..n).map(|_| {
                let a = ring.random(&mut rng);
                let b = ring.random(&mut rng);
                [ring.split(a, &mut rng), ring.split(b, &mut rng), ring.split(ring.mul(a, b), &mut rng)]
            }).collect();
            let column = |rows: &[[Share; PARTIES]], p: usize| rows.iter().map(|r| r[p]).collect::<Vec<_>>();
            let a_col = |p: usize| triples.iter().map(|t| t[0][p]).collect::<Vec<_>>();
            let b_col = |p: usize| triples.iter().map(|t| t[1][p]).collect::<Vec<_>>();
            let c_col = |p: usize| triples.iter().map(|t| t[2][p]).collect::<Vec<_>>();

            let masks: Vec<Vec<MaskedPair>> = (0..PARTIES)
                .map(|p| m.mask_batch(&column(&xs, p), &column(&ys, p), &a_col(p), &b_col(p)).unwrap())
                .collect();
            let opened = OpenedMasks::collect([&masks[0], &masks[1], &masks[2]], n).unwrap();
            let designated = rng.random_range(0..PARTIES);
            let total = ring.sum((0..PARTIES).map(|p| {
                m.combine_sum(&column(&xs, p), &column(&ys, p), &c_col(p), &opened, p == designated).unwrap()
            }));
            let expected: i128 = values.iter().map(|(x, y)| *x as i128 * *y as i128).sum();
            prop_assert_eq!(ring.decode(total), expected);
        }

        #[test]
        fn multiplication_is_correct(x in any::<i64>(), y in any::<i64>(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            for ring in [Ring::Wrapping, Ring::Prime { modulus: P }] {
                let (x, y) = (ring.encode(x), ring.encode(y));
                prop_assert_eq!(multiply(ring, x, y, [false, false, true], &mut rng), ring.mul(x, y));
            }
        }
    }
}
