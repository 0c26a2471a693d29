//! Stores the values opened during a session along with their macs, until a
//! mac check verifies them

use ark_ff::PrimeField;
use tracing::log;

use crate::algebra::{Scalar, ScalarShare};

/// The backlog of opened values awaiting a mac check
///
/// Every value opened within a session must pass through the store, and the
/// store must be empty when the session ends
#[derive(Debug, Default)]
pub struct OpenedValueStore<F: PrimeField> {
    /// The local shares, with macs, of the opened values
    shares: Vec<ScalarShare<F>>,
    /// The opened values
    values: Vec<Scalar<F>>,
}

impl<F: PrimeField> OpenedValueStore<F> {
    /// Constructor
    pub fn new() -> Self {
        Self { shares: Vec::new(), values: Vec::new() }
    }

    /// Record a value that was just opened alongside the local share it was
    /// opened from
    pub fn push_opened_value(&mut self, share: ScalarShare<F>, value: Scalar<F>) {
        self.shares.push(share);
        self.values.push(value);
    }

    /// Record a batch of opened values
    pub fn push_opened_values(&mut self, shares: Vec<ScalarShare<F>>, values: Vec<Scalar<F>>) {
        assert_eq!(shares.len(), values.len(), "every opened value needs a share");
        self.shares.extend(shares);
        self.values.extend(values);
    }

    /// Take every value that has not yet been checked, leaving the store
    /// empty
    pub fn pop_values(&mut self) -> (Vec<ScalarShare<F>>, Vec<Scalar<F>>) {
        (std::mem::take(&mut self.shares), std::mem::take(&mut self.values))
    }

    /// Whether there are unchecked values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The number of unchecked values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store has reached the given threshold, a threshold of
    /// zero is never reached
    pub fn exceeds_threshold(&self, threshold: usize) -> bool {
        threshold > 0 && self.len() >= threshold
    }

    /// Discard every unchecked value, used when a session aborts
    pub(crate) fn discard(&mut self) {
        if !self.is_empty() {
            log::warn!("discarding {} unchecked opened values", self.len());
        }

        self.shares.clear();
        self.values.clear();
    }
}

impl<F: PrimeField> Drop for OpenedValueStore<F> {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::error!("opened value store dropped with {} unchecked values", self.len());
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        algebra::ScalarShare,
        test_helpers::{TestField, TestScalar},
    };

    use super::OpenedValueStore;

    /// Tests that popping drains the store in push order
    #[test]
    fn test_push_pop() {
        let mut store = OpenedValueStore::<TestField>::new();
        assert!(store.is_empty());

        let share = ScalarShare::new(TestScalar::from(1u8), TestScalar::from(2u8));
        store.push_opened_value(share, TestScalar::from(3u8));
        store.push_opened_values(vec![share, share], vec![TestScalar::from(4u8); 2]);
        assert_eq!(store.len(), 3);
        assert!(store.exceeds_threshold(3));
        assert!(!store.exceeds_threshold(4));
        assert!(!store.exceeds_threshold(0));

        let (shares, values) = store.pop_values();
        assert_eq!(shares.len(), 3);
        assert_eq!(values[0], TestScalar::from(3u8));
        assert!(store.is_empty());
    }
}
