//! The SPDZ authenticated arithmetic suite
//!
//! Every value is held as an additive share alongside an additive share of
//! its mac under the session's global mac key. Linear operations are local;
//! multiplication consumes a Beaver triple and opens two masked values.
//! Opened values are buffered in the [`OpenedValueStore`] and verified in
//! batches by a [`MacCheckGate`]

mod gates;
mod mac_check;
mod opened_values;

pub use gates::{InputGate, MulGate, OpenGate, OutputGate};
pub use mac_check::{linear_combination, mac_check_share, MacCheckGate};
pub use opened_values::OpenedValueStore;

use ark_ff::PrimeField;
use itertools::Itertools;

use crate::{
    algebra::{Scalar, ScalarShare},
    error::MpcError,
    fabric::{Deferred, LocalGate, MpcFabric, ProtocolBuilder, ResultHandle},
    network::PartyId,
};

/// A handle to an authenticated share of a secret value
pub type AuthenticatedScalar<F> = ResultHandle<ScalarShare<F>>;
/// A handle to a public or opened value
pub type OpenedScalar<F> = ResultHandle<Scalar<F>>;

/// Box a set of handles as type erased dependencies
macro_rules! deps {
    ($($dep:expr),*) => {
        vec![$(Box::new($dep.clone()) as Box<dyn Deferred>),*]
    };
}

/// The numeric operations of the suite, appending to the builder they were
/// taken from
pub struct SpdzNumeric<'a, F: PrimeField> {
    /// The builder operations append to
    builder: &'a mut ProtocolBuilder<F>,
}

impl<'a, F: PrimeField> SpdzNumeric<'a, F> {
    /// Constructor
    pub(crate) fn new(builder: &'a mut ProtocolBuilder<F>) -> Self {
        Self { builder }
    }

    /// The session's fabric
    fn fabric(&self) -> MpcFabric<F> {
        self.builder.fabric().clone()
    }

    /// Append a local gate over two shares
    fn binary_op<G>(
        &mut self,
        name: &'static str,
        a: &AuthenticatedScalar<F>,
        b: &AuthenticatedScalar<F>,
        op: G,
    ) -> AuthenticatedScalar<F>
    where
        G: 'static + Send + FnOnce(ScalarShare<F>, ScalarShare<F>) -> ScalarShare<F>,
    {
        let output = self.builder.allocate();
        let (a, b) = (a.clone(), b.clone());
        let gate = LocalGate::new(name, deps!(a, b), output.clone(), move |_ctx| {
            Ok(op(a.resolved_value()?, b.resolved_value()?))
        });

        self.builder.append(gate);
        output
    }

    /// Append a local gate over a share and a public value
    fn public_op<G>(
        &mut self,
        name: &'static str,
        a: &AuthenticatedScalar<F>,
        public: &OpenedScalar<F>,
        op: G,
    ) -> AuthenticatedScalar<F>
    where
        G: 'static
            + Send
            + FnOnce(ScalarShare<F>, Scalar<F>, Scalar<F>, PartyId) -> ScalarShare<F>,
    {
        let output = self.builder.allocate();
        let (a, public) = (a.clone(), public.clone());
        let gate = LocalGate::new(name, deps!(a, public), output.clone(), move |ctx| {
            let (mac_key, party_id) = (ctx.mac_key_share(), ctx.party_id());
            Ok(op(a.resolved_value()?, public.resolved_value()?, mac_key, party_id))
        });

        self.builder.append(gate);
        output
    }

    // -----------
    // | Sharing |
    // -----------

    /// An authenticated sharing of a public constant, available immediately
    pub fn known(&mut self, value: Scalar<F>) -> AuthenticatedScalar<F> {
        let fabric = self.fabric();
        let share = ScalarShare::from_public(value, fabric.mac_key_share(), fabric.party_id());
        self.builder.constant(share)
    }

    /// Secret share a value held by the given party
    ///
    /// Only the input party provides the value, every other party passes
    /// `None`
    pub fn input(&mut self, value: Option<Scalar<F>>, party: PartyId) -> AuthenticatedScalar<F> {
        let output = self.builder.allocate();
        let n_parties = self.builder.n_parties();

        if party as usize >= n_parties {
            self.builder.record_error(MpcError::Construction(format!(
                "input by party {party} in a session of {n_parties}"
            )));
        } else if party == self.builder.party_id() && value.is_none() {
            self.builder.record_error(MpcError::Construction(format!(
                "party {party} inputs without a value"
            )));
        }

        self.builder.append(InputGate::new(party, value, n_parties, output.clone()));
        output
    }

    /// Fetch a shared random bit
    pub fn random_bit(&mut self) -> AuthenticatedScalar<F> {
        let output = self.builder.allocate();
        let gate = LocalGate::new("random-bit", deps!(), output.clone(), |ctx| {
            ctx.supplier().next_random_bit()
        });

        self.builder.append(gate);
        output
    }

    /// Fetch a shared random non-zero element
    pub fn random_element(&mut self) -> AuthenticatedScalar<F> {
        let output = self.builder.allocate();
        let gate = LocalGate::new("random-element", deps!(), output.clone(), |ctx| {
            ctx.supplier().next_random_element()
        });

        self.builder.append(gate);
        output
    }

    /// Fetch an exponentiation pipe, shares of `r^-1, r, r^2, ..., r^l`
    pub fn exp_pipe(&mut self) -> ResultHandle<Vec<ScalarShare<F>>> {
        let output = self.builder.allocate();
        let gate = LocalGate::new("exp-pipe", deps!(), output.clone(), |ctx| {
            ctx.supplier().next_exp_pipe()
        });

        self.builder.append(gate);
        output
    }

    // -----------------------
    // | Linear Combinations |
    // -----------------------

    /// Add two shared values
    pub fn add(
        &mut self,
        a: &AuthenticatedScalar<F>,
        b: &AuthenticatedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.binary_op("add", a, b, |a, b| a + b)
    }

    /// Subtract two shared values
    pub fn sub(
        &mut self,
        a: &AuthenticatedScalar<F>,
        b: &AuthenticatedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.binary_op("sub", a, b, |a, b| a - b)
    }

    /// Negate a shared value
    pub fn neg(&mut self, a: &AuthenticatedScalar<F>) -> AuthenticatedScalar<F> {
        let output = self.builder.allocate();
        let a = a.clone();
        let gate =
            LocalGate::new("neg", deps!(a), output.clone(), move |_ctx| Ok(-a.resolved_value()?));

        self.builder.append(gate);
        output
    }

    /// Add a public value to a shared value
    pub fn add_public(
        &mut self,
        a: &AuthenticatedScalar<F>,
        public: &OpenedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.public_op("add-public", a, public, |a, c, key, party| a.add_public(c, key, party))
    }

    /// Subtract a public value from a shared value
    pub fn sub_public(
        &mut self,
        a: &AuthenticatedScalar<F>,
        public: &OpenedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.public_op("sub-public", a, public, |a, c, key, party| a.sub_public(c, key, party))
    }

    /// Subtract a shared value from a public value
    pub fn public_sub(
        &mut self,
        public: &OpenedScalar<F>,
        a: &AuthenticatedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.public_op("public-sub", a, public, |a, c, key, party| (-a).add_public(c, key, party))
    }

    /// Multiply a shared value by a public value
    pub fn mul_public(
        &mut self,
        a: &AuthenticatedScalar<F>,
        public: &OpenedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        self.public_op("mul-public", a, public, |a, c, _, _| a * c)
    }

    // -------------------
    // | Multiplications |
    // -------------------

    /// Multiply two shared values
    pub fn mul(
        &mut self,
        a: &AuthenticatedScalar<F>,
        b: &AuthenticatedScalar<F>,
    ) -> AuthenticatedScalar<F> {
        let mut products = self.mul_batch(&[a.clone()], &[b.clone()]);
        products.remove(0)
    }

    /// Multiply two batches of shared values elementwise, in a single round
    pub fn mul_batch(
        &mut self,
        a: &[AuthenticatedScalar<F>],
        b: &[AuthenticatedScalar<F>],
    ) -> Vec<AuthenticatedScalar<F>> {
        if a.len() != b.len() {
            self.builder.record_error(MpcError::Construction(format!(
                "mul_batch over batches of length {} and {}",
                a.len(),
                b.len()
            )));
        }

        let n = a.len().min(b.len());
        let outputs = (0..a.len()).map(|_| self.builder.allocate()).collect_vec();
        self.builder.append(MulGate::new(a[..n].to_vec(), b[..n].to_vec(), outputs.clone()));

        outputs
    }

    // -----------
    // | Opening |
    // -----------

    /// Open a shared value to every party
    ///
    /// The value's mac is checked later, by the next mac check of the session
    pub fn open(&mut self, a: &AuthenticatedScalar<F>) -> OpenedScalar<F> {
        let mut opened = self.open_batch(&[a.clone()]);
        opened.remove(0)
    }

    /// Open a batch of shared values in a single round
    pub fn open_batch(&mut self, values: &[AuthenticatedScalar<F>]) -> Vec<OpenedScalar<F>> {
        let outputs = (0..values.len()).map(|_| self.builder.allocate()).collect_vec();
        self.builder.append(OpenGate::new(values.to_vec(), outputs.clone()));

        outputs
    }

    /// Open a shared value to a single party
    ///
    /// Resolves to the value at `party` and to `None` at every other party.
    /// The opening consumes one of the party's input masks
    pub fn open_to(
        &mut self,
        a: &AuthenticatedScalar<F>,
        party: PartyId,
    ) -> ResultHandle<Option<Scalar<F>>> {
        let output = self.builder.allocate();
        let n_parties = self.builder.n_parties();
        if party as usize >= n_parties {
            self.builder.record_error(MpcError::Construction(format!(
                "open to party {party} in a session of {n_parties}"
            )));
        }

        self.builder.append(OutputGate::new(party, a.clone(), output.clone()));
        output
    }

    // ---------------------
    // | Public Arithmetic |
    // ---------------------

    /// The multiplicative inverse of a public value
    ///
    /// Inverting zero fails the run
    pub fn invert(&mut self, public: &OpenedScalar<F>) -> OpenedScalar<F> {
        let output = self.builder.allocate();
        let public = public.clone();
        let gate = LocalGate::new("invert", deps!(public), output.clone(), move |_ctx| {
            public
                .resolved_value()?
                .inverse()
                .ok_or_else(|| MpcError::Arithmetic("inverse of zero".to_string()))
        });

        self.builder.append(gate);
        output
    }

    /// The powers `v, v^2, ..., v^max_exp` of a public value `v`
    pub fn exp_from_open(
        &mut self,
        public: &OpenedScalar<F>,
        max_exp: usize,
    ) -> ResultHandle<Vec<Scalar<F>>> {
        let output = self.builder.allocate();
        let public = public.clone();
        let gate = LocalGate::new("exp-from-open", deps!(public), output.clone(), move |_ctx| {
            let value = public.resolved_value()?;
            let powers = std::iter::successors(Some(value), |power| Some(*power * value))
                .take(max_exp)
                .collect_vec();
            Ok(powers)
        });

        self.builder.append(gate);
        output
    }

    // -------------
    // | Mac Check |
    // -------------

    /// Check the macs of every value opened so far in the session
    ///
    /// Resolves to the number of values checked
    pub fn check_macs(&mut self) -> ResultHandle<usize> {
        let output = self.builder.allocate();
        self.builder.append(MacCheckGate::new(output.clone()));
        output
    }
}
