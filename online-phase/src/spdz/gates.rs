//! The communicating instructions of the SPDZ suite: opening, Beaver
//! multiplication, and input

use ark_ff::PrimeField;
use itertools::Itertools;

use crate::{
    algebra::{Scalar, ScalarShare},
    commitment::commit_scalars,
    error::MpcError,
    fabric::{Deferred, Instruction, ResultHandle, ResultId, RoundContext},
    network::PartyId,
    offline_prep::MultiplicationTriple,
};

/// Read the values of a set of resolved handles
fn resolved_values<F: PrimeField>(
    handles: &[ResultHandle<ScalarShare<F>>],
) -> Result<Vec<ScalarShare<F>>, MpcError> {
    handles.iter().map(ResultHandle::resolved_value).collect()
}

/// Receive a batch of share values from every peer and sum them with the
/// local shares
fn open_shares<F: PrimeField>(
    ctx: &mut RoundContext<'_, F>,
    local: &[Scalar<F>],
) -> Result<Vec<Scalar<F>>, MpcError> {
    let mut opened = local.to_vec();
    for peer in ctx.peers() {
        let peer_shares = ctx.receive_scalars(peer, local.len())?;
        for (sum, share) in opened.iter_mut().zip(peer_shares) {
            *sum += share;
        }
    }

    Ok(opened)
}

// -------------
// | Open Gate |
// -------------

/// Opens a batch of authenticated values, deferring their mac check to the
/// session's opened value store
pub struct OpenGate<F: PrimeField> {
    /// The values to open
    inputs: Vec<ResultHandle<ScalarShare<F>>>,
    /// The local shares, read in the compute phase
    shares: Vec<ScalarShare<F>>,
    /// The opened values
    outputs: Vec<ResultHandle<Scalar<F>>>,
}

impl<F: PrimeField> OpenGate<F> {
    /// Constructor
    pub fn new(
        inputs: Vec<ResultHandle<ScalarShare<F>>>,
        outputs: Vec<ResultHandle<Scalar<F>>>,
    ) -> Self {
        Self { inputs, shares: Vec::new(), outputs }
    }
}

impl<F: PrimeField> Instruction<F> for OpenGate<F> {
    fn name(&self) -> &str {
        "open"
    }

    fn communicates(&self, _round: usize) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<&dyn Deferred> {
        self.inputs.iter().map(|input| input as &dyn Deferred).collect_vec()
    }

    fn outputs(&self) -> Vec<ResultId> {
        self.outputs.iter().map(ResultHandle::id).collect_vec()
    }

    fn compute_and_send(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        self.shares = resolved_values(&self.inputs)?;
        let values = self.shares.iter().map(ScalarShare::share).collect_vec();
        ctx.broadcast(values)
    }

    fn receive_and_resolve(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let local = self.shares.iter().map(ScalarShare::share).collect_vec();
        let opened = open_shares(ctx, &local)?;

        ctx.opened_values().push_opened_values(std::mem::take(&mut self.shares), opened.clone());
        for (output, value) in self.outputs.iter().zip(opened) {
            output.resolve(value)?;
        }

        Ok(())
    }
}

// -------------------
// | Multiplications |
// -------------------

/// Multiplies pairs of authenticated values with Beaver triples
///
/// Given a triple `(a, b, c)` the parties open `d = x - a` and `e = y - b`,
/// then locally compute `xy = c + d * b + e * a + d * e`
pub struct MulGate<F: PrimeField> {
    /// The left hand factors
    lhs: Vec<ResultHandle<ScalarShare<F>>>,
    /// The right hand factors
    rhs: Vec<ResultHandle<ScalarShare<F>>>,
    /// The triples consumed, drawn in the compute phase
    triples: Vec<MultiplicationTriple<F>>,
    /// The local shares of `d` followed by those of `e`
    masked: Vec<ScalarShare<F>>,
    /// The products
    outputs: Vec<ResultHandle<ScalarShare<F>>>,
}

impl<F: PrimeField> MulGate<F> {
    /// Constructor
    pub fn new(
        lhs: Vec<ResultHandle<ScalarShare<F>>>,
        rhs: Vec<ResultHandle<ScalarShare<F>>>,
        outputs: Vec<ResultHandle<ScalarShare<F>>>,
    ) -> Self {
        Self { lhs, rhs, triples: Vec::new(), masked: Vec::new(), outputs }
    }
}

impl<F: PrimeField> Instruction<F> for MulGate<F> {
    fn name(&self) -> &str {
        "mul"
    }

    fn communicates(&self, _round: usize) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<&dyn Deferred> {
        self.lhs.iter().chain(self.rhs.iter()).map(|dep| dep as &dyn Deferred).collect_vec()
    }

    fn outputs(&self) -> Vec<ResultId> {
        self.outputs.iter().map(ResultHandle::id).collect_vec()
    }

    fn compute_and_send(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let lhs = resolved_values(&self.lhs)?;
        let rhs = resolved_values(&self.rhs)?;
        self.triples = ctx.supplier().next_triple_batch(lhs.len())?;

        let d = lhs.iter().zip(self.triples.iter()).map(|(x, triple)| x - triple.a);
        let e = rhs.iter().zip(self.triples.iter()).map(|(y, triple)| y - triple.b);
        self.masked = d.chain(e).collect_vec();

        ctx.broadcast(self.masked.iter().map(ScalarShare::share).collect_vec())
    }

    fn receive_and_resolve(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let local = self.masked.iter().map(ScalarShare::share).collect_vec();
        let opened = open_shares(ctx, &local)?;
        ctx.opened_values().push_opened_values(std::mem::take(&mut self.masked), opened.clone());

        let n = self.triples.len();
        let (d, e) = opened.split_at(n);
        let mac_key = ctx.mac_key_share();
        let party_id = ctx.party_id();

        for (i, triple) in self.triples.iter().enumerate() {
            let product = triple.c + triple.b * d[i] + triple.a * e[i];
            self.outputs[i].resolve(product.add_public(d[i] * e[i], mac_key, party_id))?;
        }

        Ok(())
    }
}

// --------------
// | Input Gate |
// --------------

/// The round in which the inputting party broadcasts its masked value
const INPUT_ROUND: usize = 0;
/// The round in which every party echoes a commitment to the masked value
const ECHO_ROUND: usize = 1;

/// Secret shares a value held by one party
///
/// The inputting party broadcasts its value masked by a preprocessed random
/// value only it knows. With more than two parties a dishonest input party
/// could send different masked values to different peers, so every party
/// then echoes a commitment to the value it received
pub struct InputGate<F: PrimeField> {
    /// The party providing the input
    input_party: PartyId,
    /// The cleartext input, present only at the input party
    value: Option<Scalar<F>>,
    /// The number of rounds, two when the masked value must be echoed
    n_rounds: usize,
    /// The masked value, set in the first round
    masked: Scalar<F>,
    /// The resulting share, set in the first round
    share: ScalarShare<F>,
    /// The shared input
    output: ResultHandle<ScalarShare<F>>,
}

impl<F: PrimeField> InputGate<F> {
    /// Constructor
    pub fn new(
        input_party: PartyId,
        value: Option<Scalar<F>>,
        n_parties: usize,
        output: ResultHandle<ScalarShare<F>>,
    ) -> Self {
        let n_rounds = if n_parties > 2 { 2 } else { 1 };
        Self {
            input_party,
            value,
            n_rounds,
            masked: Scalar::zero(),
            share: ScalarShare::zero(),
            output,
        }
    }
}

impl<F: PrimeField> Instruction<F> for InputGate<F> {
    fn name(&self) -> &str {
        "input"
    }

    fn n_rounds(&self) -> usize {
        self.n_rounds
    }

    fn communicates(&self, _round: usize) -> bool {
        true
    }

    fn outputs(&self) -> Vec<ResultId> {
        vec![self.output.id()]
    }

    fn compute_and_send(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        match round {
            INPUT_ROUND => {
                let mask = ctx.supplier().next_input_mask(self.input_party)?;
                self.share = mask.share;
                if ctx.party_id() != self.input_party {
                    return Ok(());
                }

                let value = self.value.ok_or_else(|| {
                    MpcError::Construction(format!("party {} has no input", self.input_party))
                })?;
                let real_mask = mask.real_value.ok_or_else(|| {
                    MpcError::ProtocolViolation("input mask missing its cleartext".to_string())
                })?;

                self.masked = value - real_mask;
                ctx.broadcast(self.masked)
            },
            ECHO_ROUND => ctx.broadcast(commit_scalars(&[self.masked])),
            _ => Err(MpcError::ProtocolViolation(format!("input has no round {round}"))),
        }
    }

    fn receive_and_resolve(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        match round {
            INPUT_ROUND => {
                if ctx.party_id() != self.input_party {
                    self.masked = ctx.receive_scalar(self.input_party)?;
                }
                self.share = self.share.add_public(self.masked, ctx.mac_key_share(), ctx.party_id());
            },
            ECHO_ROUND => {
                let expected = commit_scalars(&[self.masked]);
                let echoes: Vec<Scalar<F>> = ctx.receive_from_all()?;
                if echoes.into_iter().any(|echo| echo != expected) {
                    return Err(MpcError::InconsistentBroadcast(self.input_party));
                }
            },
            _ => return Err(MpcError::ProtocolViolation(format!("input has no round {round}"))),
        }

        if round + 1 == self.n_rounds {
            self.output.resolve(self.share)?;
        }
        Ok(())
    }
}

// ---------------
// | Output Gate |
// ---------------

/// Opens an authenticated value to a single party
///
/// The value is masked with a preprocessed input mask of the receiving
/// party, the masked value is opened to every party, and only the receiver
/// can strip the mask
pub struct OutputGate<F: PrimeField> {
    /// The party the value is opened to
    output_party: PartyId,
    /// The value to open
    input: ResultHandle<ScalarShare<F>>,
    /// The local share of the masked value, set in the compute phase
    masked: ScalarShare<F>,
    /// The cleartext mask, present only at the receiving party
    real_mask: Option<Scalar<F>>,
    /// The opened value at the receiving party, `None` elsewhere
    output: ResultHandle<Option<Scalar<F>>>,
}

impl<F: PrimeField> OutputGate<F> {
    /// Constructor
    pub fn new(
        output_party: PartyId,
        input: ResultHandle<ScalarShare<F>>,
        output: ResultHandle<Option<Scalar<F>>>,
    ) -> Self {
        Self { output_party, input, masked: ScalarShare::zero(), real_mask: None, output }
    }
}

impl<F: PrimeField> Instruction<F> for OutputGate<F> {
    fn name(&self) -> &str {
        "open-to"
    }

    fn communicates(&self, _round: usize) -> bool {
        true
    }

    fn dependencies(&self) -> Vec<&dyn Deferred> {
        vec![&self.input as &dyn Deferred]
    }

    fn outputs(&self) -> Vec<ResultId> {
        vec![self.output.id()]
    }

    fn compute_and_send(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let mask = ctx.supplier().next_input_mask(self.output_party)?;
        if ctx.party_id() == self.output_party {
            let real_mask = mask.real_value.ok_or_else(|| {
                MpcError::ProtocolViolation("input mask missing its cleartext".to_string())
            })?;
            self.real_mask = Some(real_mask);
        }

        self.masked = self.input.resolved_value()? - mask.share;
        ctx.broadcast(vec![self.masked.share()])
    }

    fn receive_and_resolve(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let opened = open_shares(ctx, &[self.masked.share()])?;
        ctx.opened_values().push_opened_values(vec![self.masked], opened.clone());

        let value = self.real_mask.map(|mask| opened[0] + mask);
        self.output.resolve(value)
    }
}
