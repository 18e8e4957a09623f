//! # Admission and registration
//!
//! Per-hop admission tests and full-path (de)registration, exposed through
//! [`PathProxy`]. A rejection is `Ok(false)` and leaves every ledger
//! untouched; ledgers only change in [`PathProxy::register`] and
//! [`PathProxy::deregister`].

use crate::config::{AcModel, BurstIncrease};
use crate::cost::CostContext;
use crate::curve::{backlog_bound, delay_bound, Curve, TokenBucket};
use crate::error::{DnmError, Result};
use crate::ledger::ResourceUtilization;
use crate::proxy::{Hop, Path, PathProxy};
use crate::request::{FlowRequest, RequestEnvelope};
use crate::system::DetServ;
use crate::topology::{LinkId, NodeId, QueueId};

impl DetServ {
    // ─── Arrival curves ─────────────────────────────────────────────────────

    /// Aggregate arrival curve of `queue`, optionally with a not yet
    /// registered `request` entering through the given link.
    ///
    /// Per-incoming-link ledgers are shaped by their link's rate, except
    /// traffic entering through the queue's own link (sourced locally).
    pub(crate) fn aggregate_arrival(
        &self,
        queue: QueueId,
        request: Option<(LinkId, TokenBucket)>,
    ) -> Result<Curve> {
        match self.queue(queue)?.utilization() {
            ResourceUtilization::Aggregate(ledger) => {
                let reserved = ledger.token_bucket();
                Ok(match request {
                    Some((_, tb)) => reserved + tb,
                    None => reserved,
                }
                .into())
            }
            ResourceUtilization::PerIncomingLink(ledgers) => {
                let mut total = Curve::zero();
                let mut folded = false;
                for (&incoming, ledger) in ledgers {
                    let mut tb = ledger.token_bucket();
                    if let Some((link, extra)) = request {
                        if link == incoming {
                            tb = tb + extra;
                            folded = true;
                        }
                    }
                    total = total.add(&self.shaped(queue.link, incoming, tb)?);
                }
                if let Some((link, extra)) = request.filter(|_| !folded) {
                    total = total.add(&self.shaped(queue.link, link, extra)?);
                }
                Ok(total)
            }
        }
    }

    fn shaped(&self, own: LinkId, incoming: LinkId, tb: TokenBucket) -> Result<Curve> {
        let curve = Curve::from(tb);
        if incoming == own {
            return Ok(curve);
        }
        let rate = self.topology.link(incoming)?.rate;
        let shaper = TokenBucket::from_parts(rate, self.config.max_packet_size);
        Ok(curve.min(&shaper.into()))
    }

    // ─── Admission ──────────────────────────────────────────────────────────

    /// The physical link the flow arrives on at `hop`.
    fn incoming_link(hop: &Hop<'_>) -> LinkId {
        hop.upstream().map_or(hop.candidate.link, |q| q.link)
    }

    /// The request's envelope as checked at `hop`.
    fn admission_envelope(&self, hop: &Hop<'_>, envelope: &RequestEnvelope) -> TokenBucket {
        let tb = envelope.token_bucket();
        match self.config.burst_increase {
            BurstIncrease::No => tb,
            BurstIncrease::WorstCaseBurst | BurstIncrease::WorstCaseBurstRealReservation => {
                if hop.is_first() {
                    tb
                } else {
                    tb.with_extra_burst(tb.rate() * envelope.deadline())
                }
            }
            BurstIncrease::Real => {
                let delay_so_far = hop.parameters.first().copied().unwrap_or(0.0);
                tb.with_extra_burst(tb.rate() * delay_so_far)
            }
        }
    }

    fn mhm_access(&self, queue: QueueId, tb: TokenBucket) -> Result<bool> {
        let state = self.queue(queue)?;
        let cap = state.max_arrival().ok_or_else(|| {
            DnmError::Config(format!("MHM queue {queue} has no arrival cap"))
        })?;
        let used = state.utilization().total() + tb;
        let accepted = used.fits_within(&cap);
        if !accepted {
            tracing::debug!(queue = %queue, used = %used, cap = %cap, "cap exceeded");
        }
        Ok(accepted)
    }

    fn tbm_access(&self, target: QueueId, incoming: LinkId, tb: TokenBucket) -> Result<bool> {
        let scheduler = self.scheduler(target.link)?;
        let mut service = self.queue(target)?.service_curve().clone();

        for (priority, state) in scheduler.queues().iter().enumerate().skip(target.priority) {
            let queue = QueueId::new(target.link, priority);
            let request = (queue == target).then_some((incoming, tb));
            let arrival = self.aggregate_arrival(queue, request)?;

            let delay = delay_bound(&arrival, &service);
            if delay >= state.delay() {
                tracing::debug!(
                    queue = %queue,
                    delay,
                    budget = state.delay(),
                    "delay budget exceeded"
                );
                return Ok(false);
            }
            let backlog = backlog_bound(&arrival, &service);
            if backlog >= state.buffer_size() {
                tracing::debug!(
                    queue = %queue,
                    backlog,
                    buffer = state.buffer_size(),
                    "buffer exceeded"
                );
                return Ok(false);
            }
            service = self
                .config
                .residual_mode
                .residual_service_curve(&service, &arrival);
        }
        Ok(true)
    }

    // ─── Registration ───────────────────────────────────────────────────────

    fn register_deregister(&mut self, path: &Path, request: &FlowRequest, register: bool) -> Result<bool> {
        let envelope = *request.envelope()?;
        for &hop in path.hops() {
            self.queue(hop)?;
        }

        let tb = envelope.token_bucket();
        let mut parameters = vec![0.0];
        for (previous, candidate) in path.steps() {
            let delay_so_far = match self.config.burst_increase {
                BurstIncrease::Real | BurstIncrease::WorstCaseBurstRealReservation => {
                    parameters =
                        self.new_parameters(&Hop::new(previous, candidate, &parameters), request)?;
                    parameters.first().copied().unwrap_or(0.0)
                }
                BurstIncrease::WorstCaseBurst if previous.is_empty() => 0.0,
                BurstIncrease::WorstCaseBurst => envelope.deadline(),
                BurstIncrease::No => 0.0,
            };
            let reserved = if delay_so_far == 0.0 {
                tb
            } else {
                tb.with_extra_burst(tb.rate() * delay_so_far)
            };

            let incoming = previous.last().map_or(candidate.link, |q| q.link);
            let utilization = &mut self.queue_mut(candidate)?.utilization;
            if register {
                utilization.register(incoming, reserved);
            } else {
                utilization.deregister(incoming, reserved);
            }
            tracing::debug!(
                flow = request.id,
                queue = %candidate,
                incoming = %incoming,
                reserved = %reserved,
                register,
                "ledger updated"
            );
            self.on_utilization_changed(candidate)?;
        }
        Ok(true)
    }

    // ─── Driver ─────────────────────────────────────────────────────────────

    /// Run every hop of `path` through the admission test and the delay
    /// constraint, without touching any ledger.
    pub fn is_admissible(&self, path: &Path, request: &FlowRequest) -> Result<bool> {
        let bounds = self.constraint_bounds(request)?;
        let mut totals = vec![0.0; bounds.len()];
        let mut parameters = Vec::new();

        for (previous, candidate) in path.steps() {
            parameters = self.new_parameters(&Hop::new(previous, candidate, &parameters), request)?;
            let hop = Hop::new(previous, candidate, &parameters);
            if !self.has_access(&hop, request)? {
                return Ok(false);
            }
            for (total, value) in totals.iter_mut().zip(self.constraint_values(&hop, request)?) {
                *total += value;
            }
            if totals.iter().zip(&bounds).any(|(total, bound)| total > bound) {
                tracing::debug!(flow = request.id, queue = %candidate, "deadline exceeded");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Admit `request` on `path` if every hop accepts it.
    pub fn try_admit(&mut self, path: &Path, request: &FlowRequest) -> Result<bool> {
        if !self.is_admissible(path, request)? {
            tracing::info!(flow = request.id, hops = path.len(), "flow rejected");
            return Ok(false);
        }
        self.register(path, request)?;
        tracing::info!(flow = request.id, hops = path.len(), "flow admitted");
        Ok(true)
    }

    /// Release a previously admitted flow.
    pub fn withdraw(&mut self, path: &Path, request: &FlowRequest) -> Result<bool> {
        let done = self.deregister(path, request)?;
        tracing::info!(flow = request.id, hops = path.len(), "flow withdrawn");
        Ok(done)
    }
}

impl PathProxy for DetServ {
    fn handle(&self, request: &FlowRequest) -> bool {
        request.has_envelope()
    }

    fn number_of_constraints(&self, _request: &FlowRequest) -> usize {
        1
    }

    fn number_of_parameters(&self, _request: &FlowRequest) -> usize {
        usize::from(self.config.burst_increase.tracks_delay())
    }

    fn new_parameters(&self, hop: &Hop<'_>, _request: &FlowRequest) -> Result<Vec<f64>> {
        if !self.config.burst_increase.tracks_delay() {
            return Ok(Vec::new());
        }
        Ok(match hop.upstream() {
            Some(upstream) => {
                let carried = hop.parameters.first().copied().unwrap_or(0.0);
                vec![self.queue(upstream)?.delay() + carried]
            }
            None => vec![0.0],
        })
    }

    fn has_access(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<bool> {
        let envelope = request.envelope()?;
        let tb = self.admission_envelope(hop, envelope);
        let accepted = match self.config.ac_model {
            AcModel::Mhm => self.mhm_access(hop.candidate, tb)?,
            AcModel::Tbm => self.tbm_access(hop.candidate, Self::incoming_link(hop), tb)?,
        };
        tracing::trace!(
            flow = request.id,
            queue = %hop.candidate,
            envelope = %tb,
            accepted,
            "access checked"
        );
        Ok(accepted)
    }

    fn cost(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<f64> {
        let ctx = CostContext {
            queue: hop.candidate,
            state: self.queue(hop.candidate)?,
            link: self.topology.link(hop.candidate.link)?,
            request,
        };
        let model = &self.cost_model;
        Ok(model.cost(&ctx).max(model.min_cost()).min(model.max_cost()))
    }

    fn constraint_values(&self, hop: &Hop<'_>, _request: &FlowRequest) -> Result<Vec<f64>> {
        let queue_delay = self.queue(hop.candidate)?.delay();
        let propagation = self.topology.link(hop.candidate.link)?.propagation_delay;
        Ok(vec![queue_delay + propagation])
    }

    fn constraint_bounds(&self, request: &FlowRequest) -> Result<Vec<f64>> {
        Ok(vec![request.envelope()?.deadline()])
    }

    fn register_hop(&mut self, _hop: &Hop<'_>, _request: &FlowRequest) -> Result<bool> {
        Err(DnmError::PartialPathRegistration)
    }

    fn deregister_hop(&mut self, _hop: &Hop<'_>, _request: &FlowRequest) -> Result<bool> {
        Err(DnmError::PartialPathRegistration)
    }

    fn register(&mut self, path: &Path, request: &FlowRequest) -> Result<bool> {
        self.register_deregister(path, request, true)
    }

    fn deregister(&mut self, path: &Path, request: &FlowRequest) -> Result<bool> {
        self.register_deregister(path, request, false)
    }

    fn cost_guess(&self, source: NodeId, destination: NodeId) -> f64 {
        let hops = self.topology.hop_count(source, destination).unwrap_or(0);
        self.cost_model.min_cost() * hops as f64
    }

    fn constraint_guess(&self, index: usize, source: NodeId, destination: NodeId) -> Result<f64> {
        if index != 0 {
            return Err(DnmError::UnknownConstraint(index));
        }
        let hops = self.topology.hop_count(source, destination).unwrap_or(0);
        Ok(self.config.min_per_hop_delay * hops as f64)
    }
}
