//! # Propagation
//!
//! Derived state kept in sync with the ledgers and the topology:
//!
//! - TBM: a queue's service curve is the residual of the queue above it.
//!   A change at queue `i` recomputes queue `i + 1`, whose change in turn
//!   recomputes `i + 2`, down to the last queue.
//! - MHM with input-link shaping: a queue's delay is recomputed from the
//!   number and rate of the links feeding its link, and changes fan out to
//!   neighbouring links until nothing moves.

use std::collections::{BTreeSet, VecDeque};

use crate::config::AcModel;
use crate::curve::{delay_bound, Curve, TokenBucket};
use crate::error::{DnmError, Result};
use crate::system::DetServ;
use crate::topology::{LinkId, QueueId};

impl DetServ {
    // ─── Service curves ─────────────────────────────────────────────────────

    pub(crate) fn on_utilization_changed(&mut self, queue: QueueId) -> Result<()> {
        self.update_lower_priority_service_curve(queue)
    }

    pub(crate) fn on_service_curve_changed(&mut self, queue: QueueId) -> Result<()> {
        self.update_lower_priority_service_curve(queue)
    }

    fn update_lower_priority_service_curve(&mut self, queue: QueueId) -> Result<()> {
        if self.config.ac_model != AcModel::Tbm {
            return Ok(());
        }
        let lower = queue.lower();
        if self.queue(lower).is_err() {
            return Ok(());
        }

        let arrival = self.aggregate_arrival(queue, None)?;
        let service = self
            .config
            .residual_mode
            .residual_service_curve(self.queue(queue)?.service_curve(), &arrival);
        tracing::trace!(queue = %lower, service = %service, "service curve updated");
        self.queue_mut(lower)?.service_curve = service;
        self.on_service_curve_changed(lower)
    }

    // ─── Input-link shaping delays ──────────────────────────────────────────

    pub(crate) fn on_link_added(&mut self, link: LinkId) -> Result<()> {
        if !self.ils_delays_enabled() {
            return Ok(());
        }
        let mut pending: VecDeque<LinkId> = VecDeque::from([link]);
        pending.extend(self.neighbour_links(link)?);
        self.correct_until_stable(pending)?;
        Ok(())
    }

    /// Re-run the shaped-delay correction on every queue, propagating any
    /// change. Returns the number of queues whose delay changed.
    pub fn correct_ils_delays(&mut self) -> Result<usize> {
        if !self.ils_delays_enabled() {
            return Ok(0);
        }
        let all = self.topology.links().iter().map(|l| l.id).collect();
        self.correct_until_stable(all)
    }

    fn ils_delays_enabled(&self) -> bool {
        self.config.ac_model == AcModel::Mhm && self.config.input_link_shaping
    }

    /// Links whose shaped delay depends on the links around `link`: those
    /// entering its source and those leaving its destination.
    fn neighbour_links(&self, link: LinkId) -> Result<Vec<LinkId>> {
        let link = self.topology.link(link)?;
        let upstream = self.topology.node(link.source)?.incoming();
        let downstream = self.topology.node(link.destination)?.outgoing();
        Ok(upstream.iter().chain(downstream).copied().collect())
    }

    fn correct_until_stable(&mut self, mut pending: VecDeque<LinkId>) -> Result<usize> {
        let mut queued: BTreeSet<LinkId> = pending.iter().copied().collect();
        let mut changed = 0;
        while let Some(link) = pending.pop_front() {
            queued.remove(&link);
            let mut moved = false;
            for queue in self.queue_ids(link)?.collect::<Vec<_>>() {
                if self.correct_ils_delay(queue)? {
                    moved = true;
                    changed += 1;
                }
            }
            if moved {
                for next in self.neighbour_links(link)? {
                    if queued.insert(next) {
                        pending.push_back(next);
                    }
                }
            }
        }
        Ok(changed)
    }

    /// Recompute one queue's delay against the shaped aggregate of the links
    /// feeding it. Returns whether the stored delay changed.
    fn correct_ils_delay(&mut self, queue: QueueId) -> Result<bool> {
        let link = self.topology.link(queue.link)?;
        let source = self.topology.node(link.source)?;
        if source.is_host() {
            return Ok(false);
        }

        let mut rate = 0.0;
        for &incoming in source.incoming() {
            rate += self.topology.link(incoming)?.rate;
        }
        let burst = source.incoming().len() as f64 * self.config.max_packet_size;

        let state = self.queue(queue)?;
        let cap = state.max_arrival().ok_or_else(|| {
            DnmError::Config(format!("MHM queue {queue} has no arrival cap"))
        })?;
        let shaped = Curve::from(TokenBucket::from_parts(rate, burst)).min(&cap.into());
        let delay = delay_bound(&shaped, state.service_curve());
        if !delay.is_finite() {
            return Err(DnmError::Unbounded {
                quantity: "delay",
                queue,
            });
        }
        if delay == state.delay() {
            return Ok(false);
        }

        tracing::debug!(
            queue = %queue,
            old = state.delay(),
            new = delay,
            "shaped delay corrected"
        );
        self.queue_mut(queue)?.delay = delay;
        Ok(true)
    }
}
