//! # DetServ
//!
//! Owns the configuration, the topology and one scheduler per link. Links
//! are allocated when they are added; flows are admitted and withdrawn
//! through the [`PathProxy`](crate::PathProxy) implementation in
//! `evaluator`.

use std::fmt;

use crate::allocation::{
    AllocationContext, QueueAllocation, SelectResourceAllocation, SelectedResourceAllocation,
};
use crate::config::{AcModel, DetServConfig};
use crate::cost::CostModel;
use crate::curve::{backlog_bound, delay_bound, x_intersection, Curve, TokenBucket};
use crate::error::{DnmError, Result};
use crate::ledger::{QueueState, ResourceUtilization};
use crate::residual::ResidualMode;
use crate::topology::{Link, LinkId, LinkSpec, NodeId, NodeKind, QueueId, Topology};

// ─── Scheduler ──────────────────────────────────────────────────────────────

/// Strict-priority scheduler of one link.
#[derive(Debug)]
pub struct Scheduler {
    link: LinkId,
    allocation: SelectedResourceAllocation,
    queues: Vec<QueueState>,
}

impl Scheduler {
    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn allocation(&self) -> &SelectedResourceAllocation {
        &self.allocation
    }

    /// Highest priority first.
    pub fn queues(&self) -> &[QueueState] {
        &self.queues
    }
}

/// Snapshot of a queue's bounds, for inspection and reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueReport {
    pub queue: QueueId,
    pub reserved: TokenBucket,
    pub max_arrival: Option<TokenBucket>,
    pub arrival: Curve,
    pub service: Curve,
    pub delay_budget: f64,
    pub delay_bound: f64,
    pub backlog_bound: f64,
    /// First time the service catches up with the arrival.
    pub x_intersection: f64,
    pub buffer_size: f64,
}

// ─── System ─────────────────────────────────────────────────────────────────

pub struct DetServ {
    pub(crate) config: DetServConfig,
    pub(crate) topology: Topology,
    schedulers: Vec<Scheduler>,
    selector: Box<dyn SelectResourceAllocation>,
    pub(crate) cost_model: Box<dyn CostModel>,
}

impl fmt::Debug for DetServ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetServ")
            .field("config", &self.config)
            .field("topology", &self.topology)
            .field("schedulers", &self.schedulers)
            .field("cost_model", &self.cost_model)
            .finish_non_exhaustive()
    }
}

impl DetServ {
    pub fn new(config: DetServConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            ac_model = %config.ac_model,
            residual_mode = config.residual_mode.as_str(),
            burst_increase = ?config.burst_increase,
            input_link_shaping = config.input_link_shaping,
            allocation = config.allocation.name(),
            "detserv configured"
        );
        Ok(Self {
            selector: Box::new(config.allocation.clone()),
            cost_model: config.cost.build(),
            config,
            topology: Topology::new(),
            schedulers: Vec::new(),
        })
    }

    /// Replace the configured strategy selection. Only links added
    /// afterwards are affected.
    pub fn with_selector(mut self, selector: impl SelectResourceAllocation + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_cost_model(mut self, cost_model: impl CostModel + 'static) -> Self {
        self.cost_model = Box::new(cost_model);
        self
    }

    pub fn config(&self) -> &DetServConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        self.topology.add_node(name, kind)
    }

    /// Add a link and allocate its scheduler. With MHM and input-link
    /// shaping, neighbouring delays are corrected before returning.
    pub fn add_link(&mut self, source: NodeId, destination: NodeId, spec: LinkSpec) -> Result<LinkId> {
        let id = self.topology.add_link(source, destination, spec)?;
        let scheduler = match self.topology.link(id).and_then(|link| self.create_scheduler(link)) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                self.topology.remove_last_link();
                return Err(e);
            }
        };
        self.schedulers.push(scheduler);

        let delays = self.queue_delays();
        if let Err(e) = self.on_link_added(id) {
            self.schedulers.pop();
            self.topology.remove_last_link();
            self.restore_queue_delays(&delays);
            return Err(e);
        }
        Ok(id)
    }

    fn queue_delays(&self) -> Vec<Vec<f64>> {
        self.schedulers
            .iter()
            .map(|s| s.queues.iter().map(|q| q.delay).collect())
            .collect()
    }

    fn restore_queue_delays(&mut self, delays: &[Vec<f64>]) {
        for (scheduler, delays) in self.schedulers.iter_mut().zip(delays) {
            for (queue, &delay) in scheduler.queues.iter_mut().zip(delays) {
                queue.delay = delay;
            }
        }
    }

    fn create_scheduler(&self, link: &Link) -> Result<Scheduler> {
        let strategy = self.selector.select(link);
        if strategy.model() != self.config.ac_model {
            return Err(DnmError::ModelMismatch {
                strategy: strategy.name(),
                model: self.config.ac_model,
            });
        }

        let ctx = AllocationContext {
            link,
            max_packet_size: self.config.max_packet_size,
        };
        let allocations = strategy.allocate(&ctx)?;
        if allocations.len() < link.queue_count() {
            return Err(DnmError::MissingAllocationParameter {
                strategy: strategy.name(),
                queue: allocations.len(),
            });
        }

        let last = link.queue_count() - 1;
        let mut service: Curve = ctx.link_service_curve().into();
        let mut queues = Vec::with_capacity(link.queue_count());
        for (priority, (allocation, &buffer_size)) in
            allocations.iter().zip(&link.buffer_sizes).enumerate()
        {
            let state = match (self.config.ac_model, allocation) {
                (AcModel::Mhm, &QueueAllocation::Mhm { max_arrival, delay }) => {
                    let state = QueueState {
                        buffer_size,
                        service_curve: service.clone(),
                        max_arrival: Some(max_arrival),
                        delay,
                        utilization: ResourceUtilization::aggregate(),
                    };
                    let residual = if priority + 1 < last {
                        ResidualMode::LeastLatency
                    } else {
                        ResidualMode::RealCurve
                    };
                    service = residual.residual_service_curve(&service, &max_arrival.into());
                    state
                }
                (AcModel::Tbm, &QueueAllocation::Tbm { delay }) => QueueState {
                    buffer_size,
                    service_curve: service.clone(),
                    max_arrival: None,
                    delay,
                    utilization: if self.config.input_link_shaping {
                        ResourceUtilization::per_incoming_link()
                    } else {
                        ResourceUtilization::aggregate()
                    },
                },
                _ => {
                    return Err(DnmError::ModelMismatch {
                        strategy: strategy.name(),
                        model: self.config.ac_model,
                    })
                }
            };
            tracing::debug!(
                queue = %QueueId::new(link.id, priority),
                service = %state.service_curve,
                delay = state.delay,
                "queue allocated"
            );
            queues.push(state);
        }

        tracing::info!(
            link = %link.id,
            rate = link.rate,
            queues = queues.len(),
            strategy = strategy.name(),
            "scheduler created"
        );
        Ok(Scheduler {
            link: link.id,
            allocation: SelectedResourceAllocation::new(strategy),
            queues,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn scheduler(&self, link: LinkId) -> Result<&Scheduler> {
        self.schedulers.get(link.0).ok_or(DnmError::UnknownLink(link))
    }

    pub fn queue(&self, id: QueueId) -> Result<&QueueState> {
        self.scheduler(id.link)?
            .queues
            .get(id.priority)
            .ok_or(DnmError::UnknownQueue(id))
    }

    pub(crate) fn queue_mut(&mut self, id: QueueId) -> Result<&mut QueueState> {
        self.schedulers
            .get_mut(id.link.0)
            .ok_or(DnmError::UnknownLink(id.link))?
            .queues
            .get_mut(id.priority)
            .ok_or(DnmError::UnknownQueue(id))
    }

    pub fn queue_ids(&self, link: LinkId) -> Result<impl Iterator<Item = QueueId>> {
        let count = self.scheduler(link)?.queues.len();
        Ok((0..count).map(move |p| QueueId::new(link, p)))
    }

    /// Current aggregate and bounds of one queue.
    pub fn queue_report(&self, id: QueueId) -> Result<QueueReport> {
        let state = self.queue(id)?;
        let arrival = self.aggregate_arrival(id, None)?;
        let service = state.service_curve().clone();
        Ok(QueueReport {
            queue: id,
            reserved: state.utilization().total(),
            max_arrival: state.max_arrival(),
            delay_bound: delay_bound(&arrival, &service),
            backlog_bound: backlog_bound(&arrival, &service),
            x_intersection: x_intersection(&arrival, &service),
            arrival,
            service,
            delay_budget: state.delay(),
            buffer_size: state.buffer_size(),
        })
    }
}
