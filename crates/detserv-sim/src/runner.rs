//! Plays a scenario's events against a built network.
//!
//! Each admission searches the cheapest admissible queue assignment along
//! the flow's route the way a constrained path search would: hop by hop
//! through [`PathProxy`], carrying the per-hop parameters, summing the
//! constraint values against their bounds, and pruning with the cost and
//! constraint guesses. The winner is registered as a whole path.

use std::collections::HashMap;
use std::fmt;

use anyhow::Context;

use detserv::{
    DetServ, FlowRequest, Hop, LinkId, NodeId, Path, PathProxy, QueueId, QueueReport,
};

use crate::scenario::{Action, FlowEntry, Network, Scenario};

// ─── Search ─────────────────────────────────────────────────────────────────

/// A complete admissible assignment of one queue per route link.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub path: Path,
    pub cost: f64,
    /// Sum of the per-hop constraint values (queue delay plus propagation).
    pub delay: f64,
}

struct Search<'a> {
    dnm: &'a DetServ,
    links: &'a [LinkId],
    request: &'a FlowRequest,
    destination: NodeId,
    bounds: Vec<f64>,
    prefix: Vec<QueueId>,
    best: Option<Choice>,
}

impl Search<'_> {
    fn descend(&mut self, parameters: &[f64], cost: f64, totals: &[f64]) -> detserv::Result<()> {
        let depth = self.prefix.len();
        let Some(&link) = self.links.get(depth) else {
            if self.best.as_ref().map_or(true, |best| cost < best.cost) {
                self.best = Some(Choice {
                    path: Path::new(self.prefix.clone())?,
                    cost,
                    delay: totals.first().copied().unwrap_or(0.0),
                });
            }
            return Ok(());
        };
        let next = self.dnm.topology().link(link)?.destination;

        for queue in self.dnm.queue_ids(link)?.collect::<Vec<_>>() {
            let hop = Hop::new(&self.prefix, queue, parameters);
            let carried = self.dnm.new_parameters(&hop, self.request)?;
            let hop = Hop::new(&self.prefix, queue, &carried);
            if !self.dnm.has_access(&hop, self.request)? {
                continue;
            }

            let values = self.dnm.constraint_values(&hop, self.request)?;
            let mut reached = Vec::with_capacity(totals.len());
            let mut feasible = true;
            for (index, (total, value)) in totals.iter().zip(&values).enumerate() {
                let sum = total + value;
                let floor = sum + self.dnm.constraint_guess(index, next, self.destination)?;
                feasible &= floor <= self.bounds[index];
                reached.push(sum);
            }
            let cost = cost + self.dnm.cost(&hop, self.request)?;
            let cost_floor = cost + self.dnm.cost_guess(next, self.destination);
            if !feasible || self.best.as_ref().is_some_and(|best| cost_floor >= best.cost) {
                continue;
            }

            self.prefix.push(queue);
            self.descend(&carried, cost, &reached)?;
            self.prefix.pop();
        }
        Ok(())
    }
}

/// Cheapest admissible queue assignment along `links`, if any.
pub fn cheapest_path(
    dnm: &DetServ,
    links: &[LinkId],
    request: &FlowRequest,
) -> detserv::Result<Option<Choice>> {
    if !dnm.handle(request) {
        return Ok(None);
    }
    let Some(&last) = links.last() else {
        return Ok(None);
    };
    let bounds = dnm.constraint_bounds(request)?;
    let mut search = Search {
        dnm,
        links,
        request,
        destination: dnm.topology().link(last)?.destination,
        prefix: Vec::with_capacity(links.len()),
        best: None,
        bounds,
    };
    let totals = vec![0.0; dnm.number_of_constraints(request)];
    search.descend(&[], 0.0, &totals)?;
    Ok(search.best)
}

// ─── Runner ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Admitted(Choice),
    Rejected,
    Withdrawn,
    /// Admit of a flow already in place, or withdraw of one that is not.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub flow: String,
    pub action: Action,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub outcomes: Vec<FlowOutcome>,
    /// Every queue carrying at least one reservation at the end of the run.
    pub queues: Vec<QueueReport>,
}

impl Report {
    pub fn admitted(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Admitted(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Rejected))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn outcome(&self, flow: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.flow == flow)
            .map(|o| &o.outcome)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} events: {} admitted, {} rejected",
            self.outcomes.len(),
            self.admitted(),
            self.rejected()
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for o in &self.outcomes {
            match &o.outcome {
                Outcome::Admitted(choice) => {
                    let queues: Vec<String> =
                        choice.path.hops().iter().map(ToString::to_string).collect();
                    writeln!(
                        f,
                        "admit    {:<16} [{}] cost={:.3} delay={:.6}s",
                        o.flow,
                        queues.join(" "),
                        choice.cost,
                        choice.delay
                    )?;
                }
                Outcome::Rejected => writeln!(f, "reject   {}", o.flow)?,
                Outcome::Withdrawn => writeln!(f, "withdraw {}", o.flow)?,
                Outcome::Skipped => writeln!(f, "skip     {} ({:?})", o.flow, o.action)?,
            }
        }
        for q in &self.queues {
            writeln!(
                f,
                "{:<8} reserved={} delay={:.6}/{:.6}s backlog={:.0}/{:.0}B",
                q.queue.to_string(),
                q.reserved,
                q.delay_bound,
                q.delay_budget,
                q.backlog_bound,
                q.buffer_size
            )?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Build the scenario's network and play its events.
pub fn run(scenario: &Scenario) -> anyhow::Result<Report> {
    let mut network = scenario.build()?;
    let flows: HashMap<&str, (usize, &FlowEntry)> = scenario
        .flows
        .iter()
        .enumerate()
        .map(|(i, flow)| (flow.name.as_str(), (i, flow)))
        .collect();
    let mut admitted: HashMap<String, (Path, FlowRequest)> = HashMap::new();
    let mut outcomes = Vec::new();

    for event in scenario.events() {
        let &(index, entry) = flows
            .get(event.flow.as_str())
            .with_context(|| format!("event refers to unknown flow {:?}", event.flow))?;
        let outcome = match event.action {
            Action::Admit if admitted.contains_key(&entry.name) => {
                tracing::warn!(flow = %entry.name, "already admitted");
                Outcome::Skipped
            }
            Action::Admit => admit(&mut network, entry, index as u64 + 1, &mut admitted)?,
            Action::Withdraw => match admitted.remove(&entry.name) {
                Some((path, request)) => {
                    network.dnm.withdraw(&path, &request)?;
                    Outcome::Withdrawn
                }
                None => {
                    tracing::warn!(flow = %entry.name, "not admitted, nothing to withdraw");
                    Outcome::Skipped
                }
            },
        };
        outcomes.push(FlowOutcome {
            flow: entry.name.clone(),
            action: event.action,
            outcome,
        });
    }

    let mut queues = Vec::new();
    for link in network.dnm.topology().links() {
        for queue in network.dnm.queue_ids(link.id)? {
            let report = network.dnm.queue_report(queue)?;
            if report.reserved.rate() > 0.0 || report.reserved.burst() > 0.0 {
                queues.push(report);
            }
        }
    }
    Ok(Report { outcomes, queues })
}

fn admit(
    network: &mut Network,
    entry: &FlowEntry,
    id: u64,
    admitted: &mut HashMap<String, (Path, FlowRequest)>,
) -> anyhow::Result<Outcome> {
    let request = entry.request(id)?;
    let links = network.route_links(&entry.route)?;
    let Some(choice) = cheapest_path(&network.dnm, &links, &request)? else {
        tracing::info!(flow = %entry.name, "no admissible queue assignment");
        return Ok(Outcome::Rejected);
    };
    network.dnm.register(&choice.path, &request)?;
    tracing::info!(
        flow = %entry.name,
        cost = choice.cost,
        delay = choice.delay,
        "flow placed"
    );
    admitted.insert(entry.name.clone(), (choice.path.clone(), request));
    Ok(Outcome::Admitted(choice))
}
