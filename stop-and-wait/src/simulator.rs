//! In-memory lossy link for tests and the `simulate` command.
//!
//! [`SimulatedLink`] keeps one FIFO queue per destination address and applies
//! a configurable fault model to every packet offered to it:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Loss         | Drop a packet with probability `loss_rate`.              |
//! | Duplication  | Deliver a packet twice with probability `duplicate_rate`.|
//! | Drop rules   | Drop the next `n` packets matching a predicate.          |
//! | Fail rules   | Reject the next `n` matching sends with an I/O error.    |
//!
//! Random faults come from a seeded RNG, so a failing run can be replayed
//! with the same seed.  Rules are fully deterministic and take precedence
//! over random loss.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::link::{Link, LinkError};
use crate::packet::{Address, Packet};

/// Fault-model parameters.  Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that a packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered packet is delivered a second time.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // Transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

type Predicate = Box<dyn Fn(&Packet) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleAction {
    /// Accept the packet and lose it silently.
    Drop,
    /// Refuse the packet; `send` returns an error.
    Fail,
}

struct Rule {
    action: RuleAction,
    remaining: usize,
    predicate: Predicate,
}

struct Inner {
    queues: HashMap<Address, VecDeque<Packet>>,
    rng: StdRng,
    rules: Vec<Rule>,
    sent: Vec<Packet>,
    dropped: Vec<Packet>,
}

/// A fault-injecting, in-process [`Link`].
pub struct SimulatedLink {
    config: SimulatorConfig,
    inner: Mutex<Inner>,
}

impl SimulatedLink {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            inner: Mutex::new(Inner {
                queues: HashMap::new(),
                rng,
                rules: Vec::new(),
                sent: Vec::new(),
                dropped: Vec::new(),
            }),
        }
    }

    /// A link that never drops or duplicates on its own.
    pub fn reliable() -> Self {
        Self::new(SimulatorConfig::default())
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Drop the next `count` packets for which `predicate` holds.
    pub fn drop_matching<F>(&self, count: usize, predicate: F) -> Result<(), LinkError>
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        self.push_rule(RuleAction::Drop, count, Box::new(predicate))
    }

    /// Make the next `count` sends of packets matching `predicate` fail with
    /// an I/O error.  Failed sends are not recorded in [`sent`](Self::sent).
    pub fn fail_matching<F>(&self, count: usize, predicate: F) -> Result<(), LinkError>
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        self.push_rule(RuleAction::Fail, count, Box::new(predicate))
    }

    fn push_rule(
        &self,
        action: RuleAction,
        count: usize,
        predicate: Predicate,
    ) -> Result<(), LinkError> {
        self.lock()?.rules.push(Rule {
            action,
            remaining: count,
            predicate,
        });
        Ok(())
    }

    /// Queue `packet` for its destination, bypassing the fault model and the
    /// send log.
    pub fn inject(&self, packet: Packet) -> Result<(), LinkError> {
        let mut inner = self.lock()?;
        inner
            .queues
            .entry(packet.dst().clone())
            .or_default()
            .push_back(packet);
        Ok(())
    }

    /// Every packet offered through [`Link::send`], delivered or not.
    pub fn sent(&self) -> Vec<Packet> {
        self.lock().map(|inner| inner.sent.clone()).unwrap_or_default()
    }

    /// Packets the fault model discarded.
    pub fn dropped(&self) -> Vec<Packet> {
        self.lock()
            .map(|inner| inner.dropped.clone())
            .unwrap_or_default()
    }

    /// Packets waiting for `at`.
    pub fn pending(&self, at: &Address) -> usize {
        self.lock()
            .map(|inner| inner.queues.get(at).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LinkError> {
        self.inner.lock().map_err(|_| LinkError::Poisoned)
    }
}

impl Link for SimulatedLink {
    fn send(&self, packet: &Packet, from: &Address) -> Result<(), LinkError> {
        let mut inner = self.lock()?;

        let action = match inner
            .rules
            .iter_mut()
            .find(|rule| rule.remaining > 0 && (rule.predicate)(packet))
        {
            Some(rule) => {
                rule.remaining -= 1;
                Some(rule.action)
            }
            None => None,
        };
        inner.rules.retain(|rule| rule.remaining > 0);

        if action == Some(RuleAction::Fail) {
            log::debug!("[link] {from}: send of {packet} failed");
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated send failure",
            )));
        }
        inner.sent.push(packet.clone());

        let lost =
            action == Some(RuleAction::Drop) || roll(&mut inner.rng, self.config.loss_rate);
        if lost {
            log::debug!("[link] {from}: dropped {packet}");
            inner.dropped.push(packet.clone());
            return Ok(());
        }

        let duplicate = roll(&mut inner.rng, self.config.duplicate_rate);
        let queue = inner.queues.entry(packet.dst().clone()).or_default();
        queue.push_back(packet.clone());
        if duplicate {
            log::debug!("[link] {from}: duplicated {packet}");
            queue.push_back(packet.clone());
        }
        Ok(())
    }

    fn recv(&self, at: &Address) -> Result<Option<Packet>, LinkError> {
        let mut inner = self.lock()?;
        Ok(inner.queues.get_mut(at).and_then(VecDeque::pop_front))
    }
}

fn roll(rng: &mut StdRng, probability: f64) -> bool {
    probability > 0.0 && rng.random_bool(probability.min(1.0))
}
