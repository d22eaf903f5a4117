//! Agent identity and the process-scoped resource registry
//!
//! Names are two-word petnames, unique within the process (retry on
//! collision, random hex as a last resort). The same module owns the
//! registry that enforces the global live-agent cap: acquiring a permit
//! increments the atomic counter, dropping it releases the slot exactly
//! once. The name ledger is append-only.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "bright", "calm", "clever", "crimson", "dapper", "eager", "fleet",
    "gentle", "golden", "hardy", "keen", "lively", "lucky", "mellow", "nimble", "quiet", "rapid",
    "sly", "steady", "swift", "vivid",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "crane", "falcon", "ferret", "finch", "fox", "heron", "ibex", "jackal",
    "kestrel", "lemur", "lynx", "marten", "mole", "otter", "owl", "panther", "raven", "seal",
    "stoat", "swift", "tern", "wolf",
];

const NAME_RETRIES: usize = 10;

/// Generate a two-word petname (no uniqueness guarantee)
pub fn generate_name() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-{}",
        ADJECTIVES.choose(&mut rng).unwrap(),
        NOUNS.choose(&mut rng).unwrap()
    )
}

/// Process-scoped resource manager for the agent swarm.
///
/// Owns the only shared mutable state between agents: the live counter and
/// the name ledger.
pub struct AgentRegistry {
    max_agents: usize,
    live: AtomicUsize,
    names: Mutex<HashSet<String>>,
}

impl AgentRegistry {
    pub fn new(max_agents: usize) -> Arc<Self> {
        Arc::new(Self {
            max_agents,
            live: AtomicUsize::new(0),
            names: Mutex::new(HashSet::new()),
        })
    }

    /// Number of currently live agents
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// The configured cap
    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    /// Best-effort check used before doing any expensive spawn work
    pub fn has_capacity(&self) -> bool {
        self.live_count() < self.max_agents
    }

    /// Atomically claim a live-agent slot. Returns `None` when the cap is
    /// reached; the slot is released when the permit drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AgentPermit> {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                if live < self.max_agents {
                    Some(live + 1)
                } else {
                    None
                }
            })
            .ok()?;
        Some(AgentPermit {
            registry: Arc::clone(self),
            released: false,
        })
    }

    /// Register a unique agent name. An explicit request wins even when it
    /// collides (callers overriding identity know what they are doing);
    /// generated names retry then fall back to random hex.
    pub fn reserve_name(&self, requested: Option<String>) -> String {
        let mut names = self.names.lock().expect("name ledger poisoned");

        if let Some(name) = requested {
            names.insert(name.clone());
            return name;
        }

        for _ in 0..NAME_RETRIES {
            let candidate = generate_name();
            if names.insert(candidate.clone()) {
                return candidate;
            }
        }

        let fallback = format!("agent-{:08x}", rand::thread_rng().gen::<u32>());
        names.insert(fallback.clone());
        fallback
    }
}

/// RAII slot in the agent registry; dropping releases the slot
pub struct AgentPermit {
    registry: Arc<AgentRegistry>,
    released: bool,
}

impl AgentPermit {
    /// Release the slot explicitly; safe to call once, drop is then a no-op
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for AgentPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}
