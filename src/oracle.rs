//! The cyber oracle: canned answers with presentation hints.

use dashmap::DashMap;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Quantum,
    Network,
    Metaphysical,
    Systems,
}

pub const CATEGORIES: [Category; 4] = [
    Category::Quantum,
    Category::Network,
    Category::Metaphysical,
    Category::Systems,
];

/// Requested category; `Random` resolves to one concrete category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requested {
    Random,
    Fixed(Category),
}

impl FromStr for Requested {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Requested::Random),
            "quantum" => Ok(Requested::Fixed(Category::Quantum)),
            "network" => Ok(Requested::Fixed(Category::Network)),
            "metaphysical" => Ok(Requested::Fixed(Category::Metaphysical)),
            "systems" => Ok(Requested::Fixed(Category::Systems)),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub speed: u32,
    pub style: &'static str,
    pub glow_color: &'static str,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Quantum => "quantum",
            Category::Network => "network",
            Category::Metaphysical => "metaphysical",
            Category::Systems => "systems",
        }
    }

    #[must_use]
    pub fn answers(self) -> &'static [&'static str; 4] {
        match self {
            Category::Quantum => &QUANTUM,
            Category::Network => &NETWORK,
            Category::Metaphysical => &METAPHYSICAL,
            Category::Systems => &SYSTEMS,
        }
    }

    #[must_use]
    pub fn animation(self) -> Animation {
        let (speed, glow_color) = match self {
            Category::Quantum => (25, "0, 191, 255"),
            Category::Network => (30, "80, 200, 120"),
            Category::Metaphysical => (35, "147, 112, 219"),
            Category::Systems => (28, "255, 69, 0"),
        };
        Animation {
            speed,
            style: self.as_str(),
            glow_color,
        }
    }

    #[must_use]
    pub fn sound(self) -> &'static str {
        match self {
            Category::Quantum => "quantum",
            Category::Network => "digital",
            Category::Metaphysical => "ethereal",
            Category::Systems => "mechanical",
        }
    }
}

const QUANTUM: [&str; 4] = [
    "In the quantum world every state exists at once until it is observed. So your mind exists in many possible configurations.",
    "The border between past and present blurs in the flow of quantum fluctuations of consciousness. Identity is only a probability distribution in a neural network.",
    "Quantum entanglement shows that all particles are connected at a fundamental level. So your thoughts are linked with the thoughts of all humanity.",
    "The true nature of reality lies in the superposition of states. Every decision creates a new branch of the universe.",
];

const NETWORK: [&str; 4] = [
    "In the digital age we have become nodes in a global network. Individuality is just a unique combination of connections.",
    "Behind every decision hides an invisible algorithm shaped by millions of iterations of experience. Awareness is only the debugger of the mind.",
    "Information flows along neural paths like electrical pulses along wires. We are living computers processing reality.",
    "The web of connections defines our essence more than the individual nodes. We are a product of the collective mind.",
];

const METAPHYSICAL: [&str; 4] = [
    "Reality is just an agreed illusion, a simulation built on a limited perception of sensory data.",
    "Humanity is moving toward a singularity where the borders between mind and technology disappear. The evolution of consciousness is inevitable.",
    "Time is not an arrow but a river we float in. Past and future exist together in an eternal present.",
    "Consciousness is not a product of the brain but a fundamental property of the universe. We are the way the cosmos knows itself.",
];

const SYSTEMS: [&str; 4] = [
    "Paradoxes are not errors but bifurcation points of a system. They hold the potential for a qualitative leap.",
    "Expanding the space of thought requires reprogramming the mental architecture. New concepts are born where existing systems intersect.",
    "Every system strives for equilibrium, yet imbalance is what creates motion and growth. Chaos is order of a higher level.",
    "Complexity is born from simple rules repeated endlessly. We are the result of the evolution of simple algorithms.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: &'static str,
    pub category: Category,
    pub animation: Animation,
    pub sound: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleStats {
    pub total_requests: u64,
    pub categories: BTreeMap<Category, u64>,
}

/// Answer generator with in-process request counters.
#[derive(Default)]
pub struct Oracle {
    total: AtomicU64,
    per_category: DashMap<Category, u64>,
}

impl Oracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick an answer. The resolved category drives every field of the result.
    pub fn answer<R: Rng + ?Sized>(&self, requested: Requested, rng: &mut R) -> Answer {
        let category = match requested {
            Requested::Fixed(category) => category,
            Requested::Random => CATEGORIES[rng.gen_range(0..CATEGORIES.len())],
        };
        let answers = category.answers();
        let answer = answers.choose(rng).copied().unwrap_or(answers[0]);
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.per_category.entry(category).or_insert(0) += 1;
        Answer {
            answer,
            category,
            animation: category.animation(),
            sound: category.sound(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> OracleStats {
        let categories = CATEGORIES
            .iter()
            .map(|c| (*c, self.per_category.get(c).map_or(0, |n| *n)))
            .collect();
        OracleStats {
            total_requests: self.total.load(Ordering::Relaxed),
            categories,
        }
    }
}
