//! Decision strategies a player can be started with.
//!
//! A [`Strategy`] only sees the player's own [`PlayerState`] and the context sent with the
//! decision request; all randomness comes from the generator it is handed.
//!
//! # Provided strategies
//! - [`Fixed`]: always the same parity.
//! - [`Alternating`]: even, odd, even, ... by number of games played.
//! - [`Biased`]: even with a fixed probability.
//! - [`Counter`]: the parity the opponent picked most often against us.
//! - [`Uniform`]: a fair coin.

use std::fmt;

use clap::ValueEnum;
use rand::{Rng, RngCore};

use super::state::PlayerState;
use crate::game_interface::Parity;
use crate::protocol::messages::DecisionContext;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn choose(&self, state: &PlayerState, context: &DecisionContext, rng: &mut dyn RngCore)
        -> Parity;
}

fn coin(rng: &mut dyn RngCore) -> Parity {
    if rng.gen_bool(0.5) {
        Parity::Even
    } else {
        Parity::Odd
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub Parity);

impl Strategy for Fixed {
    fn name(&self) -> &'static str {
        match self.0 {
            Parity::Even => "always_even",
            Parity::Odd => "always_odd",
        }
    }

    fn choose(&self, _: &PlayerState, _: &DecisionContext, _: &mut dyn RngCore) -> Parity {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Alternating;

impl Strategy for Alternating {
    fn name(&self) -> &'static str {
        "alternating"
    }

    fn choose(&self, state: &PlayerState, _: &DecisionContext, _: &mut dyn RngCore) -> Parity {
        if state.games_played() % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Biased {
    /// Probability of answering even, in `0.0..=1.0`.
    pub even_probability: f64,
}

impl Strategy for Biased {
    fn name(&self) -> &'static str {
        if self.even_probability >= 0.5 {
            "biased_even"
        } else {
            "biased_odd"
        }
    }

    fn choose(&self, _: &PlayerState, _: &DecisionContext, rng: &mut dyn RngCore) -> Parity {
        if rng.gen_bool(self.even_probability.clamp(0.0, 1.0)) {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl Strategy for Counter {
    fn name(&self) -> &'static str {
        "counter"
    }

    fn choose(&self, state: &PlayerState, context: &DecisionContext, rng: &mut dyn RngCore) -> Parity {
        let (even, odd) = state
            .against(&context.opponent_id)
            .filter_map(|record| record.opponent_choice)
            .fold((0u32, 0u32), |(even, odd), choice| match choice {
                Parity::Even => (even + 1, odd),
                Parity::Odd => (even, odd + 1),
            });
        match even.cmp(&odd) {
            std::cmp::Ordering::Greater => Parity::Even,
            std::cmp::Ordering::Less => Parity::Odd,
            std::cmp::Ordering::Equal => coin(rng),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Strategy for Uniform {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&self, _: &PlayerState, _: &DecisionContext, rng: &mut dyn RngCore) -> Parity {
        coin(rng)
    }
}

/// Strategy names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum StrategyKind {
    AlwaysEven,
    AlwaysOdd,
    Alternating,
    BiasedEven,
    BiasedOdd,
    Counter,
    #[default]
    Random,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::AlwaysEven => Box::new(Fixed(Parity::Even)),
            StrategyKind::AlwaysOdd => Box::new(Fixed(Parity::Odd)),
            StrategyKind::Alternating => Box::new(Alternating),
            StrategyKind::BiasedEven => Box::new(Biased {
                even_probability: 0.7,
            }),
            StrategyKind::BiasedOdd => Box::new(Biased {
                even_probability: 0.3,
            }),
            StrategyKind::Counter => Box::new(Counter),
            StrategyKind::Random => Box::new(Uniform),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build().name())
    }
}
