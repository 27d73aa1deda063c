//! Signal engine: classifies one evaluation instant into a trading signal.
//!
//! The engine is a single pure function over the strategy configuration, the
//! oscillator readings of both timeframes and the current position. Enter
//! rules run only while flat on an enter-timeframe boundary; close rules run
//! only while in a position on an exit-timeframe boundary.

use std::fmt;

use crate::domain::position::Position;
use crate::domain::strategy::{ExitFilter, StrategyConfig, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    TakeLong,
    TakeShort,
    CloseLong,
    CloseShort,
    None,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::TakeLong => "take-long",
            Signal::TakeShort => "take-short",
            Signal::CloseLong => "close-long",
            Signal::CloseShort => "close-short",
            Signal::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdPair {
    pub k: f64,
    pub d: f64,
}

/// Current and previous %K/%D reading of one timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub current: KdPair,
    pub previous: KdPair,
}

impl Crossing {
    /// Builds a crossing only when all four values are defined.
    pub fn from_points(
        current_k: Option<f64>,
        current_d: Option<f64>,
        previous_k: Option<f64>,
        previous_d: Option<f64>,
    ) -> Option<Self> {
        Some(Crossing {
            current: KdPair {
                k: current_k?,
                d: current_d?,
            },
            previous: KdPair {
                k: previous_k?,
                d: previous_d?,
            },
        })
    }

    pub fn crossed_above(&self) -> bool {
        self.current.k > self.current.d && self.previous.k <= self.previous.d
    }

    pub fn crossed_below(&self) -> bool {
        self.current.k < self.current.d && self.previous.k >= self.previous.d
    }
}

/// Everything the engine needs to know about one evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInputs {
    pub enter: Option<Crossing>,
    pub exit: Option<Crossing>,
    pub hour: u32,
    pub enter_boundary: bool,
    pub exit_boundary: bool,
}

impl SignalInputs {
    pub fn is_ready(&self) -> bool {
        self.enter.is_some() && self.exit.is_some()
    }
}

pub fn evaluate(strategy: &StrategyConfig, inputs: &SignalInputs, position: Position) -> Signal {
    let (Some(enter), Some(exit)) = (inputs.enter, inputs.exit) else {
        return Signal::None;
    };

    match position {
        Position::Flat if inputs.enter_boundary => {
            if takes_long(strategy, &enter, &exit, inputs.hour) {
                Signal::TakeLong
            } else if takes_short(strategy, &enter, &exit, inputs.hour) {
                Signal::TakeShort
            } else {
                Signal::None
            }
        }
        Position::Long if inputs.exit_boundary => {
            if closes(strategy, exit.crossed_below(), inputs.hour) {
                Signal::CloseLong
            } else {
                Signal::None
            }
        }
        Position::Short if inputs.exit_boundary => {
            if closes(strategy, exit.crossed_above(), inputs.hour) {
                Signal::CloseShort
            } else {
                Signal::None
            }
        }
        _ => Signal::None,
    }
}

fn takes_long(strategy: &StrategyConfig, enter: &Crossing, exit: &Crossing, hour: u32) -> bool {
    let filter = match strategy.exit_filter {
        ExitFilter::WithTrend => exit.current.k > exit.current.d,
        ExitFilter::AgainstTrend => exit.current.k < exit.current.d,
        ExitFilter::Off => true,
    };
    enter.crossed_above()
        && enter.current.k < strategy.long_threshold
        && filter
        && strategy.in_session(hour)
}

fn takes_short(strategy: &StrategyConfig, enter: &Crossing, exit: &Crossing, hour: u32) -> bool {
    let filter = match strategy.exit_filter {
        ExitFilter::WithTrend => exit.current.k < exit.current.d,
        ExitFilter::AgainstTrend => exit.current.k > exit.current.d,
        ExitFilter::Off => true,
    };
    enter.crossed_below()
        && enter.current.k > strategy.short_threshold
        && filter
        && strategy.in_session(hour)
}

fn closes(strategy: &StrategyConfig, crossed: bool, hour: u32) -> bool {
    match strategy.kind {
        StrategyKind::Crossover => crossed,
        StrategyKind::SessionClose => crossed || hour >= strategy.end_hour,
    }
}
