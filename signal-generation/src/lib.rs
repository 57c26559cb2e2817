// Indicator engine
// Turns candle series into per-bar signals, derived signal state and graded outcomes

pub mod derivation;
pub mod grader;
pub mod registry;
pub mod series;
pub mod signals;
pub mod strategies;

pub use derivation::{build_levels, derive_state, SignalLevels, SignalState, DEFAULT_MAX_SIGNAL_AGE_BARS};
pub use grader::{grade, GradedOutcome};
pub use registry::{IndicatorInfo, IndicatorRegistry};
pub use signals::{Direction, IndicatorResult};
pub use strategies::{AnalysisContext, IndicatorStrategy, StrategyOutput, StrategySettings};
