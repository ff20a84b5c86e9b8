// Domain models: parsed observations, aggregation keys and per-key counters.

mod aggregate;
mod key;
mod observation;

pub use aggregate::{Aggregate, PartialStat, WindowAggregates, is_success};
pub use key::{Key, KeyParseError};
pub use observation::Observation;
