// Request statistics map-reduce: observation -> (key, partial stat) -> per-key aggregates.

use crate::mapreduce::{Mapper, Reducer};
use crate::models::{Key, Observation, PartialStat, WindowAggregates, is_success};

/// Pure mapping step; never fails because the parser already defaulted bad values.
pub fn map_observation(observation: Observation) -> (Key, PartialStat) {
    let stat = PartialStat {
        success: is_success(observation.status_code),
        status_code: observation.status_code,
        response_time: observation.response_time,
    };
    (observation.key(), stat)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestStatMapper;

impl Mapper for RequestStatMapper {
    type Input = Observation;
    type Output = (Key, PartialStat);

    fn map(&self, input: Observation) -> (Key, PartialStat) {
        map_observation(input)
    }
}

/// Folds partial stats into the open window's `key -> Aggregate` mapping.
/// `finish` consumes the reducer, so nothing can mutate the mapping after emission.
#[derive(Debug, Default)]
pub struct RequestStatReducer {
    aggregates: WindowAggregates,
}

impl RequestStatReducer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reducer for RequestStatReducer {
    type Input = (Key, PartialStat);
    type Output = WindowAggregates;

    fn reduce(&mut self, (key, stat): (Key, PartialStat)) {
        self.aggregates.entry(key).or_default().record(&stat);
    }

    fn finish(self) -> WindowAggregates {
        self.aggregates
    }
}
