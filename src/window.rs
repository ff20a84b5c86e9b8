// Window lifecycle: OpenWindow -> SealingWindow -> SealedWindow.
//
// An open window owns one map-reduce job. Ingestion reaches it only through its
// WindowInput; the job drains and emits once every WindowInput clone is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::error::RouteError;
use crate::mapreduce::{self, MapReduceOutput};
use crate::models::{Aggregate, Key, Observation, WindowAggregates};
use crate::stats::{RequestStatMapper, RequestStatReducer};

/// Sending side of an open window.
#[derive(Debug)]
pub struct WindowInput {
    id: u64,
    tx: mpsc::Sender<Observation>,
}

impl WindowInput {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues one observation; waits while the window's dispatcher is saturated.
    pub async fn send(&self, observation: Observation) -> Result<(), RouteError> {
        self.tx
            .send(observation)
            .await
            .map_err(|_| RouteError::DispatcherGone(self.id))
    }
}

/// A window accepting observations.
#[derive(Debug)]
pub struct OpenWindow {
    id: u64,
    opened_at: DateTime<Utc>,
    job: JoinHandle<MapReduceOutput<WindowAggregates>>,
}

impl OpenWindow {
    /// Starts the window's dispatcher/reducer pair and returns its input.
    pub fn open(id: u64, max_workers: usize, input_capacity: usize) -> (Self, WindowInput) {
        let (tx, rx) = mpsc::channel(input_capacity.max(1));
        let job = mapreduce::spawn(
            Arc::new(RequestStatMapper),
            RequestStatReducer::new(),
            rx,
            max_workers,
        );
        let window = Self {
            id,
            opened_at: Utc::now(),
            job,
        };
        (window, WindowInput { id, tx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Marks the window sealed. The caller must already have unpublished its
    /// `WindowInput`; the job finishes once the last outstanding clone is dropped.
    pub fn seal(self) -> SealingWindow {
        SealingWindow {
            id: self.id,
            opened_at: self.opened_at,
            sealed_at: Utc::now(),
            job: self.job,
        }
    }
}

/// A window that no longer receives new routes and is draining.
#[derive(Debug)]
pub struct SealingWindow {
    id: u64,
    opened_at: DateTime<Utc>,
    sealed_at: DateTime<Utc>,
    job: JoinHandle<MapReduceOutput<WindowAggregates>>,
}

impl SealingWindow {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the dispatcher to drain and the reducer to emit.
    pub async fn finish(self) -> Result<SealedWindow, JoinError> {
        let MapReduceOutput { output, reduced } = self.job.await?;
        Ok(SealedWindow {
            id: self.id,
            opened_at: self.opened_at,
            sealed_at: self.sealed_at,
            observations: reduced,
            aggregates: output,
        })
    }
}

/// A frozen window, ready for the sink. Exposes no mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedWindow {
    id: u64,
    opened_at: DateTime<Utc>,
    sealed_at: DateTime<Utc>,
    observations: u64,
    aggregates: WindowAggregates,
}

impl SealedWindow {
    pub fn new(
        id: u64,
        opened_at: DateTime<Utc>,
        sealed_at: DateTime<Utc>,
        aggregates: WindowAggregates,
    ) -> Self {
        let observations = aggregates.values().map(|a| a.total_requests).sum();
        Self {
            id,
            opened_at,
            sealed_at,
            observations,
            aggregates,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    /// Observations folded into this window.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn aggregates(&self) -> &WindowAggregates {
        &self.aggregates
    }

    pub fn get(&self, key: &Key) -> Option<&Aggregate> {
        self.aggregates.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Entries sorted by key, for stable output.
    pub fn sorted(&self) -> Vec<(&Key, &Aggregate)> {
        let mut entries: Vec<_> = self.aggregates.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
