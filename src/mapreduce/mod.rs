// Generic bounded map-reduce over a tokio channel.
//
// A dispatcher task spawns one mapper task per input item, never more than
// `max_workers` running at once, and queues the task handles in submission order.
// The reducer task awaits those handles front to back, so the reducer sees results
// in the order items were received even though mappers run concurrently.

mod dispatcher;

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

/// Default cap on concurrently running mapper tasks.
pub const MAX_WORKERS: usize = 10;

/// Pure per-item transformation.
pub trait Mapper: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn map(&self, input: Self::Input) -> Self::Output;
}

/// Ordered fold over mapper outputs. `finish` consumes the reducer and emits the result once.
pub trait Reducer: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn reduce(&mut self, item: Self::Input);

    fn finish(self) -> Self::Output;
}

/// What the reducer emitted, plus how many items it folded.
#[derive(Debug)]
pub struct MapReduceOutput<O> {
    pub output: O,
    pub reduced: u64,
}

/// Starts a map-reduce job over `input`.
///
/// The job runs until every sender for `input` is dropped; it then finishes the
/// in-flight mapper tasks, folds the remaining results and resolves the returned
/// handle with the reducer's output.
pub fn spawn<M, R>(
    mapper: Arc<M>,
    reducer: R,
    input: mpsc::Receiver<M::Input>,
    max_workers: usize,
) -> JoinHandle<MapReduceOutput<R::Output>>
where
    M: Mapper,
    R: Reducer<Input = M::Output>,
{
    let max_workers = max_workers.max(1);
    let slots = Arc::new(Semaphore::new(max_workers));
    let (collector_tx, collector_rx) = mpsc::channel(max_workers);

    tokio::spawn(dispatcher::dispatch_mappers(
        mapper,
        input,
        collector_tx,
        slots,
    ));
    tokio::spawn(dispatcher::drive_reducer(collector_rx, reducer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowIdentity;

    impl Mapper for SlowIdentity {
        type Input = u64;
        type Output = u64;

        fn map(&self, input: u64) -> u64 {
            // Later items finish first, so ordering must come from the collector queue.
            std::thread::sleep(Duration::from_millis((20 - input % 20) / 4));
            input
        }
    }

    #[derive(Default)]
    struct Collect(Vec<u64>);

    impl Reducer for Collect {
        type Input = u64;
        type Output = Vec<u64>;

        fn reduce(&mut self, item: u64) {
            self.0.push(item);
        }

        fn finish(self) -> Vec<u64> {
            self.0
        }
    }

    struct Tracking {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Mapper for Tracking {
        type Input = u64;
        type Output = u64;

        fn map(&self, input: u64) -> u64 {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            input
        }
    }

    /// Holds every mapper until `open` is set.
    struct Gated {
        open: AtomicBool,
    }

    impl Mapper for Gated {
        type Input = u64;
        type Output = u64;

        fn map(&self, input: u64) -> u64 {
            tokio::task::block_in_place(|| {
                while !self.open.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            });
            input
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn saturated_dispatcher_blocks_instead_of_dropping() {
        let mapper = Arc::new(Gated {
            open: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::channel(1);
        let job = spawn(mapper.clone(), Collect::default(), rx, 1);

        // One item held by the only mapper, one waiting for a slot, one buffered.
        for i in 0..3 {
            tx.send(i).await.unwrap();
        }
        let blocked = tokio::time::timeout(Duration::from_millis(100), tx.send(3)).await;
        assert!(blocked.is_err(), "send should wait while every slot is busy");

        mapper.open.store(true, Ordering::SeqCst);
        tx.send(3).await.unwrap();
        drop(tx);
        let out = job.await.unwrap();
        assert_eq!(out.reduced, 4);
        assert_eq!(out.output, vec![0, 1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_arrive_in_submission_order() {
        let (tx, rx) = mpsc::channel(8);
        let job = spawn(Arc::new(SlowIdentity), Collect::default(), rx, 4);
        for i in 0..100 {
            tx.send(i).await.unwrap();
        }
        drop(tx);
        let out = job.await.unwrap();
        assert_eq!(out.reduced, 100);
        assert_eq!(out.output, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_mappers_never_exceed_cap() {
        let mapper = Arc::new(Tracking {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::channel(64);
        let job = spawn(mapper.clone(), Collect::default(), rx, 2);
        for i in 0..40 {
            tx.send(i).await.unwrap();
        }
        drop(tx);
        let out = job.await.unwrap();
        assert_eq!(out.output.len(), 40);
        assert!(mapper.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn closed_input_without_items_emits_empty_result() {
        let (tx, rx) = mpsc::channel::<u64>(1);
        drop(tx);
        let out = spawn(Arc::new(SlowIdentity), Collect::default(), rx, MAX_WORKERS)
            .await
            .unwrap();
        assert_eq!(out.reduced, 0);
        assert!(out.output.is_empty());
    }

    #[tokio::test]
    async fn zero_workers_is_treated_as_one() {
        let (tx, rx) = mpsc::channel(4);
        let job = spawn(Arc::new(SlowIdentity), Collect::default(), rx, 0);
        tx.send(7).await.unwrap();
        drop(tx);
        assert_eq!(job.await.unwrap().output, vec![7]);
    }
}
