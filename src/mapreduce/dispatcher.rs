use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::{MapReduceOutput, Mapper, Reducer};

/// Spawns a mapper task per input item. Waits for a free slot before each spawn,
/// which pushes back on whoever feeds `input` when all slots are busy.
pub(super) async fn dispatch_mappers<M: Mapper>(
    mapper: Arc<M>,
    mut input: mpsc::Receiver<M::Input>,
    collector: mpsc::Sender<JoinHandle<M::Output>>,
    slots: Arc<Semaphore>,
) {
    while let Some(item) = input.recv().await {
        // The semaphore is never closed, so `None` cannot happen; the task still runs.
        let permit = slots.clone().acquire_owned().await.ok();
        let mapper = mapper.clone();
        let task = tokio::spawn(async move {
            let _permit = permit;
            mapper.map(item)
        });
        if collector.send(task).await.is_err() {
            warn!("reducer stopped early; mapper dispatch ends");
            break;
        }
    }
    // Dropping `collector` tells the reducer no more results are coming.
}

/// Awaits mapper tasks in submission order and folds their results.
pub(super) async fn drive_reducer<R: Reducer>(
    mut collector: mpsc::Receiver<JoinHandle<R::Input>>,
    mut reducer: R,
) -> MapReduceOutput<R::Output> {
    let mut reduced = 0u64;
    while let Some(task) = collector.recv().await {
        match task.await {
            Ok(item) => {
                reducer.reduce(item);
                reduced += 1;
            }
            Err(e) => error!(error = %e, "mapper task did not complete"),
        }
    }
    MapReduceOutput {
        output: reducer.finish(),
        reduced,
    }
}
