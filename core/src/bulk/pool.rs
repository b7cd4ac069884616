use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;

/// Runs `work(index)` for every index in `0..total` on at most
/// `concurrency` logically concurrent workers.
///
/// Workers claim indexes from one shared monotonically increasing cursor,
/// so no index is processed twice and no worker idles while work remains.
/// After finishing an item a worker sleeps `pacing` before its next claim
/// (skipped once the queue is drained) — this spaces out request starts
/// without capping throughput below `concurrency`. Returns only when all
/// workers have drained the queue.
pub(crate) async fn run_claim_pool<F, Fut>(total: usize, concurrency: usize, pacing: Duration, work: F)
where
    F: Fn(usize) -> Fut + Sync,
    Fut: Future<Output = ()> + Send,
{
    if total == 0 {
        return;
    }

    let cursor = AtomicUsize::new(0);
    let cursor = &cursor;
    let work = &work;

    let worker_count = concurrency.clamp(1, total);
    let workers = (0..worker_count).map(|_| async move {
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= total {
                break;
            }
            work(index).await;
            if !pacing.is_zero() && cursor.load(Ordering::SeqCst) < total {
                sleep(pacing).await;
            }
        }
    });
    futures::future::join_all(workers).await;
}
