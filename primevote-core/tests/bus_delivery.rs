use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use primevote_core::{
    GenerationConfig, Notification, PoolSettings, PrimeContext, WorkerPool, listener,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_subscriber_does_not_starve_others_during_a_run() {
    let ctx = PrimeContext::new("votes", 16);
    let received = Arc::new(Mutex::new(Vec::new()));

    ctx.bus()
        .subscribe(listener(|_: &Notification| Err("audit log offline".into())));
    let sink = Arc::clone(&received);
    ctx.bus().subscribe(listener(move |n: &Notification| {
        sink.lock().push((n.sequence, n.prime));
        Ok(())
    }));

    let pool = WorkerPool::new(
        ctx.clone(),
        PoolSettings {
            deadline: Duration::from_secs(60),
            worker_pause: Duration::ZERO,
            seed: Some(11),
            announce_primes: true,
        },
    );
    let summary = pool
        .run(GenerationConfig::new(2, 500, 4))
        .await
        .expect("run");

    let received = received.lock();
    assert_eq!(received.len() as u64, ctx.bus().message_count());
    assert_eq!(
        received.iter().filter(|(_, prime)| prime.is_some()).count(),
        summary.primes_found
    );
    let mut sequences: Vec<u64> = received.iter().map(|(seq, _)| *seq).collect();
    sequences.sort_unstable();
    sequences.dedup();
    assert_eq!(sequences.len(), received.len());
}
