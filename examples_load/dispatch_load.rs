use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use server_log_sink::trace::{TraceCollector, TrimRules};
use server_log_sink::{Entry, Logger, NoContext, SendError, Target};

/// Counts entries and drops them, to measure the cost of the logging path
/// itself (stack walk, entry assembly, dispatch).
#[derive(Default)]
struct CountingTarget(AtomicU64);

impl Target for CountingTarget {
    fn send(&self, _entry: &Entry) -> Result<(), SendError> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn main() {
    let counter = Arc::new(CountingTarget::default());
    let mut logger = Logger::new(TraceCollector::new(TrimRules::default()));
    logger.add_target(counter.clone());
    let logger = Arc::new(logger);

    let threads: u64 = 8;
    let per_thread: u64 = 5_000;
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                let err = std::io::Error::new(std::io::ErrorKind::Other, format!("load test error {t}"));
                for _ in 0..per_thread {
                    logger.log_always_if(&NoContext, Some(&err));
                }
            })
        })
        .collect();
    for h in handles {
        let _ = h.join();
    }

    let elapsed = start.elapsed();
    let n = counter.0.load(Ordering::Relaxed);
    println!("dispatched {} entries in {:?} (~{:.0} entries/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
