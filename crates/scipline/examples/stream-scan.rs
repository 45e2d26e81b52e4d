//! Stream scans for a few seconds while querying the device concurrently.
//!
//! Run with:
//!   cargo run --example stream-scan -- /dev/ttyACM0
//!   cargo run --example stream-scan -- tcp://192.168.0.10:10940

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scipline::engine::Engine;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());

    let engine = Engine::connect(&device)?;
    eprintln!("Connected to {device}");

    let scans = Arc::new(AtomicU64::new(0));
    engine.set_stream_handler({
        let scans = Arc::clone(&scans);
        move |_scan| {
            scans.fetch_add(1, Ordering::Relaxed);
        }
    });

    // Stream until QT; scan count 00 means unlimited.
    match engine.transact("MD0044072500000", 1000)? {
        Some(ack) => eprintln!("MD acknowledged with status {:?}", ack.status()),
        None => return Err("no reply to MD".into()),
    }

    // Transactions still work while scan data flows.
    for _ in 0..3 {
        thread::sleep(Duration::from_secs(1));
        match engine.transact("II", 500)? {
            Some(status) => eprintln!(
                "{} scans so far, II returned {} lines",
                scans.load(Ordering::Relaxed),
                status.len()
            ),
            None => eprintln!("II timed out"),
        }
    }

    engine.transact("QT", 1000)?;
    engine.close();
    eprintln!("stats: {:?}", engine.stats());
    Ok(())
}
