use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tickclock::core::{ClockConfig, Timestamp};
use tickclock::time::{spawn_ticker, util::offset_nanos, ManualTickSource, PpsSink, SoftClock};
use tickclock::util::ThreadRngEntropy;
use tracing_subscriber::EnvFilter;

/// Prints the time of day on every pulse, like the board console does
struct ConsolePps {
    clock_seconds: AtomicU64,
}

impl PpsSink for ConsolePps {
    fn set_level(&self, _high: bool) {}

    fn second_elapsed(&self, seconds: u32) {
        self.clock_seconds.store(seconds as u64, Ordering::Relaxed);
        let time = Timestamp::new(seconds, 0).unwrap_or_default();
        println!("PPS  {}", time.to_gmt_string());
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 10 MHz timer, 100 Hz tick: one count is 100 ns
    let config = ClockConfig {
        sys_clock_hz: 10_000_000,
        ticks_per_second: 100,
        ..Default::default()
    };
    let tick_period = Duration::from_millis(1000 / config.ticks_per_second as u64);

    let pps = Arc::new(ConsolePps {
        clock_seconds: AtomicU64::new(0),
    });
    let clock = SoftClock::builder(config, ManualTickSource::new(config.nominal_reload()))
        .pps(pps.clone())
        .build()
        .expect("valid clock configuration");
    let clock = Arc::new(clock);

    println!("Software clock configuration:");
    println!("- Timer clock: {} Hz", config.sys_clock_hz);
    println!("- Tick rate: {} Hz", config.ticks_per_second);
    println!("- Nominal reload: {} counts", config.nominal_reload());

    // Step to host time, as a protocol engine would on its first sync
    let host = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let start = Timestamp::new(host.as_secs() as u32, host.subsec_nanos())
        .expect("sub-second nanoseconds");
    clock.set_time(start);

    // Lengthen every second by 1 us
    clock.adj_freq(-1000);
    println!("\nPending schedule: {:?}", clock.pending_schedule());

    let ticker = spawn_ticker(clock.clone(), tick_period);
    tokio::time::sleep(Duration::from_secs(3)).await;
    ticker.abort();

    let now = clock.get_time();
    println!("\nClock: {} ({})", now, now.to_gmt_string());
    println!("Elapsed on clock: {} ns", offset_nanos(now, start));
    println!("Active schedule: {:?}", clock.active_schedule());
    println!("Jitter draw: {}", clock.draw_from(&mut ThreadRngEntropy));
    println!(
        "Stats: {}",
        serde_json::to_string(&clock.stats()).unwrap_or_default()
    );
    println!("Last PPS second: {}", pps.clock_seconds.load(Ordering::Relaxed));
}
