use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use agenda::catalog::InMemoryCatalog;
use agenda::model::*;
use agenda::notify::NotifyHub;
use agenda::schedule::ScheduleStore;
use agenda::storage::{MemoryStorage, ScheduleStorage, WalStorage};

const DAYS: u32 = 3;
const SLOTS_PER_DAY: u32 = 16;
const TRACKS: u32 = 4;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Three days, 30-minute slots, parallel tracks staggered by 15 minutes.
fn setup_catalog() -> (Arc<InMemoryCatalog>, Vec<SessionId>) {
    let catalog = Arc::new(InMemoryCatalog::new());
    let conf = Conference::new(Ulid::new(), "StressConf");
    let conf_id = conf.id;
    catalog.create_conference(conf).unwrap();

    let mut ids = Vec::new();
    for d in 0..DAYS {
        let date = NaiveDate::from_ymd_opt(2025, 10, 1 + d).unwrap();
        for slot in 0..SLOTS_PER_DAY {
            for track in 0..TRACKS {
                let minutes = 8 * 60 + slot * 30 + (track % 2) * 15;
                let start = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap();
                let end_minutes = minutes + 45;
                let end = NaiveTime::from_hms_opt(end_minutes / 60, end_minutes % 60, 0).unwrap();
                let s = Session::new(Ulid::new(), conf_id, "Talk", date, start, end)
                    .with_track(format!("Track {track}"));
                ids.push(s.id);
                catalog.add_session(s).unwrap();
            }
        }
    }
    println!("  catalog: {} sessions", ids.len());
    (catalog, ids)
}

async fn phase1_sequential(store: &ScheduleStore, ids: &[SessionId]) {
    let user = UserId::new("sequential");
    let mut latencies = Vec::with_capacity(ids.len());
    let start = Instant::now();
    for id in ids {
        let t = Instant::now();
        store.add_to_schedule(&user, *id).await.unwrap();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    println!(
        "  {} adds in {:.2}s ({:.0} ops/s)",
        ids.len(),
        elapsed.as_secs_f64(),
        ids.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("add (growing schedule)", &mut latencies);
    let conflicts = store.list_conflicts(&user).await.unwrap().len();
    println!("  conflicting entries: {conflicts}");
}

async fn phase2_concurrent(store: Arc<ScheduleStore>, ids: Arc<Vec<SessionId>>, users: usize) {
    let ops_per_user = 200;
    let start = Instant::now();
    let mut handles = Vec::new();
    for u in 0..users {
        let store = store.clone();
        let ids = ids.clone();
        handles.push(tokio::spawn(async move {
            let user = UserId::new(format!("user-{u}"));
            let mut latencies = Vec::with_capacity(ops_per_user);
            for i in 0..ops_per_user {
                let id = ids[(u * 7 + i * 13) % ids.len()];
                let t = Instant::now();
                if i % 3 == 2 {
                    store.remove_from_schedule(&user, id).await.unwrap();
                } else {
                    store.add_to_schedule(&user, id).await.unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    println!(
        "  {users} users x {ops_per_user} ops in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        all.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("add/remove", &mut all);
}

async fn phase3_reads_under_load(store: Arc<ScheduleStore>, ids: Arc<Vec<SessionId>>) {
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..8 {
        let store = store.clone();
        let ids = ids.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let user = UserId::new(format!("writer-{w}"));
            let mut i = 0usize;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let id = ids[(w * 31 + i) % ids.len()];
                let _ = store.toggle_session(&user, id, i % 2 == 1).await;
                i += 1;
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..8 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            let user = UserId::new(format!("writer-{r}"));
            let mut latencies = Vec::with_capacity(500);
            for _ in 0..500 {
                let t = Instant::now();
                store.list_conflicts(&user).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("list_conflicts", &mut all);
}

async fn phase4_compaction(store: &ScheduleStore) {
    let before = store.appends_since_compact().await;
    let t = Instant::now();
    store.compact().await.unwrap();
    println!(
        "  compacted {before} appends over {} users in {:.2}ms",
        store.user_count(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let users: usize = std::env::var("AGENDA_BENCH_USERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);
    let durable = std::env::var("AGENDA_BENCH_WAL").is_ok_and(|v| v == "1");

    println!("=== agenda stress benchmark ===");
    println!("users: {users}, storage: {}\n", if durable { "wal" } else { "memory" });

    println!("[setup]");
    let (catalog, ids) = setup_catalog();
    let storage: Arc<dyn ScheduleStorage> = if durable {
        let dir = std::env::temp_dir().join(format!("agenda_bench_{}", Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        Arc::new(WalStorage::open(&dir.join("schedule.wal")).unwrap())
    } else {
        Arc::new(MemoryStorage::new())
    };
    let store = Arc::new(
        ScheduleStore::open(storage, catalog, Arc::new(NotifyHub::new()))
            .await
            .unwrap(),
    );
    let ids = Arc::new(ids);

    println!("\n[phase 1] sequential adds for one user");
    phase1_sequential(&store, &ids).await;

    println!("\n[phase 2] concurrent users");
    phase2_concurrent(store.clone(), ids.clone(), users).await;

    println!("\n[phase 3] conflict reads under write load");
    phase3_reads_under_load(store.clone(), ids.clone()).await;

    println!("\n[phase 4] compaction");
    phase4_compaction(&store).await;

    println!("\n=== benchmark complete ===");
}
