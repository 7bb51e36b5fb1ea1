//! End-to-end pool scenarios
//!
//! Each test drives a real pool from the test thread, which owns the
//! reception context every listener runs on.
//!
//! # Running Tests
//! ```bash
//! cargo test --test scenarios
//! ```

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use threadq::{
    ErrorKind, Listener, Pool, ReceptionContext, StopFlag, Submission, TaskError, Value,
};

const TIMEOUT: Duration = Duration::from_secs(10);
const COLORS: [&str; 6] = ["r", "g", "b", "y", "c", "k"];

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let c = Arc::new(AtomicUsize::new(0));
    (c.clone(), c)
}

fn count_finished(n: &Arc<AtomicUsize>) -> Listener {
    let n = n.clone();
    Listener::unit(move || {
        n.fetch_add(1, Ordering::SeqCst);
    })
}

// ===== Color picker =====

#[test]
fn test_color_picker() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::new().unwrap();
    let picked = Arc::new(Mutex::new(Vec::new()));
    let (finished, done) = counter();

    for _ in 0..100 {
        let sink = picked.clone();
        let submission = Submission::new(|args| {
            let exclude = args.get::<String>("exclude")?;
            let choices: Vec<&str> = COLORS.iter().copied().filter(|c| *c != exclude.as_str()).collect();
            let color = choices
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| TaskError::bad_input("every color excluded"))?;
            args.info().emit(*color)?;
            Ok(())
        })
        .input("exclude", "r".to_string())
        .requires("exclude")
        .connect("info", Listener::text(move |c| sink.lock().push(c)))
        .connect("finished", count_finished(&finished));
        pool.submit(submission).unwrap();
    }

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 100, TIMEOUT));
    let picked = picked.lock();
    assert_eq!(picked.len(), 100);
    assert!(picked.iter().all(|c| c != "r"));
    assert!(picked.iter().all(|c| COLORS.contains(&c.as_str())));
}

// ===== Countdown =====

#[test]
fn test_countdown() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(4).unwrap();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let (finished, done) = counter();

    for _ in 0..4 {
        let sink = frames.clone();
        let start: i64 = rand::thread_rng().gen_range(1..=10);
        let submission = Submission::new(|args| {
            let mut n = *args.get::<i64>("cdownv")?;
            while n > 0 {
                thread::sleep(Duration::from_millis(3));
                n -= 1;
            }
            args.imgtime().emit((Value::new(1234i64), "done"))?;
            Ok(())
        })
        .input("cdownv", start)
        .connect(
            "imgtime",
            Listener::value_text(move |v, s| sink.lock().push((v, s))),
        )
        .connect("finished", count_finished(&finished));
        pool.submit(submission).unwrap();
    }

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 4, TIMEOUT));
    let frames = frames.lock();
    assert_eq!(frames.len(), 4);
    for (v, s) in frames.iter() {
        assert_eq!(v.downcast_ref::<i64>(), Some(&1234));
        assert_eq!(s, "done");
    }
}

// ===== Error surfacing =====

#[test]
fn test_error_surfaces_once() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(2).unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (results, result_count) = counter();
    let (finished, done) = counter();

    let sink = errors.clone();
    pool.submit(
        Submission::new(|_| -> anyhow::Result<()> { anyhow::bail!("deliberate") })
            .connect("error", Listener::error(move |e| sink.lock().push(e)))
            .connect(
                "result",
                Listener::value(move |_| {
                    results.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .connect("finished", count_finished(&finished)),
    )
    .unwrap();

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 1, TIMEOUT));
    assert!(pool.wait_idle(TIMEOUT));
    ctx.drain();

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::UserRaised);
    assert_eq!(errors[0].message, "deliberate");
    assert_eq!(result_count.load(Ordering::SeqCst), 0);
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

// ===== Concurrency cap =====

#[test]
fn test_concurrency_cap() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(2).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (finished, done) = counter();

    for _ in 0..5 {
        let running = running.clone();
        let peak = peak.clone();
        pool.submit(
            Submission::new(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .connect("finished", count_finished(&finished)),
        )
        .unwrap();
    }

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 5, TIMEOUT));
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(pool.stats().peak_active <= 2);
    assert_eq!(pool.stats().succeeded, 5);
}

#[test]
fn test_both_workers_run_together() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(2).unwrap();
    // Pairs of tasks can only pass the barrier if two run at the same time
    let barrier = Arc::new(Barrier::new(2));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (finished, done) = counter();

    for _ in 0..4 {
        let barrier = barrier.clone();
        let running = running.clone();
        let peak = peak.clone();
        pool.submit(
            Submission::new(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                barrier.wait();
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .connect("finished", count_finished(&finished)),
        )
        .unwrap();
    }

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 4, TIMEOUT));
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

// ===== Cooperative stop =====

#[test]
fn test_cooperative_stop() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(1).unwrap();
    let stop = StopFlag::new();
    let emitted = Arc::new(AtomicUsize::new(0));
    let (received, frames) = counter();
    let (finished, done) = counter();
    let order = Arc::new(Mutex::new(Vec::new()));

    let counter_in_task = emitted.clone();
    let frame_order = order.clone();
    let finish_order = order.clone();
    pool.submit(
        Submission::new(move |args| {
            let stop = args.get::<StopFlag>("stop")?;
            let mut frame = 0u64;
            while stop.is_running() {
                counter_in_task.fetch_add(1, Ordering::SeqCst);
                args.imgtime().emit((Value::new(frame), "frame"))?;
                frame += 1;
                thread::sleep(Duration::from_millis(2));
            }
            Ok(frame)
        })
        .input("stop", stop.clone())
        .connect(
            "imgtime",
            Listener::value_text(move |_, _| {
                received.fetch_add(1, Ordering::SeqCst);
                frame_order.lock().push("frame");
            }),
        )
        .connect(
            "finished",
            Listener::unit(move || {
                finished.fetch_add(1, Ordering::SeqCst);
                finish_order.lock().push("finished");
            }),
        ),
    )
    .unwrap();

    assert!(ctx.run_until(|| frames.load(Ordering::SeqCst) >= 3, TIMEOUT));
    stop.stop();
    let emitted_at_stop = emitted.load(Ordering::SeqCst);

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 1, TIMEOUT));
    let total = frames.load(Ordering::SeqCst);
    assert!(total >= emitted_at_stop);
    assert!(total <= emitted_at_stop + 1);
    assert_eq!(order.lock().last(), Some(&"finished"));
}

// ===== Ordering =====

#[test]
fn test_progress_ordering() {
    let ctx = ReceptionContext::new("ui");
    let pool = Pool::with_max_workers(2).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (finished, done) = counter();

    let sink = seen.clone();
    pool.submit(
        Submission::new(|args| {
            for n in [10i64, 40, 90] {
                args.progress().emit(n)?;
            }
            Ok(())
        })
        .connect("progress", Listener::int(move |n| sink.lock().push(n)))
        .connect("finished", count_finished(&finished)),
    )
    .unwrap();

    assert!(ctx.run_until(|| done.load(Ordering::SeqCst) == 1, TIMEOUT));
    assert_eq!(*seen.lock(), vec![10, 40, 90]);
}
