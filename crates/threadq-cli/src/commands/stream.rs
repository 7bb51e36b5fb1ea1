//! `threadq stream`: a producer task streaming frames until told to stop.

use super::WAIT_LIMIT;
use anyhow::Context;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use threadq::{Listener, Pool, PoolConfig, ReceptionContext, StopFlag, Submission, TaskArgs, Value};

const FRAME_WIDTH: usize = 64;
const FRAME_HEIGHT: usize = 48;

/// A fake grey-scale frame
#[derive(Debug)]
struct Frame {
    index: u64,
    pixels: Vec<u8>,
}

impl Frame {
    fn synthesize(index: u64) -> Self {
        let shift = (index % 256) as u8;
        let pixels = (0..FRAME_WIDTH * FRAME_HEIGHT)
            .map(|i| (i % FRAME_WIDTH) as u8 ^ shift)
            .collect();
        Self { index, pixels }
    }
}

/// Bounded queue that drops its backlog instead of blocking the producer
struct FrameQueue {
    frames: VecDeque<Value>,
    capacity: usize,
    cleared: usize,
}

impl FrameQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            cleared: 0,
        }
    }

    /// Enqueue a frame. Returns true if the queue was full and got cleared first.
    fn push(&mut self, frame: Value) -> bool {
        let full = self.frames.len() >= self.capacity;
        if full {
            self.frames.clear();
            self.cleared += 1;
        }
        self.frames.push_back(frame);
        full
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}

pub fn execute(
    config: PoolConfig,
    delay_ms: u64,
    frames: usize,
    queue_size: usize,
) -> anyhow::Result<()> {
    let ctx = ReceptionContext::new("main");
    let pool = Pool::with_config(config).context("starting pool")?;

    let stop = StopFlag::new();
    let queue = Arc::new(Mutex::new(FrameQueue::new(queue_size)));
    let received = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let produced = Arc::new(Mutex::new(None::<u64>));

    let sink = queue.clone();
    let count = received.clone();
    let done = finished.clone();
    let total = produced.clone();
    let submission = Submission::new(produce)
        .input("stop", stop.clone())
        .input("delay", Duration::from_millis(delay_ms))
        .requires("stop")
        .connect(
            "imgtime",
            Listener::value_text(move |frame, label| {
                count.fetch_add(1, Ordering::SeqCst);
                if sink.lock().push(frame) {
                    tracing::debug!(at = %label, "frame queue full, cleared");
                }
            }),
        )
        .connect(
            "result",
            Listener::value(move |v| *total.lock() = v.downcast_ref::<u64>().copied()),
        )
        .connect(
            "finished",
            Listener::unit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }),
        );

    let started = Instant::now();
    pool.submit(submission)?;

    let enough = ctx.run_until(|| received.load(Ordering::SeqCst) >= frames, WAIT_LIMIT);
    stop.stop();
    if !ctx.run_until(|| finished.load(Ordering::SeqCst) == 1, WAIT_LIMIT) {
        anyhow::bail!("stream producer did not stop");
    }
    if !enough {
        anyhow::bail!("timed out waiting for {} frames", frames);
    }

    let elapsed = started.elapsed().as_secs_f64();
    let got = received.load(Ordering::SeqCst);
    let fps = if elapsed > 0.0 { got as f64 / elapsed } else { 0.0 };
    let queue = queue.lock();
    println!("received {} frames in {:.2}s ({:.1} fps)", got, elapsed, fps);
    println!(
        "queue: {} buffered, cleared {} times",
        queue.len(),
        queue.cleared
    );
    if let Some(n) = *produced.lock() {
        println!("producer reported {} frames", n);
    }
    Ok(())
}

/// Emit frames until the stop flag drops; returns how many were sent
fn produce(args: &TaskArgs) -> anyhow::Result<u64> {
    let stop = args.get::<StopFlag>("stop")?;
    let delay = args
        .get::<Duration>("delay")
        .copied()
        .unwrap_or(Duration::from_millis(30));

    let started = Instant::now();
    let mut index = 0u64;
    while stop.is_running() {
        let frame = Frame::synthesize(index);
        tracing::trace!(frame = frame.index, bytes = frame.pixels.len(), "frame ready");
        let label = format!("{:.3}s", started.elapsed().as_secs_f64());
        args.imgtime().emit((Value::new(frame), label))?;
        index += 1;
        thread::sleep(delay);
    }
    Ok(index)
}
