//! `threadq countdown`: slow tasks that report progress, then a frame.

use super::WAIT_LIMIT;
use anyhow::Context;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use threadq::{Listener, Pool, PoolConfig, ReceptionContext, Submission, TaskArgs, Value};

pub fn execute(config: PoolConfig, tasks: usize, step_ms: u64) -> anyhow::Result<()> {
    let ctx = ReceptionContext::new("main");
    let pool = Pool::with_config(config).context("starting pool")?;
    let finished = Arc::new(AtomicUsize::new(0));
    let mut rng = rand::thread_rng();

    for n in 0..tasks {
        let start: i64 = rng.gen_range(1..=10);
        let done = finished.clone();
        let submission = Submission::new(count_down)
            .input("cdownv", start)
            .input("step", Duration::from_millis(step_ms))
            .requires("cdownv")
            .connect(
                "imgtime",
                Listener::value_text(move |v, label| {
                    let code = v.downcast_ref::<i64>().copied().unwrap_or_default();
                    println!("task {} from {}: {} {}", n, start, code, label);
                }),
            )
            .connect(
                "finished",
                Listener::unit(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                }),
            );
        pool.submit(submission)?;
    }

    if !ctx.run_until(|| finished.load(Ordering::SeqCst) == tasks, WAIT_LIMIT) {
        anyhow::bail!("timed out waiting for {} countdown tasks", tasks);
    }
    let stats = pool.stats();
    println!(
        "{} succeeded, {} failed, at most {} at once",
        stats.succeeded, stats.failed, stats.peak_active
    );
    Ok(())
}

fn count_down(args: &TaskArgs) -> anyhow::Result<()> {
    let start = *args.get::<i64>("cdownv")?;
    let step = args
        .get::<Duration>("step")
        .copied()
        .unwrap_or(Duration::from_millis(300));

    for left in (0..start).rev() {
        thread::sleep(step);
        let percent = (start - left) * 100 / start;
        args.progress().emit(percent)?;
    }
    args.imgtime().emit((Value::new(1234i64), "done"))?;
    Ok(())
}
