//! `threadq colors`: random colour picks delivered on `info`.

use super::WAIT_LIMIT;
use anyhow::Context;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use threadq::{Listener, Pool, PoolConfig, ReceptionContext, Submission, TaskArgs, TaskError};

const COLORS: [&str; 6] = ["r", "g", "b", "y", "c", "k"];

pub fn execute(config: PoolConfig, tasks: usize, exclude: String) -> anyhow::Result<()> {
    let ctx = ReceptionContext::new("main");
    let pool = Pool::with_config(config).context("starting pool")?;

    let tally = Arc::new(Mutex::new(BTreeMap::<String, usize>::new()));
    let finished = Arc::new(AtomicUsize::new(0));

    for _ in 0..tasks {
        let sink = tally.clone();
        let done = finished.clone();
        let submission = Submission::new(pick_color)
            .input("exclude", exclude.clone())
            .requires("exclude")
            .connect(
                "info",
                Listener::text(move |color| *sink.lock().entry(color).or_default() += 1),
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
        anyhow::bail!("timed out waiting for {} colour tasks", tasks);
    }

    for (color, count) in tally.lock().iter() {
        println!("{}: {}", color, count);
    }
    Ok(())
}

/// Pick any colour except the excluded one and announce it
fn pick_color(args: &TaskArgs) -> anyhow::Result<String> {
    let exclude = args.get::<String>("exclude")?;
    let choices: Vec<&str> = COLORS
        .iter()
        .copied()
        .filter(|c| *c != exclude.as_str())
        .collect();
    let color = choices
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| TaskError::bad_input(format!("no colour left after excluding {:?}", exclude)))?;
    args.info().emit(*color)?;
    Ok(color.to_string())
}
