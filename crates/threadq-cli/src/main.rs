//! threadq demo CLI
//!
//! Headless versions of the pool's example programs: each subcommand owns a
//! reception context on the main thread, submits work, and prints what its
//! listeners receive.

use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "threadq")]
#[command(about = "Bounded worker pool demos", long_about = None)]
#[command(version)]
struct Cli {
    /// Worker threads (default: THREADQ_NUM_THREADS, then one per CPU)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick random colours on worker threads
    Colors {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 100)]
        tasks: usize,
        /// Colour the tasks must never pick
        #[arg(short, long, default_value = "r")]
        exclude: String,
    },

    /// Run countdown tasks that report back when done
    Countdown {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 4)]
        tasks: usize,
        /// Sleep per countdown step, in milliseconds
        #[arg(long, default_value_t = 300)]
        step_ms: u64,
    },

    /// Stream fake frames until enough have arrived, then stop the producer
    Stream {
        /// Delay between frames, in milliseconds
        #[arg(short, long, default_value_t = 30)]
        delay_ms: u64,
        /// Frames to receive before stopping
        #[arg(short, long, default_value_t = 100)]
        frames: usize,
        /// Frame queue capacity; the queue is cleared when full
        #[arg(short, long, default_value_t = 16)]
        queue_size: usize,
    },

    /// Show version, worker count and environment
    Info,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Commands::Colors { tasks, exclude } => {
            commands::colors::execute(commands::pool_config(cli.threads)?, tasks, exclude)
        }
        Commands::Countdown { tasks, step_ms } => {
            commands::countdown::execute(commands::pool_config(cli.threads)?, tasks, step_ms)
        }
        Commands::Stream {
            delay_ms,
            frames,
            queue_size,
        } => commands::stream::execute(
            commands::pool_config(cli.threads)?,
            delay_ms,
            frames,
            queue_size,
        ),
        Commands::Info => commands::info::execute(cli.threads),
    }
}
