//! `threadq info`: display version, pool sizing and environment.

use crate::logging::LOG_ENV;
use threadq::{PoolConfig, SignalName, NUM_THREADS_ENV};

pub fn execute(threads: Option<usize>) -> anyhow::Result<()> {
    println!("threadq v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    println!("CPUs:         {}", PoolConfig::default().max_workers);
    match super::pool_config(threads) {
        Ok(config) => println!("Workers:      {}", config.max_workers),
        Err(e) => println!("Workers:      invalid ({:#})", e),
    }

    println!();
    println!("Signals:");
    for signal in SignalName::ALL {
        match signal.injected_param() {
            Some(param) => println!("  {:<9} {:<11} as {}", signal, signal.shape(), param),
            None => println!("  {:<9} {}", signal, signal.shape()),
        }
    }

    println!();
    println!("Environment:");
    print_env(NUM_THREADS_ENV);
    print_env(LOG_ENV);

    Ok(())
}

fn print_env(var: &str) {
    match std::env::var(var) {
        Ok(val) => println!("  {} = {}", var, val),
        Err(_) => println!("  {} = (default)", var),
    }
}
