use std::time::Instant;

use clap::Parser;
use rc::{DynamicRc, ManualRef, SoloRc, SyncRc};
use wechsel::{build_tree, run_dynamic, run_sync, StressConfig, TreeRef};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of parallel workers in the stress phase
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Trees built and published per worker
    #[arg(long, default_value_t = 100)]
    rounds: usize,

    /// Field count of every node
    #[arg(long, default_value_t = 2)]
    arity: usize,

    /// Depth of the built trees
    #[arg(long, default_value_t = 10)]
    depth: usize,
}

fn timed_single_thread<R: TreeRef>(name: &str, arity: usize, depth: usize) {
    let start = Instant::now();
    build_tree::<R>(arity, depth).release();
    println!("single-thread {name:<8} {:?}", start.elapsed());
}

fn main() {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    let config = StressConfig {
        workers: cli.workers,
        rounds: cli.rounds,
        field_length: cli.arity,
        depth: cli.depth,
    };
    tracing::info!(?config, "starting validation run");

    timed_single_thread::<ManualRef>("manual", cli.arity, cli.depth);
    timed_single_thread::<SoloRc>("solo", cli.arity, cli.depth);
    timed_single_thread::<SyncRc>("sync", cli.arity, cli.depth);
    timed_single_thread::<DynamicRc>("dynamic", cli.arity, cli.depth);

    let start = Instant::now();
    run_sync(&config);
    println!("multi-thread  sync     {:?}", start.elapsed());

    let start = Instant::now();
    run_dynamic(&config);
    println!("multi-thread  dynamic  {:?}", start.elapsed());

    #[cfg(feature = "validation")]
    {
        let live = object::live_nodes();
        println!("live nodes at exit: {live}");
        if live != 0 {
            eprintln!("error: {live} nodes leaked or double-freed");
            std::process::exit(1);
        }
    }
}
