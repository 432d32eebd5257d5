//! Worker process bootstrap

use std::{env, process};

use swgrid_worker::config::WorkerConfig;
use swgrid_worker::worker::benchmark::{self, ProbeOptions};
use swgrid_worker::worker::client::RestClient;
use swgrid_worker::worker::WorkerOrchestrator;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = WorkerConfig::from_env().with_address_arg(args.get(1).map(String::as_str));
    log::info!("coordinator address: {}", config.coordinator);

    log::info!("benchmarking worker...");
    let report = benchmark::probe(&ProbeOptions::default());
    log::info!(
        "benchmark result: {:.0} MCUPS on {} cores",
        report.benchmark_result as f64 / 1e6,
        report.cpu_cores
    );

    let client = match RestClient::new(&config.coordinator, config.request_timeout) {
        Ok(client) => client,
        Err(error) => {
            log::error!("failed to build coordinator client: {}", error);
            process::exit(1);
        }
    };

    let orchestrator = WorkerOrchestrator::new(client, config);
    orchestrator.run(report);

    // run() only returns once the coordinator has dropped this worker.
    log::error!("worker deregistered by coordinator; exiting");
    process::exit(1);
}
