//! `simulate` subcommand: a summarizer against an in-process sequencer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use opsum_config::Config;
use opsum_protocols::{
    LatestAckRefresher, MessageType, OpSource, RunOutcome, SummarizerHost, SummaryContext,
    SummaryError,
};
use opsum_runtime::{
    LocalSession, SessionSummaryGenerator, Summarizer, SummarizerHandoff, SummarizerOptions,
};

const SUMMARIZER_CLIENT: &str = "summarizer";
const PARENT_CLIENT: &str = "parent";

/// Totals printed when the simulation ends.
#[derive(Debug, Default, Serialize)]
pub(crate) struct SimulationReport {
    pub ops: u64,
    pub summaries: u64,
    pub acked: u64,
    pub nacked: u64,
    pub refreshes: u64,
    pub final_sequence_number: u64,
    pub outcome: String,
}

#[derive(Default)]
struct Counters {
    summaries: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    refreshes: AtomicU64,
}

/// Counts baseline refreshes; the simulated document has nothing to reload.
struct CountingRefresher {
    counters: Arc<Counters>,
}

#[async_trait]
impl LatestAckRefresher for CountingRefresher {
    async fn refresh_latest_ack(
        &self,
        context: SummaryContext,
        reference_sequence_number: u64,
    ) -> Result<(), SummaryError> {
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        debug!(
            proposal_handle = %context.proposal_handle,
            ack_handle = %context.ack_handle,
            reference_sequence_number,
            "Baseline refreshed"
        );
        Ok(())
    }
}

/// Handle the `simulate` subcommand.
pub(crate) async fn handle_simulate(
    mut config: Config,
    ops: Option<u64>,
    nack_every: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(ops) = ops {
        config.simulation.ops = ops;
    }
    if let Some(nack_every) = nack_every {
        config.simulation.nack_every = nack_every;
    }

    let report = simulate(&config).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        println!("ops sequenced:      {}", report.ops);
        println!("summaries proposed: {}", report.summaries);
        println!("summaries acked:    {}", report.acked);
        println!("summaries nacked:   {}", report.nacked);
        println!("baseline refreshes: {}", report.refreshes);
        println!("final sequence:     {}", report.final_sequence_number);
        println!("run outcome:        {}", report.outcome);
    }
    Ok(())
}

/// Run one simulated session to completion.
pub(crate) async fn simulate(config: &Config) -> anyhow::Result<SimulationReport> {
    let simulation = &config.simulation;
    let counters = Arc::new(Counters::default());

    let session = LocalSession::new(0);
    session.join(PARENT_CLIENT);
    session.connect(SUMMARIZER_CLIENT);
    session.set_summarizer_client_id(Some(PARENT_CLIENT.to_string()));
    install_sequencer_verdicts(
        &session,
        counters.clone(),
        simulation.ack_delay(),
        simulation.nack_every,
    );

    let summarizer = Summarizer::new(SummarizerOptions {
        host: Arc::new(session.clone()),
        configuration: config.summary.clone(),
        generator: Arc::new(SessionSummaryGenerator::new(session.clone())),
        refresher: Arc::new(CountingRefresher {
            counters: counters.clone(),
        }),
        handoff: SummarizerHandoff::new(),
        summary_collection: None,
    });

    info!(
        ops = simulation.ops,
        nack_every = simulation.nack_every,
        max_ops = config.summary.max_ops,
        "Starting simulation"
    );
    let runner = summarizer.clone();
    let run = tokio::spawn(async move { runner.run(PARENT_CLIENT).await });

    for i in 0..simulation.ops {
        session.submit_op(PARENT_CLIENT, json!({ "insert": i }));
        tokio::time::sleep(simulation.op_interval()).await;
    }

    // Let the last verdict land before stopping.
    let flush_wait = simulation.ack_delay() * 2 + Duration::from_millis(50);
    if tokio::time::timeout(flush_wait, summarizer.summary_collection().wait_flushed())
        .await
        .is_err()
    {
        warn!("Summaries still pending at end of simulation");
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    summarizer.stop("simulationComplete");
    let outcome = run.await.context("summarizer task failed")?;
    let outcome = match outcome {
        RunOutcome::Stopped => "stopped".to_string(),
        other => format!("{:?}", other),
    };

    Ok(SimulationReport {
        ops: simulation.ops,
        summaries: counters.summaries.load(Ordering::SeqCst),
        acked: counters.acked.load(Ordering::SeqCst),
        nacked: counters.nacked.load(Ordering::SeqCst),
        refreshes: counters.refreshes.load(Ordering::SeqCst),
        final_sequence_number: session.sequence_number(),
        outcome,
    })
}

/// Answer every summarize op after `delay`, rejecting every `nack_every`-th.
fn install_sequencer_verdicts(
    session: &LocalSession,
    counters: Arc<Counters>,
    delay: Duration,
    nack_every: u32,
) {
    let runtime = tokio::runtime::Handle::current();
    let sequencer = session.clone();
    session.inbound_ops().subscribe(Arc::new(move |event| {
        let Ok(op) = event else {
            return;
        };
        if op.message_type != MessageType::Summarize || sequencer.disposed() {
            return;
        }

        let count = counters.summaries.fetch_add(1, Ordering::SeqCst) + 1;
        let summary_sequence_number = op.sequence_number;
        let reject = nack_every > 0 && count % u64::from(nack_every) == 0;
        let sequencer = sequencer.clone();
        let counters = counters.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if sequencer.disposed() {
                return;
            }
            if reject {
                counters.nacked.fetch_add(1, Ordering::SeqCst);
                sequencer.nack_summary(summary_sequence_number, "rejected by simulated storage");
            } else {
                counters.acked.fetch_add(1, Ordering::SeqCst);
                sequencer.ack_summary(
                    summary_sequence_number,
                    &format!("ack-{}", summary_sequence_number),
                );
            }
        });
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsum_config::ConfigLoader;

    fn small_config(nack_every: u32) -> Config {
        let mut config = ConfigLoader::load_str(
            r#"
            [summary]
            idle_time_ms = 100
            max_time_ms = 10000
            max_ops = 10
            max_ack_wait_time_ms = 500

            [simulation]
            ops = 25
            op_interval_ms = 1
            ack_delay_ms = 5
            "#,
        )
        .expect("config");
        config.simulation.nack_every = nack_every;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_acks_summaries() {
        let report = simulate(&small_config(0)).await.expect("simulate");
        assert_eq!(report.ops, 25);
        assert!(report.summaries >= 2);
        assert_eq!(report.nacked, 0);
        assert!(report.acked >= 2);
        assert!(report.refreshes >= 1 && report.refreshes <= report.acked);
        assert_eq!(report.outcome, "stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_nacks_every_other_summary() {
        let report = simulate(&small_config(2)).await.expect("simulate");
        assert!(report.nacked >= 1);
        assert_eq!(report.summaries, report.acked + report.nacked);
    }
}
