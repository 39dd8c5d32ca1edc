use std::path::Path;

use berth_core::BerthConfig;
use berth_rank::{AllocMetric, RankStack, RankedNode};
use serde::Serialize;
use tracing::info;

use crate::fixture::ClusterFixture;

#[derive(Debug, Serialize)]
struct RankReport {
    job_id: String,
    state_index: u64,
    nodes: Vec<NodeReport>,
    metrics: AllocMetric,
}

#[derive(Debug, Serialize)]
struct NodeReport {
    node_id: String,
    score: f64,
    scores: Vec<StageScore>,
}

#[derive(Debug, Serialize)]
struct StageScore {
    stage: &'static str,
    score: f64,
}

impl From<&RankedNode> for NodeReport {
    fn from(option: &RankedNode) -> Self {
        NodeReport {
            node_id: option.node_id().to_string(),
            score: option.score,
            scores: option
                .scores
                .iter()
                .map(|&(stage, score)| StageScore { stage, score })
                .collect(),
        }
    }
}

pub fn rank(cluster: &Path, config: Option<&Path>, format: &str, all: bool) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => BerthConfig::from_file(path)?,
        None => BerthConfig::default(),
    };
    let fixture = ClusterFixture::from_file(cluster)?;
    let report = run(&fixture, &config, all)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print!("{}", format_report(&report, all));
        }
    }
    Ok(())
}

fn run(fixture: &ClusterFixture, config: &BerthConfig, all: bool) -> anyhow::Result<RankReport> {
    let ctx = fixture.context()?;
    info!(
        job = %fixture.request.job_id,
        nodes = fixture.nodes.len(),
        mode = %config.rank.mode,
        "ranking cluster fixture"
    );

    let mut stack = RankStack::new(&ctx, &config.rank)?;
    stack.set_nodes(fixture.candidates());

    let ranked = if all {
        stack.rank(&fixture.request)?
    } else {
        stack.select(&fixture.request)?.into_iter().collect()
    };

    let metrics = ctx.metrics().clone();
    Ok(RankReport {
        job_id: fixture.request.job_id.clone(),
        state_index: ctx.state().index(),
        nodes: ranked.iter().map(NodeReport::from).collect(),
        metrics,
    })
}

fn format_report(report: &RankReport, all: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "job {} (state index {})\n",
        report.job_id, report.state_index
    ));

    if report.nodes.is_empty() {
        out.push_str("✗ no feasible placement\n");
    }
    for (i, node) in report.nodes.iter().enumerate() {
        let marker = if all { format!("{:>3}.", i + 1) } else { "  ✓".to_string() };
        out.push_str(&format!("{marker} {:<24} {:>8.3}\n", node.node_id, node.score));
        for stage in &node.scores {
            out.push_str(&format!("       {:<20} {:>+8.3}\n", stage.stage, stage.score));
        }
    }

    let m = &report.metrics;
    out.push_str(&format!(
        "evaluated {} node(s), {} exhausted",
        m.nodes_evaluated, m.nodes_exhausted
    ));
    if !m.dimension_exhausted.is_empty() {
        let dims: Vec<String> = m
            .dimension_exhausted
            .iter()
            .map(|(dim, count)| format!("{dim}={count}"))
            .collect();
        out.push_str(&format!(" ({})", dims.join(", ")));
    }
    out.push('\n');
    out
}
