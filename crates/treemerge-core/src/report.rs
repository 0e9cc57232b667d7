use merge_matcher::{Algorithm, CostModelReport, Label, Matchings, MatcherStats, NodeId, Tree};
use serde::Serialize;
use std::fmt::{self, Display, Write as _};

/// One positively scored pair of a match run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairReport {
    pub left: NodeId,
    pub right: NodeId,
    pub left_label: String,
    pub right_label: String,
    pub score: usize,
    pub algorithm: Algorithm,
}

/// Outcome of matching two trees, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub strategy: String,
    pub left_size: usize,
    pub right_size: usize,
    /// Score of the root pair, 0 if the roots were not matched.
    pub root_score: usize,
    /// Share of the larger tree covered by the root score.
    pub coverage: f64,
    pub pairs: Vec<PairReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MatcherStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_model: Option<CostModelReport>,
}

impl MatchReport {
    pub fn new<T: Label + Display>(
        strategy: impl Into<String>,
        left: &Tree<T>,
        right: &Tree<T>,
        matchings: &Matchings,
    ) -> Self {
        let label = |tree: &Tree<T>, id: NodeId| {
            tree.get(id)
                .map(|node| node.content().to_string())
                .unwrap_or_else(|| id.to_string())
        };

        let pairs = matchings
            .iter()
            .filter(|m| m.score() > 0)
            .map(|m| PairReport {
                left: m.left(),
                right: m.right(),
                left_label: label(left, m.left()),
                right_label: label(right, m.right()),
                score: m.score(),
                algorithm: m.algorithm(),
            })
            .collect();

        let (left_size, right_size) = (left.len(), right.len());
        let root = matchings.get(left.root().id(), right.root().id());
        let root_score = root.map_or(0, |m| m.score());
        let coverage = root.map_or(0.0, |m| m.percentage(left_size, right_size));

        Self {
            strategy: strategy.into(),
            left_size,
            right_size,
            root_score,
            coverage,
            pairs,
            stats: None,
            cost: None,
            cost_model: None,
        }
    }

    pub fn with_stats(mut self, stats: MatcherStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_cost(mut self, cost: f32) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_cost_model(mut self, report: Option<CostModelReport>) -> Self {
        self.cost_model = report;
        self
    }
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(
            out,
            "strategy: {}, nodes: {}/{}, root score: {} ({:.1}%)",
            self.strategy,
            self.left_size,
            self.right_size,
            self.root_score,
            self.coverage * 100.0
        )?;
        for pair in &self.pairs {
            writeln!(
                out,
                "  {} {} <-> {} {}  score={} [{}]",
                pair.left, pair.left_label, pair.right, pair.right_label, pair.score, pair.algorithm
            )?;
        }
        if let Some(stats) = &self.stats {
            writeln!(out, "{}", stats.summary())?;
        }
        if let Some(cost) = self.cost {
            writeln!(out, "cost: {cost:.4}")?;
        }
        if let Some(report) = &self.cost_model {
            writeln!(
                out,
                "cost model: {} iterations, {} accepted, cost {:.4} -> {:.4}",
                report.iterations, report.accepted, report.initial_cost, report.lowest_cost
            )?;
        }
        f.write_str(out.trim_end())
    }
}
