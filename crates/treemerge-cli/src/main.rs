use clap::{Parser, Subcommand, ValueEnum};
use merge_matcher::{
    CostModelMatcher, CstLabel, EqualityMatcher, Matcher, MatcherInterface, Matchings, Tree,
};
use std::path::{Path, PathBuf};
use treemerge_core::config::Settings;
use treemerge_core::logging::init_logging;
use treemerge_core::report::MatchReport;
use treemerge_core::tree_io::read_tree;

#[derive(Parser)]
#[command(
    name = "treemerge",
    about = "Match two revisions of a syntax tree for structured merging"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides the settings file (RUST_LOG still wins)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match two tree documents and print the matched pairs
    Match {
        left: PathBuf,
        right: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::Auto)]
        strategy: Strategy,
        #[command(flatten)]
        tuning: Tuning,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Match recursively, then print the cost-model cost of the result
    Cost {
        left: PathBuf,
        right: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
        #[arg(long)]
        json: bool,
    },
    /// Write the default settings
    InitConfig {
        #[arg(default_value = "treemerge.json")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Per node pair: ordered if any child is order-significant, unordered otherwise
    Auto,
    /// Align the root's children as sequences
    Ordered,
    /// Pair the root's children as sets
    Unordered,
    /// Only identical subtrees
    Equality,
    /// Global search over complete covers
    CostModel,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Auto => "auto",
            Strategy::Ordered => "ordered",
            Strategy::Unordered => "unordered",
            Strategy::Equality => "equality",
            Strategy::CostModel => "cost-model",
        }
    }
}

/// Cost-model overrides of the settings file.
#[derive(clap::Args)]
struct Tuning {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    iterations: Option<usize>,
}

impl Tuning {
    fn apply(&self, settings: &mut Settings) -> anyhow::Result<()> {
        let cost_model = &mut settings.matcher.cost_model;
        if let Some(seed) = self.seed {
            cost_model.seed = seed;
        }
        if let Some(iterations) = self.iterations {
            cost_model.iterations = iterations;
        }
        cost_model.validate()?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Match {
            left,
            right,
            strategy,
            tuning,
            json,
        } => cmd_match(&cli, left, right, *strategy, tuning, *json),
        Commands::Cost {
            left,
            right,
            tuning,
            json,
        } => cmd_cost(&cli, left, right, tuning, *json),
        Commands::InitConfig { path, force } => cmd_init_config(path, *force),
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    Ok(settings)
}

fn load_trees(left: &Path, right: &Path) -> anyhow::Result<(Tree<CstLabel>, Tree<CstLabel>)> {
    Ok((read_tree(left)?, read_tree(right)?))
}

fn print_report(report: &MatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn cmd_match(
    cli: &Cli,
    left: &Path,
    right: &Path,
    strategy: Strategy,
    tuning: &Tuning,
    json: bool,
) -> anyhow::Result<()> {
    let mut settings = load_settings(cli)?;
    tuning.apply(&mut settings)?;
    let _guard = init_logging(&settings.logging)?;

    let (left_tree, right_tree) = load_trees(left, right)?;
    let (l, r) = (left_tree.root(), right_tree.root());
    tracing::info!(
        strategy = strategy.name(),
        left = left_tree.len(),
        right = right_tree.len(),
        "Matching tree documents"
    );

    let mut matcher = Matcher::new(settings.matcher.clone());
    let report = match strategy {
        Strategy::Auto => {
            let matchings = matcher.match_trees(&left_tree, &right_tree)?;
            MatchReport::new(strategy.name(), &left_tree, &right_tree, &matchings)
                .with_stats(matcher.stats())
        }
        Strategy::Ordered => {
            let matchings = matcher.match_ordered(l, r)?;
            MatchReport::new(strategy.name(), &left_tree, &right_tree, &matchings)
                .with_stats(matcher.stats())
        }
        Strategy::Unordered => {
            let matchings = matcher.match_unordered(l, r)?;
            MatchReport::new(strategy.name(), &left_tree, &right_tree, &matchings)
                .with_stats(matcher.stats())
        }
        Strategy::Equality => {
            let matchings = EqualityMatcher::new().match_nodes(l, r)?;
            MatchReport::new(strategy.name(), &left_tree, &right_tree, &matchings)
        }
        Strategy::CostModel => {
            let mut cost_model = CostModelMatcher::new(settings.matcher.cost_model.clone());
            let matchings = cost_model.match_nodes(l, r)?;
            MatchReport::new(strategy.name(), &left_tree, &right_tree, &matchings)
                .with_cost_model(cost_model.report().cloned())
        }
    };

    print_report(&report, json)
}

fn cmd_cost(cli: &Cli, left: &Path, right: &Path, tuning: &Tuning, json: bool) -> anyhow::Result<()> {
    let mut settings = load_settings(cli)?;
    tuning.apply(&mut settings)?;
    let _guard = init_logging(&settings.logging)?;

    let (left_tree, right_tree) = load_trees(left, right)?;

    // The cost of the recursive result alone, without refinement.
    let mut config = settings.matcher.clone();
    config.use_cost_model = false;
    let mut matcher = Matcher::new(config);
    let matchings = matcher.match_trees(&left_tree, &right_tree)?;
    let consistent: Matchings = matchings.optimized();

    let cost_model = CostModelMatcher::new(settings.matcher.cost_model.clone());
    let cost = cost_model.cost_of(&consistent, left_tree.root(), right_tree.root())?;
    tracing::info!(cost, pairs = consistent.len(), "Computed cost of recursive matching");

    let report = MatchReport::new("auto", &left_tree, &right_tree, &matchings)
        .with_stats(matcher.stats())
        .with_cost(cost);
    print_report(&report, json)
}

fn cmd_init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Settings::default().save(path)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_match_with_overrides() {
        let cli = Cli::parse_from([
            "treemerge",
            "match",
            "a.json",
            "b.json",
            "--strategy",
            "cost-model",
            "--seed",
            "9",
            "--iterations",
            "12",
            "--json",
        ]);

        let Commands::Match {
            strategy,
            tuning,
            json,
            ..
        } = &cli.command
        else {
            panic!("expected match command");
        };
        assert_eq!(*strategy, Strategy::CostModel);
        assert!(*json);

        let mut settings = Settings::default();
        tuning.apply(&mut settings).unwrap();
        assert_eq!(settings.matcher.cost_model.seed, 9);
        assert_eq!(settings.matcher.cost_model.iterations, 12);
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treemerge.json");

        cmd_init_config(&path, false).unwrap();
        assert!(Settings::load(&path).is_ok());
        assert!(cmd_init_config(&path, false).is_err());
        assert!(cmd_init_config(&path, true).is_ok());
    }
}
