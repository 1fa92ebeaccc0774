//! medkg CLI: runs the drug repurposing link-prediction pipeline
//!
//! Each stage reads and writes artifacts under `--data-dir`; `run` chains all
//! of them in one process.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use medkg::cache::{ArtifactCache, GraphStats, ModelStats};
use medkg::candidates::CandidateSet;
use medkg::evaluate::TestMetrics;
use medkg::train::{EpochMetrics, TrainingSummary};
use medkg::{PipelineConfig, Pipeline, SplitKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medkg", version, about = "Drug repurposing via GNN link prediction")]
struct Cli {
    /// Directory holding processed/, checkpoints/ and results/
    #[arg(long, global = true, env = "MEDKG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// YAML pipeline configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Args, Clone)]
struct InputArgs {
    /// Entity table (entity_id, entity_text, entity_type, frequency, num_papers)
    #[arg(long)]
    entities: PathBuf,

    /// Relationship table (drug_id, disease_id, confidence, num_papers)
    #[arg(long)]
    relationships: PathBuf,
}

#[derive(clap::Args, Clone, Default)]
struct SplitArgs {
    #[arg(long)]
    train_ratio: Option<f64>,
    #[arg(long)]
    val_ratio: Option<f64>,
    #[arg(long)]
    test_ratio: Option<f64>,
    /// Negatives per positive
    #[arg(long)]
    neg_ratio: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Args, Clone, Default)]
struct TrainArgs {
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    lr: Option<f32>,
    #[arg(long)]
    patience: Option<usize>,
    #[arg(long)]
    hidden: Option<usize>,
    #[arg(long)]
    embedding: Option<usize>,
    /// Encoder dropout
    #[arg(long)]
    dropout: Option<f32>,
}

#[derive(clap::Args, Clone, Default)]
struct PredictArgs {
    #[arg(long)]
    top_k: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph tensor bundle from entity and relationship tables
    Export {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Partition edges into train/val/test with negatives
    Split {
        #[command(flatten)]
        split: SplitArgs,
    },
    /// Train the link predictor and keep the best checkpoint
    Train {
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Evaluate the best checkpoint on the test split
    Evaluate,
    /// Rank novel drug–disease candidates
    Predict {
        #[command(flatten)]
        predict: PredictArgs,
    },
    /// Run every stage in order
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        train: TrainArgs,
        #[command(flatten)]
        predict: PredictArgs,
    },
    /// Show graph and model statistics from existing artifacts
    Stats,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn base_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    Ok(config)
}

fn apply_split(config: &mut PipelineConfig, args: &SplitArgs) {
    let split = &mut config.split;
    if let Some(v) = args.train_ratio {
        split.train_ratio = v;
    }
    if let Some(v) = args.val_ratio {
        split.val_ratio = v;
    }
    if let Some(v) = args.test_ratio {
        split.test_ratio = v;
    }
    if let Some(v) = args.neg_ratio {
        split.neg_ratio = v;
    }
    if let Some(v) = args.seed {
        split.seed = v;
    }
}

fn apply_train(config: &mut PipelineConfig, args: &TrainArgs) {
    if let Some(v) = args.epochs {
        config.train.epochs = v;
    }
    if let Some(v) = args.lr {
        config.train.optimizer.lr = v;
    }
    if let Some(v) = args.patience {
        config.train.patience = v;
    }
    if let Some(v) = args.hidden {
        config.model.hidden_dim = v;
    }
    if let Some(v) = args.embedding {
        config.model.embedding_dim = v;
    }
    if let Some(v) = args.dropout {
        config.model.encoder_dropout = v;
    }
}

fn apply_predict(config: &mut PipelineConfig, args: &PredictArgs) {
    if let Some(v) = args.top_k {
        config.predict.top_k = v;
    }
    if let Some(v) = args.batch_size {
        config.predict.batch_size = v;
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = base_config(&cli)?;
    let format = cli.format.clone();

    match cli.command {
        Commands::Export { input } => {
            let pipeline = Pipeline::new(config)?;
            let graph = pipeline.export(&input.entities, &input.relationships)?;
            print_graph_stats(&GraphStats::from_bundle(&graph, 10), &format)?;
        }
        Commands::Split { split } => {
            apply_split(&mut config, &split);
            let pipeline = Pipeline::new(config)?;
            let graph = pipeline.load_graph().context("loading graph bundle; run `export` first")?;
            let splits = pipeline.split(&graph)?;
            print_split_table(&splits, &format)?;
        }
        Commands::Train { train } => {
            apply_train(&mut config, &train);
            let pipeline = Pipeline::new(config)?;
            let graph = pipeline.load_graph()?;
            let splits = pipeline.load_splits().context("loading splits; run `split` first")?;
            run_training(&pipeline, &graph, &splits, &format)?;
        }
        Commands::Evaluate => {
            let pipeline = Pipeline::new(config)?;
            let graph = pipeline.load_graph()?;
            let splits = pipeline.load_splits()?;
            let checkpoint = pipeline.load_checkpoint().context("loading checkpoint; run `train` first")?;
            let report = pipeline.evaluate(&graph, &splits, &checkpoint)?;
            print_test_metrics(&report.metrics, &format)?;
        }
        Commands::Predict { predict } => {
            apply_predict(&mut config, &predict);
            let pipeline = Pipeline::new(config)?;
            let graph = pipeline.load_graph()?;
            let splits = pipeline.load_splits()?;
            let checkpoint = pipeline.load_checkpoint().context("loading checkpoint; run `train` first")?;
            let set = pipeline.predict(&graph, &splits, &checkpoint)?;
            print_candidates(&set, &format)?;
        }
        Commands::Run {
            input,
            split,
            train,
            predict,
        } => {
            apply_split(&mut config, &split);
            apply_train(&mut config, &train);
            apply_predict(&mut config, &predict);
            let pipeline = Pipeline::new(config)?;

            let graph = pipeline.export(&input.entities, &input.relationships)?;
            print_graph_stats(&GraphStats::from_bundle(&graph, 10), &format)?;
            let splits = pipeline.split(&graph)?;
            print_split_table(&splits, &format)?;
            run_training(&pipeline, &graph, &splits, &format)?;
            let checkpoint = pipeline.load_checkpoint()?;
            let report = pipeline.evaluate(&graph, &splits, &checkpoint)?;
            print_test_metrics(&report.metrics, &format)?;
            let set = pipeline.predict(&graph, &splits, &checkpoint)?;
            print_candidates(&set, &format)?;
        }
        Commands::Stats => {
            let pipeline = Pipeline::new(config)?;
            let mut cache = ArtifactCache::default();
            let graph = cache.graph(pipeline.paths())?;
            print_graph_stats(&GraphStats::from_bundle(&graph, 10), &format)?;
            if pipeline.paths().checkpoint().exists() {
                let stats = ModelStats::load(&mut cache, pipeline.paths())?;
                print_model_stats(&stats, &format)?;
            }
        }
    }
    Ok(())
}

fn run_training(
    pipeline: &Pipeline,
    graph: &medkg::GraphBundle,
    splits: &medkg::SplitBundle,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let log_every = pipeline.config().train.log_every.max(1);
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Epoch", "Train Loss", "Train AUC", "Val Loss", "Val AUC", "Val AP"]);

    let print_rows = matches!(format, OutputFormat::Table);
    let outcome = pipeline.train(graph, splits, |m: &EpochMetrics| {
        if print_rows && (m.epoch == 1 || m.epoch % log_every == 0) {
            table.add_row(vec![
                m.epoch.to_string(),
                format!("{:.4}", m.train_loss),
                format!("{:.4}", m.train_auc),
                format!("{:.4}", m.val_loss),
                format!("{:.4}", m.val_auc),
                format!("{:.4}", m.val_ap),
            ]);
        }
    })?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.summary)?),
        OutputFormat::Table => {
            println!("{}", table);
            print_training_summary(&outcome.summary);
        }
    }
    Ok(())
}

fn print_training_summary(summary: &TrainingSummary) {
    println!("Parameters:           {}", summary.num_parameters);
    println!("Epochs run:           {}{}", summary.epochs_run, if summary.stopped_early { " (early stop)" } else { "" });
    println!("Best Validation AUC:  {:.4} (epoch {})", summary.best_val_auc, summary.best_epoch);
    println!("Val AP at Best Epoch: {:.4}", summary.best_val_ap);
    println!("Final Train AUC:      {:.4}", summary.final_train_auc);
    println!("Final Val AUC:        {:.4}", summary.final_val_auc);
    if summary.target_reached {
        println!("SUCCESS: validation AUC reached the {:.2} target", summary.target_auc);
    } else {
        println!("BELOW TARGET: validation AUC did not reach {:.2}", summary.target_auc);
    }
}

fn print_graph_stats(stats: &GraphStats, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Graph", "Value"]);
            table.add_row(vec!["Nodes".to_string(), stats.num_nodes.to_string()]);
            table.add_row(vec!["Drugs".to_string(), stats.num_drugs.to_string()]);
            table.add_row(vec!["Diseases".to_string(), stats.num_diseases.to_string()]);
            table.add_row(vec!["Edges".to_string(), stats.num_edges.to_string()]);
            table.add_row(vec!["Density".to_string(), format!("{:.4}", stats.density)]);
            table.add_row(vec!["Mean confidence".to_string(), format!("{:.3}", stats.mean_confidence)]);
            table.add_row(vec![
                "High-confidence edges".to_string(),
                stats.high_confidence_edges.to_string(),
            ]);
            println!("{}", table);
        }
    }
    Ok(())
}

fn print_split_table(splits: &medkg::SplitBundle, format: &OutputFormat) -> anyhow::Result<()> {
    let stats = splits.statistics();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Split", "Total", "Positive", "Negative", "Pos %"]);
            for kind in SplitKind::ALL {
                let c = splits.get(kind).counts();
                table.add_row(vec![
                    kind.to_string(),
                    c.total.to_string(),
                    c.positive.to_string(),
                    c.negative.to_string(),
                    format!("{:.1}", c.pos_ratio * 100.0),
                ]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

fn print_test_metrics(metrics: &TestMetrics, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(metrics)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Metric", "Value"]);
            for (name, value) in [
                ("AUC-ROC", metrics.auc_roc),
                ("AUC-PR", metrics.auc_pr),
                ("Accuracy", metrics.accuracy),
                ("Precision", metrics.precision),
                ("Recall", metrics.recall),
                ("F1", metrics.f1),
            ] {
                table.add_row(vec![name.to_string(), format!("{:.4}", value)]);
            }
            for (k, p) in &metrics.precision_at_k {
                table.add_row(vec![format!("Precision@{}", k), format!("{:.4}", p)]);
            }
            println!("{}", table);
            let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix;
            println!("Confusion matrix: TN={} FP={} FN={} TP={}", tn, fp, fn_, tp);
            if metrics.target_reached {
                println!("SUCCESS: test AUC reached the {:.2} target", metrics.target_auc);
            } else {
                println!("BELOW TARGET: test AUC did not reach {:.2}", metrics.target_auc);
            }
        }
    }
    Ok(())
}

fn print_candidates(set: &CandidateSet, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&set.candidates)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Rank", "Drug", "Disease", "Probability", "Drug papers", "Disease papers"]);
            for c in set.candidates.iter().take(10) {
                table.add_row(vec![
                    c.rank.to_string(),
                    c.drug.clone(),
                    c.disease.clone(),
                    format!("{:.4}", c.probability),
                    c.drug_num_papers.to_string(),
                    c.disease_num_papers.to_string(),
                ]);
            }
            println!("{}", table);
            println!(
                "{} candidate(s) from {} scored pairs; high={} medium={} lower={}",
                set.candidates.len(),
                set.scored_pairs,
                set.tiers.high,
                set.tiers.medium,
                set.tiers.lower
            );
        }
    }
    Ok(())
}

fn print_model_stats(stats: &ModelStats, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Model", "Value"]);
            table.add_row(vec!["Best epoch".to_string(), stats.best_epoch.to_string()]);
            table.add_row(vec!["Parameters".to_string(), stats.num_parameters.to_string()]);
            table.add_row(vec!["Val AUC".to_string(), format!("{:.4}", stats.val_auc)]);
            table.add_row(vec!["Val AP".to_string(), format!("{:.4}", stats.val_ap)]);
            if let Some(auc) = stats.test_auc {
                table.add_row(vec!["Test AUC".to_string(), format!("{:.4}", auc)]);
            }
            if let Some(ap) = stats.test_ap {
                table.add_row(vec!["Test AP".to_string(), format!("{:.4}", ap)]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}
