use medkg::candidates::{rank_top_k, unknown_pairs};
use medkg::cache::{ArtifactCache, GraphStats, ModelStats};
use medkg::{
    ArtifactPaths, Checkpoint, Evaluator, EvalConfig, GraphBundle, MedKgError, DataError, Pipeline, PipelineConfig,
    SplitBundle, SplitKind,
};
use medkg_gnn::{MessageGraph, Parameterized};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

const DRUGS: usize = 10;
const DISEASES: usize = 10;

fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let mut entities = String::from("entity_id,entity_text,entity_type,frequency,num_papers,source_pmids\n");
    for i in 0..DRUGS {
        writeln!(entities, "CHEM_{i},drug {i},CHEMICAL,{},{},\"1;2\"", 5 + i * 3, 1 + i % 4).unwrap();
    }
    for i in 0..DISEASES {
        writeln!(entities, "DIS_{i},disease {i},DISEASE,{},{},\"3\"", 2 + i * 2, 1 + i % 3).unwrap();
    }
    let mut relationships = String::from("drug_id,drug_text,disease_id,disease_text,confidence,num_papers\n");
    for d in 0..DRUGS {
        for k in 0..3 {
            let x = (d + k * 3) % DISEASES;
            writeln!(relationships, "CHEM_{d},drug {d},DIS_{x},disease {x},0.{},{}", 5 + k, k + 1).unwrap();
        }
    }
    // Dangling reference is dropped with a warning
    relationships.push_str("CHEM_404,ghost,DIS_0,disease 0,0.9,1\n");

    let entities_path = dir.join("entities.csv");
    let relationships_path = dir.join("relationships.csv");
    std::fs::write(&entities_path, entities).unwrap();
    std::fs::write(&relationships_path, relationships).unwrap();
    (entities_path, relationships_path)
}

fn pipeline(dir: &Path, epochs: usize) -> Pipeline {
    let mut config = PipelineConfig {
        paths: ArtifactPaths::new(dir.join("data")),
        ..PipelineConfig::default()
    };
    config.train.epochs = epochs;
    config.model.hidden_dim = 16;
    config.model.embedding_dim = 8;
    config.predict.top_k = 25;
    config.predict.batch_size = 7;
    Pipeline::new(config).unwrap()
}

fn prepared(dir: &Path, epochs: usize) -> (Pipeline, GraphBundle, SplitBundle) {
    let (entities, relationships) = write_inputs(dir);
    let pipeline = pipeline(dir, epochs);
    let graph = pipeline.export(&entities, &relationships).unwrap();
    let splits = pipeline.split(&graph).unwrap();
    (pipeline, graph, splits)
}

#[test]
fn test_export_and_split_artifacts_reload() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 1);

    assert_eq!(graph.num_drugs, DRUGS);
    assert_eq!(graph.num_diseases, DISEASES);
    assert_eq!(graph.num_edges(), DRUGS * 3);
    assert_eq!(graph.dropped_relationships, 1);

    assert_eq!(pipeline.load_graph().unwrap(), graph);
    assert_eq!(pipeline.load_splits().unwrap(), splits);
    assert!(pipeline.paths().graph_mapping().exists());
    assert!(pipeline.paths().split_statistics().exists());
    for kind in SplitKind::ALL {
        assert!(pipeline.paths().split(kind).exists());
    }
}

#[test]
fn test_end_to_end_writes_every_artifact() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 4);

    let mut seen = Vec::new();
    let outcome = pipeline.train(&graph, &splits, |m| seen.push(m.epoch)).unwrap();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert_eq!(outcome.summary.epochs_run, 4);

    let checkpoint = pipeline.load_checkpoint().unwrap();
    assert_eq!(checkpoint.epoch, outcome.best.epoch);

    let report = pipeline.evaluate(&graph, &splits, &checkpoint).unwrap();
    assert_eq!(report.metrics.num_samples, splits.test.len());
    assert!((0.0..=1.0).contains(&report.metrics.auc_roc));

    let set = pipeline.predict(&graph, &splits, &checkpoint).unwrap();
    assert_eq!(set.candidates.len(), 25);
    assert_eq!(set.scored_pairs, DRUGS * DISEASES - graph.num_edges());
    let ranks: Vec<usize> = set.candidates.iter().map(|c| c.rank).collect();
    assert_eq!(ranks, (1..=25).collect::<Vec<_>>());
    assert!(set
        .candidates
        .windows(2)
        .all(|w| w[0].probability >= w[1].probability));

    for path in [
        pipeline.paths().checkpoint(),
        pipeline.paths().training_history(),
        pipeline.paths().test_metrics(),
        pipeline.paths().test_curves(),
        pipeline.paths().predictions(),
    ] {
        assert!(path.exists(), "{:?} missing", path);
    }
}

#[test]
fn test_candidates_never_repeat_known_edges() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 2);
    let outcome = pipeline.train(&graph, &splits, |_| {}).unwrap();

    let mut config = pipeline.config().clone();
    config.predict.top_k = DRUGS * DISEASES;
    let wide = Pipeline::new(config).unwrap();
    let set = wide.predict(&graph, &splits, &outcome.best).unwrap();

    // top_k above the number of unknown pairs returns all of them
    assert_eq!(set.candidates.len(), DRUGS * DISEASES - graph.num_edges());
    let mut known = graph.known_edge_set();
    known.extend(splits.all_positive_edges());
    for c in &set.candidates {
        let pair = (graph.index_of(&c.drug_id).unwrap(), graph.index_of(&c.disease_id).unwrap());
        assert!(!known.contains(&pair), "{:?} is a known edge", pair);
    }
}

#[test]
fn test_checkpoint_round_trip_is_bit_identical() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 3);
    let outcome = pipeline.train(&graph, &splits, |_| {}).unwrap();

    let path = dir.path().join("copy.bin");
    outcome.best.save(&path).unwrap();
    let loaded = Checkpoint::load(&path).unwrap();
    assert_eq!(loaded.epoch, outcome.best.epoch);
    assert_eq!(loaded.val_auc, outcome.best.val_auc);
    assert_eq!(loaded.model.num_parameters(), outcome.best.model.num_parameters());

    let structure = MessageGraph::from_edges(graph.num_nodes(), splits.structure_edges()).unwrap();
    let before = outcome
        .best
        .model
        .predict(graph.features.view(), &structure, &splits.test.edges)
        .unwrap();
    let after = loaded
        .model
        .predict(graph.features.view(), &structure, &splits.test.edges)
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_equal_probabilities_rank_in_enumeration_order() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 1);
    let mut checkpoint = pipeline.train(&graph, &splits, |_| {}).unwrap().best;

    // Constant decoder: every pair gets the same logit, ln 3, i.e. probability 0.75
    let last = checkpoint.model.decoder.layers.last_mut().unwrap();
    last.weight.fill(0.0);
    if let Some(bias) = last.bias.as_mut() {
        bias.fill(3.0f32.ln());
    }
    let set = pipeline.predict(&graph, &splits, &checkpoint).unwrap();

    let first = set.candidates[0].probability;
    assert!((first - 0.75).abs() < 1e-6);
    assert!(set.candidates.iter().all(|c| c.probability == first));

    let mut known = graph.known_edge_set();
    known.extend(splits.all_positive_edges());
    let expected: Vec<(usize, usize)> = unknown_pairs(&graph, &known).into_iter().take(25).collect();
    let got: Vec<(usize, usize)> = set
        .candidates
        .iter()
        .map(|c| (graph.index_of(&c.drug_id).unwrap(), graph.index_of(&c.disease_id).unwrap()))
        .collect();
    assert_eq!(got, expected);
}

#[test]
fn test_two_way_tie_prefers_lower_indices() {
    // Enumeration order: (0, 3), (0, 4), (1, 3)
    let probs = [0.75f32, 0.5, 0.75];
    assert_eq!(rank_top_k(&probs, 2), vec![0, 2]);
}

#[test]
fn test_precision_at_k_boundary() {
    let evaluator = Evaluator::new(EvalConfig {
        k_values: vec![1, 4, 5],
        ..EvalConfig::default()
    });
    let top_positive = evaluator.score(vec![0.9, 0.3, 0.2, 0.1], &[1.0, 0.0, 1.0, 0.0]).unwrap();
    assert_eq!(top_positive.metrics.precision_at_k.get(&1), Some(&1.0));
    assert_eq!(top_positive.metrics.precision_at_k.get(&4), Some(&0.5));
    assert!(!top_positive.metrics.precision_at_k.contains_key(&5));

    let top_negative = evaluator.score(vec![0.3, 0.9, 0.2, 0.1], &[1.0, 0.0, 1.0, 0.0]).unwrap();
    assert_eq!(top_negative.metrics.precision_at_k.get(&1), Some(&0.0));
}

#[test]
fn test_single_class_test_split_is_data_error() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, mut splits) = prepared(dir.path(), 1);
    let checkpoint = pipeline.train(&graph, &splits, |_| {}).unwrap().best;
    splits.test.labels.iter_mut().for_each(|y| *y = 1.0);
    splits.test.num_pos = splits.test.labels.len();
    splits.test.num_neg = 0;
    let err = pipeline.evaluate(&graph, &splits, &checkpoint).unwrap_err();
    assert!(matches!(err, MedKgError::Data(DataError::SingleClass(_))));
}

#[test]
fn test_stats_read_through_cache() {
    let dir = TempDir::new().unwrap();
    let (pipeline, graph, splits) = prepared(dir.path(), 2);
    let outcome = pipeline.train(&graph, &splits, |_| {}).unwrap();

    let mut cache = ArtifactCache::new(4);
    let cached = cache.graph(pipeline.paths()).unwrap();
    let stats = GraphStats::from_bundle(&cached, 3);
    assert_eq!(stats.num_edges, graph.num_edges());
    assert_eq!(stats.top_drugs.len(), 3);
    assert!((stats.density - 0.3).abs() < 1e-12);

    let model_stats = ModelStats::load(&mut cache, pipeline.paths()).unwrap();
    assert_eq!(model_stats.best_epoch, outcome.best.epoch);
    assert_eq!(model_stats.test_auc, None);

    cache.graph(pipeline.paths()).unwrap();
    let (hits, misses) = cache.counters();
    assert_eq!((hits, misses), (1, 2));
}
