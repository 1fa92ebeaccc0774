use medkg::data::{EntityRecord, EntityType, GraphTensorBuilder, RelationshipRecord};
use medkg::{sample_negatives, GraphBundle, SplitConfig, SplitGenerator, SplitKind};
use rustc_hash::FxHashSet;

fn records(drugs: usize, diseases: usize) -> (Vec<EntityRecord>, Vec<RelationshipRecord>) {
    let mut entities = Vec::new();
    // Interleave types so block ordering is exercised
    for i in 0..drugs.max(diseases) {
        if i < diseases {
            entities.push(EntityRecord::new(format!("DIS_{}", i), format!("disease {}", i), EntityType::Disease, (i * 3 % 7) as f64, (i % 4) as f64));
        }
        if i < drugs {
            entities.push(EntityRecord::new(format!("CHEM_{}", i), format!("drug {}", i), EntityType::Drug, (i * 5 % 9) as f64, (i % 3) as f64));
        }
    }
    let mut relationships = Vec::new();
    for d in 0..drugs {
        for k in 0..3 {
            let x = (d * 2 + k * 5) % diseases;
            relationships.push(RelationshipRecord::new(format!("CHEM_{}", d), format!("DIS_{}", x), 0.5 + 0.1 * k as f64, (k + 1) as f64));
        }
    }
    (entities, relationships)
}

fn build(drugs: usize, diseases: usize) -> GraphBundle {
    let (entities, relationships) = records(drugs, diseases);
    GraphTensorBuilder::new()
        .with_entities(entities)
        .with_relationships(relationships)
        .build()
        .unwrap()
}

#[test]
fn test_index_assignment_is_deterministic() {
    let a = build(12, 9);
    let b = build(12, 9);
    assert_eq!(a.nodes, b.nodes);
    assert_eq!(a.features, b.features);
    assert_eq!(a.edges, b.edges);
    assert_eq!(a.index_of("CHEM_0"), Some(0));
    assert_eq!(a.index_of("DIS_0"), Some(12));
}

#[test]
fn test_positive_splits_are_disjoint_and_complete() {
    let graph = build(20, 15);
    for seed in [0, 1, 42, 1234] {
        let splits = SplitGenerator::new(SplitConfig {
            seed,
            ..SplitConfig::default()
        })
        .generate(&graph)
        .unwrap();

        let train: FxHashSet<_> = splits.train.positive_edges.iter().copied().collect();
        let val: FxHashSet<_> = splits.val.positive_edges.iter().copied().collect();
        let test: FxHashSet<_> = splits.test.positive_edges.iter().copied().collect();
        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));

        let union: FxHashSet<_> = train.union(&val).chain(test.iter()).copied().collect();
        assert_eq!(union, graph.known_edge_set());
        assert_eq!(train.len() + val.len() + test.len(), graph.num_edges());
    }
}

#[test]
fn test_negatives_avoid_all_positives_and_repeat_nowhere() {
    let graph = build(20, 15);
    let known = graph.known_edge_set();
    for seed in [3, 99] {
        let splits = SplitGenerator::new(SplitConfig {
            seed,
            neg_ratio: 2.0,
            ..SplitConfig::default()
        })
        .generate(&graph)
        .unwrap();
        for kind in SplitKind::ALL {
            let split = splits.get(kind);
            let negatives: Vec<_> = split.negative_edges().collect();
            let unique: FxHashSet<_> = negatives.iter().copied().collect();
            assert_eq!(unique.len(), negatives.len(), "{} negatives repeat", kind);
            assert!(negatives.iter().all(|e| !known.contains(e)));
            assert!(negatives
                .iter()
                .all(|&(s, d)| graph.drug_indices().contains(&s) && graph.disease_indices().contains(&d)));
        }
    }
}

#[test]
fn test_structure_is_exactly_train_positives() {
    let graph = build(20, 15);
    let splits = SplitGenerator::default().generate(&graph).unwrap();

    let structure: FxHashSet<_> = splits.structure_edges().iter().copied().collect();
    let train_positive: FxHashSet<_> = splits
        .train
        .edges
        .iter()
        .zip(&splits.train.labels)
        .filter(|(_, y)| **y == 1.0)
        .map(|(e, _)| *e)
        .collect();
    assert_eq!(structure, train_positive);

    for kind in [SplitKind::Val, SplitKind::Test] {
        for edge in &splits.get(kind).positive_edges {
            assert!(!structure.contains(edge), "{} edge {:?} leaked into structure", kind, edge);
        }
    }
}

#[test]
fn test_four_drugs_three_diseases_train_only() {
    // Drugs 0..4, diseases 4..7
    let positives = vec![(0, 4), (1, 5), (2, 6)];
    let splits = SplitGenerator::new(SplitConfig {
        train_ratio: 1.0,
        val_ratio: 0.0,
        test_ratio: 0.0,
        neg_ratio: 1.0,
        ..SplitConfig::default()
    })
    .generate_from_edges(&positives, 0..4, 4..7)
    .unwrap();

    assert_eq!(splits.train.num_pos, 3);
    assert_eq!(splits.train.num_neg, 3);
    assert!(splits.val.is_empty());
    assert!(splits.test.is_empty());

    let known: FxHashSet<_> = positives.iter().copied().collect();
    let negatives: Vec<_> = splits.train.negative_edges().collect();
    let unique: FxHashSet<_> = negatives.iter().copied().collect();
    assert_eq!(unique.len(), 3);
    for &(drug, disease) in &negatives {
        assert!(drug < 4 && (4..7).contains(&disease));
        assert!(!known.contains(&(drug, disease)));
    }
}

#[test]
fn test_negative_sampler_exhausts_small_space() {
    // 4 × 3 = 12 pairs, 3 positive, so at most 9 negatives exist
    let known: FxHashSet<_> = [(0, 4), (1, 5), (2, 6)].into_iter().collect();
    let sample = sample_negatives(0..4, 4..7, 12, &known, 10, 42);
    assert!(sample.shortfall);
    assert!(sample.pairs.len() <= 9);
    let unique: FxHashSet<_> = sample.pairs.iter().copied().collect();
    assert_eq!(unique.len(), sample.pairs.len());
}

#[test]
fn test_same_seed_reproduces_membership() {
    let graph = build(20, 15);
    let generator = SplitGenerator::new(SplitConfig {
        seed: 7,
        ..SplitConfig::default()
    });
    let a = generator.generate(&graph).unwrap();
    let b = generator.generate(&graph).unwrap();
    for kind in SplitKind::ALL {
        assert_eq!(a.get(kind), b.get(kind));
    }
    let other = SplitGenerator::default().generate(&graph).unwrap();
    assert_eq!(
        other.all_positive_edges(),
        a.all_positive_edges(),
        "seeds change membership, never the positive union"
    );
}
