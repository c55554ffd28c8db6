//! End-to-end scenarios exercising the embedding engine the way a
//! training run does: construct, initialize, transplant, normalize via
//! hooks, serve lookups and fallbacks, and hand penalty terms to the
//! loss stage.

use std::io::Write;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use incrustar::{
    penalty, transplant, Embedder, EmbedderConfig, EmbeddingTable, HookRegistry, IncrustarError,
    NeighbourAggregator, Normalizer, PretrainedMapping, RegularizeMode, Space,
};

fn sequential_table(key: &str, cfg: &EmbedderConfig, vocab: usize) -> EmbeddingTable {
    let mut table = EmbeddingTable::new(key, cfg, vocab).unwrap();
    table.initialize_with(|w| {
        for (i, v) in w.iter_mut().enumerate() {
            *v = (i as f32 + 1.0) * 0.1;
        }
    });
    table
}

#[test]
fn oos_resolution_over_loaded_edge_list() {
    // vocab 5, dim 4, edges (0,1) and (0,2), psi 2: entity 0 is served
    // as the mean of entities 1 and 2, entity 3 as itself.
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("neighbours.json")).unwrap();
    write!(file, "[[0, 1], [0, 2]]").unwrap();

    let mut cfg = EmbedderConfig::new(4);
    cfg.psi = 2.0;
    cfg.neighbour_edgelist_file = Some("neighbours.json".into());

    let table = sequential_table("entity", &cfg, 5);
    let aggregator = NeighbourAggregator::from_config(&cfg, 5, dir.path())
        .unwrap()
        .expect("psi > 0 enables aggregation");

    assert_eq!(aggregator.adjacency().neighbours(0), &[1, 2]);

    let resolved = aggregator.resolve(&table, &[0, 3]).unwrap();
    let expected_neighbour_mean = {
        let rows = table.embed(&[1, 2]).unwrap();
        (rows.row(0).to_owned() + rows.row(1).to_owned()) / 2.0
    };
    for j in 0..4 {
        assert_abs_diff_eq!(resolved[[0, j]], expected_neighbour_mean[j], epsilon = 1e-6);
    }
    assert_eq!(resolved.row(1), table.embed(&[3]).unwrap().row(0));
}

#[test]
fn transplant_then_normalize_then_train_hooks() {
    // The construction-time sequence: random init, pretrained
    // transplant, then the run-start normalization pass.
    let mut cfg = EmbedderConfig::new(4);
    cfg.normalize_p = 2.0;

    let mut table = sequential_table("entity", &cfg, 5);

    let mut pretrained = EmbeddingTable::new("pre", &EmbedderConfig::new(4), 2).unwrap();
    pretrained
        .load_weights(
            Array2::from_shape_vec((2, 4), vec![1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0])
                .unwrap(),
        )
        .unwrap();

    let mapping = PretrainedMapping::new(vec![2, 4], vec![0, 1], 5).unwrap();
    transplant(&mut table, &pretrained, &mapping).unwrap();

    assert_eq!(table.embed(&[2]).unwrap().row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(table.embed(&[4]).unwrap().row(0).to_vec(), vec![0.0, 2.0, 0.0, 0.0]);

    let mut hooks = HookRegistry::new();
    Normalizer::from_config(&cfg).register(&mut hooks);
    hooks.run_start(&mut table);

    // every row is unit L2 norm after the run-start pass, including the
    // transplanted ones
    let all = table.embed_all();
    for row in all.rows() {
        let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
    }

    // a gradient step perturbs the rows; the post-batch hook restores
    table.load_weights(&all * 3.0).unwrap();
    hooks.post_batch(&mut table);
    for row in table.embed_all().rows() {
        let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
    }
}

#[test]
fn untouched_rows_survive_transplant() {
    let cfg = EmbedderConfig::new(4);
    let mut table = sequential_table("entity", &cfg, 5);
    let before = table.embed_all();

    let mut pretrained = EmbeddingTable::new("pre", &EmbedderConfig::new(4), 2).unwrap();
    pretrained.initialize_with(|w| w.fill(9.0));

    let mapping = PretrainedMapping::new(vec![2, 4], vec![0, 1], 5).unwrap();
    transplant(&mut table, &pretrained, &mapping).unwrap();

    let after = table.embed_all();
    for id in [0, 1, 3] {
        assert_eq!(after.row(id), before.row(id));
    }
    for id in [2, 4] {
        assert!(after.row(id).iter().all(|&v| v == 9.0));
    }
}

#[test]
fn n3_on_euclidean_space_fails_at_construction() {
    let mut cfg = EmbedderConfig::new(8);
    cfg.regularize = RegularizeMode::N3;
    cfg.regularize_weight = 0.5;

    let result = EmbeddingTable::new("entity", &cfg, 10);
    assert!(matches!(result, Err(IncrustarError::ComplexSpaceRequired { .. })));
}

#[test]
fn penalty_terms_accumulate_across_tables() {
    // two tables contributing to one loss, the way an entity and a
    // relation embedder share the penalty list
    let mut entity_cfg = EmbedderConfig::new(2);
    entity_cfg.regularize = RegularizeMode::Lp;
    entity_cfg.regularize_weight = 1.0;

    let mut relation_cfg = EmbedderConfig::new(4);
    relation_cfg.space = Space::Complex;
    relation_cfg.regularize = RegularizeMode::N3;
    relation_cfg.regularize_weight = 0.5;

    let mut entity = EmbeddingTable::new("entity", &entity_cfg, 3).unwrap();
    entity.initialize_with(|w| w.fill(1.0));
    let mut relation = EmbeddingTable::new("relation", &relation_cfg, 2).unwrap();
    relation.initialize_with(|w| w.fill(1.0));

    let terms = penalty(&entity, Vec::new(), None).unwrap();
    let terms = penalty(&relation, terms, None).unwrap();

    assert_eq!(terms.len(), 2);
    assert_eq!(terms[0].0, "entity.L2_penalty");
    assert_eq!(terms[1].0, "relation.L3_penalty");

    // entity: 1.0/2 * 6 entries of 1.0
    assert_abs_diff_eq!(terms[0].1, 3.0, epsilon = 1e-6);
    // relation: magnitudes sqrt(2) over 2 rows x 2 pairs, cubed
    let expected = 0.5 / 3.0 * 4.0 * 2.0f32.sqrt().powi(3);
    assert_abs_diff_eq!(terms[1].1, expected, epsilon = 1e-4);
}

#[test]
fn weighted_penalty_matches_batch_average_end_to_end() {
    let mut cfg = EmbedderConfig::new(3);
    cfg.regularize = RegularizeMode::Lp;
    cfg.regularize_weight = 2.0;
    cfg.regularize_args.weighted = true;

    let table = sequential_table("entity", &cfg, 6);
    let batch = [1usize, 1, 4, 2, 1];

    let terms = penalty(&table, Vec::new(), Some(&batch)).unwrap();

    let all = table.embed_all();
    let naive: f32 = batch
        .iter()
        .map(|&i| all.row(i).iter().map(|v| v * v).sum::<f32>())
        .sum::<f32>()
        / batch.len() as f32;
    assert_abs_diff_eq!(terms[0].1, 2.0 / 2.0 * naive, epsilon = 1e-5);
}

#[test]
fn dim_rounding_flows_through_to_lookups() {
    let mut cfg = EmbedderConfig::new(48);
    cfg.round_dim_to = vec![32, 64, 128];

    let table = EmbeddingTable::new("entity", &cfg, 7).unwrap();
    assert_eq!(table.dim(), 64);
    assert_eq!(table.embed(&[0, 6]).unwrap().dim(), (2, 64));
    assert_eq!(table.embed_all().dim(), (7, 64));
}

#[test]
fn disabled_aggregation_reads_no_files() {
    // psi <= 0: construction succeeds with a path that does not exist
    let mut cfg = EmbedderConfig::new(4);
    cfg.psi = 0.0;
    cfg.neighbour_edgelist_file = Some("never/loaded.json".into());

    let aggregator =
        NeighbourAggregator::from_config(&cfg, 5, std::path::Path::new("/nonexistent")).unwrap();
    assert!(aggregator.is_none());
}
