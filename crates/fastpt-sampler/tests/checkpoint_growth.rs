use fastpt_core::{LayoutBuilder, ParameterLayout, Prior, PriorDistribution, RunConfig};
use fastpt_models::GaussianAccelerator;
use fastpt_sampler::{ChainInit, ChainPool, CheckpointWriter, FileStore, Flush, MemoryStore};
use indexmap::IndexMap;
use ndarray::{array, Array2};
use std::sync::Arc;

/// Forwards to two stores and keeps every flush.
struct Tee<'a> {
    memory: MemoryStore,
    file: &'a mut FileStore,
    flushes: Vec<Flush>,
}

impl CheckpointWriter for Tee<'_> {
    fn write(&mut self, flush: &Flush) -> fastpt_sampler::Result<()> {
        self.memory.write(flush)?;
        self.file.write(flush)?;
        self.flushes.push(flush.clone());
        Ok(())
    }
}

fn pool(config: RunConfig) -> ChainPool<GaussianAccelerator> {
    let mut builder = LayoutBuilder::new();
    builder.shared_intrinsic("s").extrinsic("x");
    let layout: Arc<ParameterLayout> = Arc::new(builder.build().unwrap());
    let mut priors = IndexMap::new();
    priors.insert("s".to_string(), PriorDistribution::normal(0.0, 2.0));
    priors.insert("x".to_string(), PriorDistribution::uniform(-5.0, 5.0));
    let prior = Prior::for_layout(&layout, &priors).unwrap();
    let model_layout = layout.clone();
    ChainPool::new(
        config,
        layout,
        prior,
        ChainInit::Explicit(vec![vec![0.1, -0.1]; 2]),
        move |state| {
            GaussianAccelerator::new(&model_layout, array![1.0, 0.0], Array2::eye(2), state)
        },
    )
    .unwrap()
}

#[test]
fn test_three_flushes_persist_exactly_150_samples() {
    let config = RunConfig {
        n_iterations: 300,
        n_chain: 2,
        t_max: 2.0,
        n_int_block: 10,
        save_every_n: 100,
        n_update_fisher: 100,
        n_status_update: 3,
        thin: 2,
        ..RunConfig::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut file = FileStore::create(dir.path()).unwrap();
    let mut tee = Tee {
        memory: MemoryStore::new(),
        file: &mut file,
        flushes: Vec::new(),
    };
    pool(config).run(&mut tee).unwrap();

    assert_eq!(tee.flushes.len(), 3);
    for (k, flush) in tee.flushes.iter().enumerate() {
        assert_eq!(flush.index, k);
        assert_eq!(flush.samples.nrows(), 50);
        assert_eq!(flush.iteration, 100 * (k + 1));
    }
    assert_eq!(tee.memory.n_samples(), 150);
    let loaded = FileStore::load(dir.path()).unwrap();
    assert_eq!(loaded.n_samples(), 150);
    assert_eq!(loaded.n_flushes, 3);
    assert_eq!(&loaded, tee.memory.run().unwrap());
}

#[test]
fn test_flush_boundaries_neither_duplicate_nor_drop() {
    let config = RunConfig {
        n_iterations: 150,
        n_chain: 2,
        t_max: 2.0,
        n_int_block: 10,
        save_every_n: 50,
        n_update_fisher: 50,
        n_status_update: 3,
        thin: 1,
        ..RunConfig::default()
    };
    let mut pool = pool(config);
    let mut store = MemoryStore::new();
    // cold state at the end of every block is global row 10 * block
    let mut block_ends = vec![(pool.cold().params.values().to_vec(), pool.cold().log_likelihood)];
    for _ in 0..15 {
        pool.advance(1, &mut store).unwrap();
        block_ends.push((pool.cold().params.values().to_vec(), pool.cold().log_likelihood));
    }

    let run = store.run().unwrap();
    assert_eq!(run.n_samples(), 150);
    for (block, (values, log_likelihood)) in block_ends.iter().take(15).enumerate() {
        let row = 10 * block;
        assert_eq!(run.samples.row(row).to_vec(), *values, "row {}", row);
        assert_eq!(run.log_likelihood[row], *log_likelihood);
    }
}
