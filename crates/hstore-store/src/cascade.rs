//! Cascade Adapter (C2): composes N ordered block adapters into one adapter
//! that enforces write-through / read-hydrate behavior (spec.md §4.2).

use crate::adapter::{AdapterError, BlockAdapter, StoredBlock};
use crate::hash::Hash;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cascade adapter requires at least one layer")]
    EmptyLayers,
}

/// Composes `layers[0]` (fastest) .. `layers[n-1]` (slowest) into a single
/// [`BlockAdapter`]. Reads probe front-to-back and hydrate hits upward;
/// writes fan out to every layer and only complete once all have
/// acknowledged.
pub struct CascadeAdapter {
    layers: Vec<Arc<dyn BlockAdapter>>,
}

impl CascadeAdapter {
    pub fn new(layers: Vec<Arc<dyn BlockAdapter>>) -> Result<Self, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::EmptyLayers);
        }
        Ok(CascadeAdapter { layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

#[async_trait]
impl BlockAdapter for CascadeAdapter {
    async fn read(&self, hash: &Hash) -> Result<Option<StoredBlock>, AdapterError> {
        let _span = tracing::debug_span!(target: "cascade", "cascade.read", %hash).entered();

        for (index, layer) in self.layers.iter().enumerate() {
            let Some(block) = layer.read(hash).await? else { continue };

            if index > 0 {
                // Hydrate up: copy into every faster layer that missed.
                // Failures here must not turn a successful read into an
                // error — the read was already satisfied by `layer`.
                let hydrate_targets = &self.layers[..index];
                let results = join_all(
                    hydrate_targets.iter().map(|target| target.write(block.clone())),
                )
                .await;
                for (target_index, result) in results.into_iter().enumerate() {
                    if let Err(err) = result {
                        tracing::warn!(
                            target: "cascade",
                            layer = target_index,
                            %hash,
                            error = %err,
                            "hydrate-up write failed; read still succeeds"
                        );
                    }
                }
            }

            return Ok(Some(block));
        }

        Ok(None)
    }

    async fn write(&self, block: StoredBlock) -> Result<(), AdapterError> {
        let _span =
            tracing::debug_span!(target: "cascade", "cascade.write", hash = %block.hash).entered();

        let results = join_all(self.layers.iter().map(|layer| layer.write(block.clone()))).await;

        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::error!(target: "cascade", layer = index, error = %err, "layer write failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemLayer {
        blocks: Mutex<std::collections::HashMap<Hash, StoredBlock>>,
        reads: std::sync::atomic::AtomicUsize,
        writes: std::sync::atomic::AtomicUsize,
        fail_writes: bool,
    }

    #[async_trait]
    impl BlockAdapter for MemLayer {
        async fn read(&self, hash: &Hash) -> Result<Option<StoredBlock>, AdapterError> {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.blocks.lock().unwrap().get(hash).cloned())
        }

        async fn write(&self, block: StoredBlock) -> Result<(), AdapterError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail_writes {
                return Err(AdapterError::Other(anyhow::anyhow!("layer unavailable")));
            }
            self.blocks.lock().unwrap().insert(block.hash.clone(), block);
            Ok(())
        }
    }

    #[test]
    fn empty_layers_fails_construction() {
        assert!(matches!(CascadeAdapter::new(vec![]), Err(ConfigError::EmptyLayers)));
    }

    #[tokio::test]
    async fn write_fans_out_to_every_layer() {
        let l0 = Arc::new(MemLayer::default());
        let l1 = Arc::new(MemLayer::default());
        let cascade =
            CascadeAdapter::new(vec![l0.clone() as Arc<dyn BlockAdapter>, l1.clone()]).unwrap();

        let block = StoredBlock::new(Hash::from("h1"), &b"payload"[..]);
        cascade.write(block.clone()).await.unwrap();

        assert_eq!(l0.read(&block.hash).await.unwrap(), Some(block.clone()));
        assert_eq!(l1.read(&block.hash).await.unwrap(), Some(block));
    }

    #[tokio::test]
    async fn read_hydrates_faster_layers() {
        let l0 = Arc::new(MemLayer::default());
        let l1 = Arc::new(MemLayer::default());
        let block = StoredBlock::new(Hash::from("h1"), &b"payload"[..]);
        l1.blocks.lock().unwrap().insert(block.hash.clone(), block.clone());

        let cascade =
            CascadeAdapter::new(vec![l0.clone() as Arc<dyn BlockAdapter>, l1.clone()]).unwrap();

        let read_back = cascade.read(&block.hash).await.unwrap();
        assert_eq!(read_back, Some(block.clone()));

        // l0 now has the block...
        assert_eq!(l0.read(&block.hash).await.unwrap(), Some(block));
        // ...and a subsequent read is satisfiable from l0 alone (verified by
        // checking l1's read counter doesn't need to move: in the real
        // cascade it still probes l0 first and stops there).
        let reads_before = l1.reads.load(std::sync::atomic::Ordering::SeqCst);
        let hash = l0.blocks.lock().unwrap().keys().next().unwrap().clone();
        cascade.read(&hash).await.unwrap();
        assert_eq!(l1.reads.load(std::sync::atomic::Ordering::SeqCst), reads_before);
    }

    #[tokio::test]
    async fn read_returns_none_when_absent_everywhere() {
        let l0 = Arc::new(MemLayer::default());
        let cascade = CascadeAdapter::new(vec![l0 as Arc<dyn BlockAdapter>]).unwrap();
        assert_eq!(cascade.read(&Hash::from("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_failure_on_one_layer_surfaces_error_but_others_still_get_written() {
        let l0 = Arc::new(MemLayer { fail_writes: true, ..Default::default() });
        let l1 = Arc::new(MemLayer::default());
        let cascade =
            CascadeAdapter::new(vec![l0.clone() as Arc<dyn BlockAdapter>, l1.clone()]).unwrap();

        let block = StoredBlock::new(Hash::from("h1"), &b"payload"[..]);
        let result = cascade.write(block.clone()).await;
        assert!(result.is_err());
        assert_eq!(l1.read(&block.hash).await.unwrap(), Some(block));
    }

    #[tokio::test]
    async fn single_layer_cascade_behaves_like_the_underlying_adapter() {
        let l0 = Arc::new(MemLayer::default());
        let cascade = CascadeAdapter::new(vec![l0.clone() as Arc<dyn BlockAdapter>]).unwrap();

        let block = StoredBlock::new(Hash::from("h1"), &b"payload"[..]);
        cascade.write(block.clone()).await.unwrap();
        assert_eq!(cascade.read(&block.hash).await.unwrap(), Some(block));
    }
}
