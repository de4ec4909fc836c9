use stash_types::{Context, Limits, StoreError, StoreResult, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS};
use tracing::debug;

use crate::target::ShardTarget;

/// Item key of the shard starting at byte `offset` of blob `name`.
pub fn shard_key(name: &str, offset: usize) -> String {
    format!("={offset}={name}")
}

/// One bounded slice of a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard<'a> {
    pub key: String,
    pub offset: usize,
    pub data: &'a [u8],
}

/// Splits blobs into at most `max_chunks` shards of at most `chunk_size`
/// bytes, and reassembles them.
///
/// There is no manifest and no cross-shard atomicity. Reads fetch every
/// candidate shard key in one multi-get and concatenate shards in offset
/// order up to the first gap, so a partially written blob reads back as its
/// leading shards. Callers that cannot tolerate that must not rely on the
/// codec for integrity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardCodec {
    chunk_size: usize,
    max_chunks: usize,
}

impl Default for ShardCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS)
    }
}

impl ShardCodec {
    /// # Panics
    ///
    /// Panics if either bound is zero or if `chunk_size * max_chunks`
    /// overflows `usize`.
    pub fn new(chunk_size: usize, max_chunks: usize) -> Self {
        assert!(chunk_size > 0, "shard chunk size must be positive");
        assert!(max_chunks > 0, "shard count cap must be positive");
        assert!(
            chunk_size.checked_mul(max_chunks).is_some(),
            "shard geometry overflows usize"
        );
        Self {
            chunk_size,
            max_chunks,
        }
    }

    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(limits.chunk_size, limits.max_chunks)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Largest blob this codec accepts.
    pub fn ceiling(&self) -> usize {
        self.chunk_size * self.max_chunks
    }

    /// Every key a blob called `name` could occupy, in offset order.
    pub fn candidate_keys(&self, name: &str) -> Vec<String> {
        (0..self.max_chunks)
            .map(|i| shard_key(name, i * self.chunk_size))
            .collect()
    }

    /// Cut `data` into shards without doing any I/O.
    pub fn split<'a>(&self, name: &str, data: &'a [u8]) -> StoreResult<Vec<Shard<'a>>> {
        if data.len() > self.ceiling() {
            return Err(StoreError::SizeLimitExceeded {
                size: data.len(),
                limit: self.ceiling(),
            });
        }
        Ok(data
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let offset = i * self.chunk_size;
                Shard {
                    key: shard_key(name, offset),
                    offset,
                    data: chunk,
                }
            })
            .collect())
    }

    /// Write `data` as shards, in ascending offset order.
    ///
    /// Oversize blobs are rejected before anything is written. Shards left
    /// over from an earlier, longer blob of the same name are removed so
    /// they cannot be appended to this one on read.
    pub fn write<T>(&self, target: &T, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()>
    where
        T: ShardTarget + ?Sized,
    {
        let shards = self.split(name, data)?;
        for (i, shard) in shards.iter().enumerate() {
            target
                .set(ctx, &shard.key, shard.data)
                .map_err(|e| e.with_context(format!("writing shard {i} of blob {name}")))?;
        }
        let stale: Vec<String> = self.candidate_keys(name).split_off(shards.len());
        target
            .delete_multi(ctx, &stale)
            .map_err(|e| e.with_context(format!("clearing stale shards of blob {name}")))?;
        debug!(name, bytes = data.len(), shards = shards.len(), "wrote sharded blob");
        Ok(())
    }

    /// Reassemble the blob called `name`.
    ///
    /// Returns `NotFound` if not even the first shard is present.
    pub fn read<T>(&self, target: &T, ctx: &Context, name: &str) -> StoreResult<Vec<u8>>
    where
        T: ShardTarget + ?Sized,
    {
        let keys = self.candidate_keys(name);
        let mut found = target
            .get_multi(ctx, &keys)
            .map_err(|e| e.with_context(format!("reading shards of blob {name}")))?;

        let mut data = Vec::new();
        let mut shards = 0usize;
        for key in &keys {
            match found.remove(key) {
                Some(chunk) => {
                    data.extend_from_slice(&chunk);
                    shards += 1;
                }
                None => break,
            }
        }
        if shards == 0 {
            return Err(StoreError::NotFound);
        }
        debug!(name, bytes = data.len(), shards, "read sharded blob");
        Ok(data)
    }

    /// Remove every shard of the blob called `name`.
    pub fn delete<T>(&self, target: &T, ctx: &Context, name: &str) -> StoreResult<()>
    where
        T: ShardTarget + ?Sized,
    {
        target
            .delete_multi(ctx, &self.candidate_keys(name))
            .map_err(|e| e.with_context(format!("deleting shards of blob {name}")))
    }
}
