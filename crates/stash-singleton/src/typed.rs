//! Typed values on top of byte singletons.
//!
//! [`SingletonStoreExt`] adds `read_value`/`write_value` to every
//! [`SingletonStore`]. Values are bincode-encoded inside a small tagged
//! wrapper that records the Rust type name, so reading a singleton back into
//! the wrong type fails with `TypeMismatch` instead of decoding garbage. A
//! [`PayloadCodec`] transforms the encoded bytes on the way to and from the
//! store; [`ZstdCodec`] compresses them.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stash_types::{Context, StoreError, StoreResult};

use crate::traits::SingletonStore;

/// Byte transform applied to encoded payloads before they are stored and
/// after they are read.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, raw: Vec<u8>) -> StoreResult<Vec<u8>>;
    fn decode(&self, stored: Vec<u8>) -> StoreResult<Vec<u8>>;
}

/// Stores encoded payloads unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainCodec;

impl PayloadCodec for PlainCodec {
    fn encode(&self, raw: Vec<u8>) -> StoreResult<Vec<u8>> {
        Ok(raw)
    }

    fn decode(&self, stored: Vec<u8>) -> StoreResult<Vec<u8>> {
        Ok(stored)
    }
}

/// zstd compression at a fixed level.
#[derive(Clone, Copy, Debug)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

impl PayloadCodec for ZstdCodec {
    fn encode(&self, raw: Vec<u8>) -> StoreResult<Vec<u8>> {
        zstd::encode_all(raw.as_slice(), self.level)
            .map_err(|e| StoreError::backend(format!("zstd compression failed: {e}"), "encode payload"))
    }

    fn decode(&self, stored: Vec<u8>) -> StoreResult<Vec<u8>> {
        zstd::decode_all(stored.as_slice())
            .map_err(|e| StoreError::TypeMismatch(format!("payload is not zstd-compressed: {e}")))
    }
}

#[derive(Serialize, Deserialize)]
struct TypedPayload {
    type_name: String,
    body: Vec<u8>,
}

/// Encode `value` into the tagged payload format.
pub fn encode_value<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let body = bincode::serialize(value).map_err(|e| {
        StoreError::TypeMismatch(format!("cannot encode {}: {e}", type_name::<T>()))
    })?;
    let payload = TypedPayload {
        type_name: type_name::<T>().to_string(),
        body,
    };
    bincode::serialize(&payload)
        .map_err(|e| StoreError::backend(format!("encoding payload: {e}"), type_name::<T>()))
}

/// Decode a tagged payload into `T`, refusing payloads written as another type.
pub fn decode_value<T: DeserializeOwned>(raw: &[u8]) -> StoreResult<T> {
    let payload: TypedPayload = bincode::deserialize(raw).map_err(|e| {
        StoreError::TypeMismatch(format!("payload is not a typed value: {e}"))
    })?;
    if payload.type_name != type_name::<T>() {
        return Err(StoreError::TypeMismatch(format!(
            "asked to load {} into {}",
            payload.type_name,
            type_name::<T>()
        )));
    }
    bincode::deserialize(&payload.body).map_err(|e| {
        StoreError::TypeMismatch(format!("cannot decode {}: {e}", type_name::<T>()))
    })
}

/// Typed helpers available on every [`SingletonStore`].
pub trait SingletonStoreExt: SingletonStore {
    fn write_value<T: Serialize>(&self, ctx: &Context, name: &str, value: &T) -> StoreResult<()> {
        self.write_value_with(ctx, name, value, &PlainCodec)
    }

    fn read_value<T: DeserializeOwned>(&self, ctx: &Context, name: &str) -> StoreResult<Option<T>> {
        self.read_value_with(ctx, name, &PlainCodec)
    }

    fn write_value_with<T, C>(&self, ctx: &Context, name: &str, value: &T, codec: &C) -> StoreResult<()>
    where
        T: Serialize,
        C: PayloadCodec + ?Sized,
    {
        let raw = codec.encode(encode_value(value)?)?;
        self.write_singleton(ctx, name, &raw)
    }

    fn read_value_with<T, C>(&self, ctx: &Context, name: &str, codec: &C) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned,
        C: PayloadCodec + ?Sized,
    {
        match self.read_singleton(ctx, name)? {
            Some(stored) => {
                let raw = codec.decode(stored)?;
                decode_value(&raw)
                    .map(Some)
                    .map_err(|e| e.with_context(format!("reading singleton {name}")))
            }
            None => Ok(None),
        }
    }
}

impl<S: SingletonStore + ?Sized> SingletonStoreExt for S {}
