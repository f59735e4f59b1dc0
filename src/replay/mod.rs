//! Run checkpoints.
//!
//! A checkpoint captures everything a run needs to continue (state,
//! integrator history, pending events, recorded output) as a compressed,
//! hashed blob. Resuming from it reproduces the uninterrupted run exactly.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::{RunId, SimTime};
use crate::error::{SimError, SimResult};

/// zstd level used for run checkpoints.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Checkpoint with compressed run data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Run the checkpoint belongs to.
    pub run_id: RunId,
    /// Simulation time at checkpoint.
    pub time: SimTime,
    /// Step count at checkpoint.
    pub step: u64,
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Blake3 hash for integrity verification.
    pub hash: [u8; 32],
}

impl RunCheckpoint {
    /// Create a checkpoint from a payload.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or compression fails.
    pub fn create<T: Serialize>(
        run_id: RunId,
        time: SimTime,
        step: u64,
        payload: &T,
    ) -> SimResult<Self> {
        let serialized =
            bincode::serialize(payload).map_err(|e| SimError::serialization(e.to_string()))?;

        let compressed = zstd::encode_all(&serialized[..], COMPRESSION_LEVEL)?;

        let hash = blake3::hash(&compressed);

        Ok(Self {
            run_id,
            time,
            step,
            data: compressed,
            hash: *hash.as_bytes(),
        })
    }

    /// Check the payload against its hash.
    #[must_use]
    pub fn verify(&self) -> bool {
        blake3::hash(&self.data).as_bytes() == &self.hash
    }

    /// Recover the payload.
    ///
    /// # Errors
    ///
    /// Returns `SimError::CheckpointIntegrity` if the hash does not match,
    /// or a serialization error if the payload does not decode as `T`.
    pub fn restore<T: DeserializeOwned>(&self) -> SimResult<T> {
        if !self.verify() {
            return Err(SimError::CheckpointIntegrity);
        }

        let decompressed = zstd::decode_all(&self.data[..])?;

        bincode::deserialize(&decompressed).map_err(|e| SimError::serialization(e.to_string()))
    }

    /// Get compressed size in bytes.
    #[must_use]
    pub fn compressed_size(&self) -> usize {
        self.data.len()
    }
}
