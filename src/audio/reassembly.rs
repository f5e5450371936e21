//! # Chunk Reassembly
//!
//! Streaming calls arrive as many small records. Each decoded record becomes
//! an [`AudioChunk`]; the [`ChunkAssembler`] concatenates them strictly in the
//! order they were pushed, which is the order of the source record list.

/// One decoded fragment of a streaming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Decoded audio bytes
    pub bytes: Vec<u8>,
    /// Position of the source record in the event's record list
    pub index: usize,
    /// Partition key of the source record (the caller identifier)
    pub partition_key: Option<String>,
}

/// Collects decoded chunks and tracks which records were dropped.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: Vec<AudioChunk>,
    skipped: Vec<usize>,
    total_bytes: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        self.total_bytes += chunk.bytes.len();
        self.chunks.push(chunk);
    }

    /// Note a record whose payload could not be decoded.
    pub fn skip(&mut self, index: usize) {
        self.skipped.push(index);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Concatenate all chunks in push order.
    pub fn assemble(self) -> Vec<u8> {
        let mut audio = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks {
            audio.extend_from_slice(&chunk.bytes);
        }
        audio
    }
}
