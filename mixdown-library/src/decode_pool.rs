//! Concurrent decoding - every request runs on its own worker thread
//!
//! Results arrive on one channel in completion order, tagged with the id the
//! request was given at submission.

use crate::loader::{LoadError, LoadedTrack, TrackLoader};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// What to decode
#[derive(Debug, Clone)]
pub enum DecodeSource {
    /// Read and decode a file on the worker
    File(PathBuf),
    /// Decode bytes already in memory
    Bytes {
        name: String,
        bytes: Vec<u8>,
        extension: Option<String>,
    },
}

impl DecodeSource {
    /// Display name for logs and the track list
    pub fn name(&self) -> String {
        match self {
            DecodeSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            DecodeSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// A finished decode
#[derive(Debug)]
pub struct DecodeOutcome {
    pub request_id: u64,
    pub name: String,
    pub result: Result<LoadedTrack, LoadError>,
}

/// Fans decodes out to worker threads
pub struct DecodePool {
    loader: Arc<TrackLoader>,
    results_tx: Sender<DecodeOutcome>,
    results_rx: Receiver<DecodeOutcome>,
    next_id: u64,
    pending: Arc<AtomicUsize>,
}

impl DecodePool {
    pub fn new(loader: TrackLoader) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self {
            loader: Arc::new(loader),
            results_tx,
            results_rx,
            next_id: 0,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start decoding `source`; returns the id its outcome will carry
    pub fn submit(&mut self, source: DecodeSource) -> Result<u64, LoadError> {
        let request_id = self.next_id;
        self.next_id += 1;

        let loader = Arc::clone(&self.loader);
        let tx = self.results_tx.clone();
        let pending = Arc::clone(&self.pending);
        let name = source.name();

        pending.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("mixdown-decode-{}", request_id))
            .spawn(move || {
                let started = Instant::now();
                let result = match source {
                    DecodeSource::File(path) => loader.load(&path),
                    DecodeSource::Bytes {
                        bytes, extension, ..
                    } => loader
                        .decode_bytes(bytes, extension.as_deref())
                        .map_err(LoadError::from),
                };
                match &result {
                    Ok(track) => info!(
                        request_id,
                        name = %name,
                        frames = track.buffer.frames(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "decoded"
                    ),
                    Err(e) => debug!(request_id, name = %name, error = %e, "decode failed"),
                }
                pending.fetch_sub(1, Ordering::AcqRel);
                let _ = tx.send(DecodeOutcome {
                    request_id,
                    name,
                    result,
                });
            });

        if let Err(e) = spawned {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(LoadError::Io(e));
        }
        Ok(request_id)
    }

    /// Channel every outcome is delivered on
    pub fn results(&self) -> &Receiver<DecodeOutcome> {
        &self.results_rx
    }

    /// Number of decodes still running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_audio::{wav, DecodeError, PcmBuffer};
    use std::collections::HashMap;
    use std::time::Duration;

    fn wav_bytes(frames: usize) -> Vec<u8> {
        wav::encode(&PcmBuffer::silence(1, frames, 8000).unwrap()).unwrap()
    }

    #[test]
    fn test_parallel_decodes_all_complete() {
        let mut pool = DecodePool::new(TrackLoader::new());
        let mut expected = HashMap::new();
        for frames in [10usize, 2000, 300, 40] {
            let id = pool
                .submit(DecodeSource::Bytes {
                    name: format!("{}.wav", frames),
                    bytes: wav_bytes(frames),
                    extension: Some("wav".into()),
                })
                .unwrap();
            expected.insert(id, frames);
        }

        for _ in 0..expected.len() {
            let outcome = pool
                .results()
                .recv_timeout(Duration::from_secs(10))
                .unwrap();
            let frames = expected.remove(&outcome.request_id).unwrap();
            assert_eq!(outcome.result.unwrap().buffer.frames(), frames);
        }
        assert!(expected.is_empty());
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_one_bad_file_does_not_affect_others() {
        let mut pool = DecodePool::new(TrackLoader::new());
        let bad = pool
            .submit(DecodeSource::Bytes {
                name: "bad".into(),
                bytes: b"nope".to_vec(),
                extension: None,
            })
            .unwrap();
        let good = pool
            .submit(DecodeSource::Bytes {
                name: "good".into(),
                bytes: wav_bytes(5),
                extension: None,
            })
            .unwrap();

        let mut outcomes: Vec<DecodeOutcome> = (0..2)
            .map(|_| pool.results().recv_timeout(Duration::from_secs(10)).unwrap())
            .collect();
        outcomes.sort_by_key(|o| o.request_id);

        assert_eq!(outcomes[0].request_id, bad);
        assert!(matches!(
            outcomes[0].result,
            Err(LoadError::Decode(DecodeError::Unsupported(_)))
        ));
        assert_eq!(outcomes[1].request_id, good);
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn test_file_source_name() {
        let source = DecodeSource::File(PathBuf::from("/music/take 2.flac"));
        assert_eq!(source.name(), "take 2.flac");
    }
}
