use crate::error::{Result, StoreError};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Embedding dimension for lite embedder
pub const LITE_DIM: usize = 384;

/// Socket path for embedding server
pub const SOCKET_PATH: &str = "/tmp/strata-embedder.sock";

/// Turns text into a fixed-length vector
pub trait Embedder: Send + Sync {
    /// Failures are reported as `EmbeddingUnavailable`
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// =============================================================================
// LiteEmbedder - N-gram hashing (pure Rust, zero deps)
// =============================================================================

/// Lightweight embedder using character n-gram hashing
pub struct LiteEmbedder {
    dim: usize,
}

impl Default for LiteEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteEmbedder {
    pub fn new() -> Self {
        Self { dim: LITE_DIM }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Embedder for LiteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let text = text.trim();
        let mut vector = vec![0.0f32; self.dim];

        // Character trigrams
        let chars: Vec<char> = text.chars().collect();
        for i in 0..chars.len().saturating_sub(2) {
            let trigram: String = chars[i..i + 3].iter().collect();
            let idx = (md5_hash(&trigram) % self.dim as u128) as usize;
            vector[idx] += 1.0;
        }

        // Word unigrams (weighted more than trigrams)
        for word in text.split_whitespace() {
            let idx = (md5_hash(word) % self.dim as u128) as usize;
            vector[idx] += 2.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(StoreError::EmbeddingUnavailable(
                "text has no embeddable content".to_string(),
            ));
        }
        for v in &mut vector {
            *v /= norm;
        }

        Ok(vector)
    }
}

/// Compute MD5 hash and return as u128
fn md5_hash(text: &str) -> u128 {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    u128::from_be_bytes(result.into())
}

// =============================================================================
// ServerEmbedder - Unix socket client for an external embedding daemon
// =============================================================================

#[derive(Serialize)]
struct EmbedRequest<'a> {
    cmd: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct PingRequest<'a> {
    cmd: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    ok: bool,
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct PingResponse {
    ok: bool,
    model: Option<String>,
    error: Option<String>,
}

/// Embedder that delegates to a daemon listening on a Unix socket
pub struct ServerEmbedder {
    socket: PathBuf,
}

impl ServerEmbedder {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.socket.exists() && self.ping().is_ok()
    }

    /// Ping the server and get the model name
    pub fn ping(&self) -> Result<String> {
        let response: PingResponse = send_request(&self.socket, &PingRequest { cmd: "ping" })?;

        if response.ok {
            Ok(response.model.unwrap_or_default())
        } else {
            Err(unavailable(response.error))
        }
    }
}

impl Default for ServerEmbedder {
    fn default() -> Self {
        Self::new(SOCKET_PATH)
    }
}

impl Embedder for ServerEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest { cmd: "embed", text };
        let response: EmbedResponse = send_request(&self.socket, &request)?;

        if response.ok {
            response
                .embedding
                .ok_or_else(|| StoreError::EmbeddingUnavailable("no embedding in response".to_string()))
        } else {
            Err(unavailable(response.error))
        }
    }
}

fn unavailable(error: Option<String>) -> StoreError {
    StoreError::EmbeddingUnavailable(error.unwrap_or_else(|| "unknown error".to_string()))
}

/// Send a request to the embedding server and parse the response
fn send_request<R, T>(socket: &Path, request: &R) -> Result<T>
where
    R: Serialize,
    T: for<'de> Deserialize<'de>,
{
    let fail = |what: &str, e: &dyn std::fmt::Display| {
        StoreError::EmbeddingUnavailable(format!("{what}: {e}"))
    };

    let mut stream = UnixStream::connect(socket).map_err(|e| fail("failed to connect to server", &e))?;
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(60)))
        .map_err(|e| fail("failed to set timeout", &e))?;

    let json = serde_json::to_string(request)?;
    stream
        .write_all(json.as_bytes())
        .map_err(|e| fail("failed to send", &e))?;

    // Shutdown write side to signal end of request
    stream
        .shutdown(std::net::Shutdown::Write)
        .map_err(|e| fail("failed to shutdown write", &e))?;

    // Read response (up to 1MB)
    let mut buffer = Vec::new();
    stream
        .take(1024 * 1024)
        .read_to_end(&mut buffer)
        .map_err(|e| fail("failed to read response", &e))?;

    serde_json::from_slice(&buffer).map_err(|e| fail("failed to parse response", &e))
}

// =============================================================================
// Embedder factory
// =============================================================================

/// Get an embedder for the configured model.
///
/// A configured server is used even when it is down: its vectors live in a
/// different space from the lite embedder's, so every call then fails with
/// `EmbeddingUnavailable` instead of mixing the two.
pub fn get_embedder(model: &str, dimension: usize) -> Box<dyn Embedder> {
    if model == "server" {
        let server = ServerEmbedder::default();
        if !server.is_running() {
            warn!(socket = SOCKET_PATH, "embedding server not running");
        }
        return Box::new(server);
    }
    Box::new(LiteEmbedder::with_dim(dimension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::cosine_similarity;

    #[test]
    fn test_lite_embedder() {
        let embedder = LiteEmbedder::new();
        let embedding = embedder.embed("hello world").unwrap();

        assert_eq!(embedding.len(), LITE_DIM);

        // Check normalization (should be unit vector)
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_blank_text_is_unavailable() {
        let embedder = LiteEmbedder::with_dim(16);
        assert!(matches!(
            embedder.embed("   "),
            Err(StoreError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn test_similar_texts_have_higher_similarity() {
        let embedder = LiteEmbedder::new();

        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("the quick brown dog").unwrap();
        let c = embedder.embed("completely different text").unwrap();

        let sim_ab = cosine_similarity(&a, &b).unwrap();
        let sim_ac = cosine_similarity(&a, &c).unwrap();

        assert!(sim_ab > sim_ac);
    }

    #[test]
    fn test_server_embedder_without_daemon() {
        let embedder = ServerEmbedder::new("/nonexistent/strata.sock");
        assert!(!embedder.is_running());
        assert!(matches!(
            embedder.embed("hi"),
            Err(StoreError::EmbeddingUnavailable(_))
        ));
    }
}
