// Sentence embeddings: turn opinion text into vectors for clustering.
//
// The clustering engine only sees `EmbeddingProvider`. The shipped provider
// runs all-MiniLM-L6-v2 locally through ONNX Runtime, loaded lazily the first
// time a job needs it.

pub mod download;
pub mod lazy;
pub mod onnx;
pub mod traits;

pub use lazy::LazyEmbedder;
pub use traits::EmbeddingProvider;
