// Quorum: opinion clustering for live deliberation
//
// This is the library root. Each module corresponds to a major subsystem:
// the clustering engine, its collaborators (embeddings, storage, headings),
// and the job runner that ties them together.

pub mod clustering;
pub mod config;
pub mod db;
pub mod embedding;
pub mod headings;
pub mod jobs;
pub mod output;
pub mod reasoning;
pub mod status;
