//! # Folio
//!
//! A retrieval-grounded chatbot backend for a personal portfolio site.
//!
//! Folio ingests a directory of site content (resume, bio, posts), splits it
//! into chunks, embeds each chunk, and writes a flat JSON index. At query
//! time it embeds the visitor's question, ranks the index by cosine
//! similarity, and asks a chat model to answer from the retrieved context
//! only, refusing questions the content does not cover.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  content/   │──▶│  Pipeline   │──▶│  index.json  │
//! │ md/txt/json │   │ Chunk+Embed │   │ id,text,vec  │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                   ┌────────────────────────┤
//!                   ▼                        ▼
//!             ┌──────────┐  rank + gate ┌──────────┐
//!             │   CLI    │─────────────▶│   HTTP   │
//!             │ (folio)  │   chat model │ /api/chat│
//!             └──────────┘              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio ingest                         # build static/data/index.json
//! folio search "rust experience" --scores
//! folio ask "What do you work on?"
//! folio serve                          # start the chat API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`connector_fs`] | Content directory scanner |
//! | [`chunk`] | Heading- and paragraph-aware chunking |
//! | [`provider`] | Embedding/chat provider resolution |
//! | [`embedding`] | Embedding client |
//! | [`ingest`] | Offline index build |
//! | [`index_store`] | Index loading and caching |
//! | [`search`] | Cosine ranking with diversification and anchors |
//! | [`chat`] | Chat completion client |
//! | [`ask`] | Retrieve, gate, and answer |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod embedding;
pub mod index_store;
pub mod ingest;
pub mod models;
pub mod provider;
pub mod search;
pub mod server;
