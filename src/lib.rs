//! # Component Harvest
//!
//! Resolves human-typed UI component names against shadcn-style registries,
//! stores what it finds in a local index, and turns stored components into
//! integration instructions for coding agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Registries  │──▶│   Harvester  │──▶│  Index store │
//! │ ref / inline │   │ key → entry  │   │ index.json + │
//! └──────────────┘   └──────┬───────┘   │ payload files│
//!                           │           └──────────────┘
//!               ┌───────────┴──────┐
//!               ▼                  ▼
//!          ┌──────────┐      ┌───────────┐
//!          │   CLI    │      │ HTTP + MCP│
//!          │(harvest) │      │  (/mcp)   │
//!          └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest sources                       # configured registries
//! harvest scan aceternity "3D Pin"      # fetch and store a component
//! harvest prompt aceternity "3D Pin"    # integration instructions
//! harvest serve mcp                     # start the tool server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and built-in sources |
//! | [`error`] | Error taxonomy and wire codes |
//! | [`normalize`] | Canonical keys for component names |
//! | [`models`] | Registry entries, index records, payloads |
//! | [`extract`] | Listing-page extraction strategies |
//! | [`registry`] | Per-source registry caches |
//! | [`fetch`] | HTTP boundary and component payloads |
//! | [`store`] | Durable index and payload files |
//! | [`prompt`] | Integration prompt synthesis |
//! | [`harvest`] | The scan / list / prompt pipeline |
//! | [`traits`] | Tool trait and registry |
//! | [`server`] | HTTP server |
//! | [`mcp`] | MCP protocol bridge |

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod mcp;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod registry;
pub mod server;
pub mod sources;
pub mod store;
pub mod traits;
