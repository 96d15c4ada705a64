// src/lib.rs

// 1. Data Structures (The "Nouns")
pub mod models;

// 2. Failure Taxonomy
pub mod errors;

// 3. Interfaces (The "Contract")
pub mod traits;

// 4. Adapters (The "Plumbing")
pub mod connectors;

// 5. Market Discovery (The "Catalog")
pub mod catalog;

// 6. Chain Assembly (The "Brains")
pub mod chain;

// 7. Refresh Loop (The "Orchestrator")
pub mod engine;

// 8. Configuration
pub mod config;

// 9. Web UI
pub mod dashboard;
