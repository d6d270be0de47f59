pub mod agent;
pub mod agents;
pub mod cli;
pub mod config;
pub mod crew_file;
pub mod crews;
pub mod doctor;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod profiles;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod registry;
pub mod report;
pub mod result;
pub mod retry;
pub mod runner;
pub mod task;
pub mod telemetry;

#[cfg(test)]
mod tests;
