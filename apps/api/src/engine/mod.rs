// Optimization engine: parse → match → score → recommend → revise, under a
// termination-controlled loop. All capability calls go through llm_client::LlmGateway.

pub mod config;
pub mod handlers;
pub mod matcher;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod recommender;
pub mod reviser;
pub mod scorer;
pub mod themes;

#[cfg(test)]
pub mod testing;
