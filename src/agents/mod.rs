mod claude;

pub use claude::ClaudeAgent;
