// Credential entity, naming, and encrypted storage
pub mod credentials;

// Provider OAuth flows and source-type routing
pub mod oauth;

// Injected progress/outcome reporting
pub mod report;
