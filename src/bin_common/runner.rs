//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with proper
//! logging initialization, banners and shutdown reporting.

use ecr_session::Metrics;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Service endpoint shown in the banner
    pub endpoint: String,
    /// Terminal identifier, when running as an identified terminal
    pub identifier: Option<String>,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            identifier: None,
        }
    }

    /// Set terminal identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Initialize tracing; `RUST_LOG` overrides the configured level
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}

/// One-line summary of session counters
pub fn format_metrics(metrics: &Metrics) -> String {
    format!(
        "Frames sent: {}, received: {}, retransmits: {}, reconnects: {}",
        metrics.frames_sent, metrics.frames_received, metrics.retransmits, metrics.reconnects
    )
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application main loop
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Summary printed in the shutdown banner
    fn stats(&self) -> Option<String> {
        None
    }

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Endpoint: {}", config.endpoint);
        match &config.identifier {
            Some(identifier) => info!("Terminal: {}", identifier),
            None => info!("Terminal: anonymous"),
        }
        info!("Type 'quit' or press Ctrl+D to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        let stats = self.stats();
        self.print_shutdown(stats.as_deref());
        result
    }
}
