//! Interactive ECR terminal client
//!
//! Usage: `ecr_client [identifier]`
//!
//! Reads commands from stdin:
//! - `start_transaction <id>`
//! - `cancel_transaction <id>`
//! - `notify_group <group>`
//! - `quit`
//!
//! `API_KEY` is required (a `.env` file is honoured). With an identifier the
//! client authenticates as that terminal using the token stored under
//! `ECR_TOKEN_DIR` (default `temp/`).

use anyhow::Result;
use ecr_session::{Callbacks, Disposition, EcrClient, SessionEvent};
use sobit_ecr::bin_common::runner::{format_metrics, init_logging_with_level};
use sobit_ecr::bin_common::terminal::sample_payload;
use sobit_ecr::bin_common::{
    load_config_from_env, parse_args, require_env, BinaryRunner, ClientCommand, ConfigType,
    FileConfig, RunConfig, TokenStore, TransactionResult,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

struct ClientApp {
    run: RunConfig,
    client: EcrClient,
}

impl ClientApp {
    fn dispatch(&self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::StartTransaction(id) => {
                info!("Starting transaction {}", id);
                self.client
                    .start_transaction(sample_payload(&id), id.clone(), transaction_callbacks(id))?;
            }
            ClientCommand::CancelTransaction(id) => {
                info!("Cancelling transaction {}", id);
                self.client
                    .cancel_transaction(id.clone(), transaction_callbacks(id))?;
            }
            ClientCommand::NotifyGroup(group) => {
                info!("Notifying group {}", group);
                let callbacks = Callbacks::new()
                    .on_response(|message, op| {
                        info!("Group reply ({}): {}", op.unwrap_or("-"), message);
                        Disposition::KeepOpen
                    })
                    .on_error(|code, message| {
                        error!("Notification failed [{}]: {}", code, message);
                        Disposition::Close
                    });
                self.client
                    .notify_group(format!("ping from {}", self.run.name), group, callbacks)?;
            }
            ClientCommand::Quit => {}
        }
        Ok(())
    }
}

fn transaction_callbacks(transaction_id: String) -> Callbacks {
    let connected_id = transaction_id.clone();
    let failed_id = transaction_id.clone();

    Callbacks::new()
        .on_connect(move || debug!("Connected for transaction {}", connected_id))
        .on_response(move |message, op| {
            if op == Some("complete_transaction") {
                let result = TransactionResult::from_message(message);
                info!("Transaction {} finished: {}", transaction_id, result);
            } else {
                info!("Transaction {} update ({}): {}", transaction_id, op.unwrap_or("-"), message);
            }
            Disposition::KeepOpen
        })
        .on_error(move |code, message| {
            error!("Transaction {} failed [{}]: {}", failed_id, code, message);
            Disposition::Close
        })
}

impl BinaryRunner for ClientApp {
    async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    None
                }
            };

            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            match ClientCommand::parse(&line) {
                Some(ClientCommand::Quit) => break,
                Some(command) => {
                    if let Err(e) = self.dispatch(command) {
                        error!("Command failed: {}", e);
                    }
                }
                None => warn!("Unknown command: {}", line.trim()),
            }
        }

        self.client.close()?;
        if tokio::time::timeout(CLOSE_GRACE, self.client.wait_closed())
            .await
            .is_err()
        {
            warn!("Session did not close within {:?}", CLOSE_GRACE);
        }
        if let Some(e) = self.client.last_error() {
            warn!("Last session error: {}", e);
        }
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run
    }

    fn stats(&self) -> Option<String> {
        Some(format_metrics(&self.client.metrics()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Session);
    let file_config = FileConfig::load_or_default(&config_path)?;

    init_logging_with_level(&file_config.log_level);
    file_config.log();

    let api_key = require_env("API_KEY")?;
    let identifier = parse_args().into_iter().next();

    let (events_tx, events_rx) = crossbeam_channel::unbounded::<SessionEvent>();
    std::thread::spawn(move || {
        for event in events_rx {
            debug!("Session event: {:?}", event);
        }
    });

    let mut builder = ecr_session::builder()
        .config(file_config.session_config())
        .events(events_tx)
        .api_key(api_key);

    let mut run = RunConfig::new("ECR client", file_config.endpoint.clone());
    if let Some(identifier) = identifier {
        let token_dir = std::env::var("ECR_TOKEN_DIR").unwrap_or_else(|_| "temp".to_string());
        let token = TokenStore::new(token_dir).load_or_create(&identifier)?;
        run = run.with_identifier(identifier.clone());
        builder = builder.identity(identifier, token);
    }

    let mut app = ClientApp {
        run,
        client: builder.build()?,
    };

    app.execute().await
}
