use boxbattle_engine::fairness::{self, Commitment};
use boxbattle_engine::{EngineError, Result};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum FairCommands {
    /// Commit a draw and immediately reveal it
    Commit {
        /// Client seed (generated when omitted)
        #[arg(short, long)]
        client_seed: Option<String>,
        /// Nonce of the draw
        #[arg(short, long, default_value = "0")]
        nonce: u64,
        /// Number of possible outcomes
        #[arg(short, long)]
        items: u64,
    },
    /// Check a revealed commitment
    Verify {
        #[arg(long)]
        server_seed: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        combined_hash: String,
        #[arg(long)]
        result_hash: String,
        #[arg(long)]
        result: u64,
    },
}

pub fn handle_fair_command(cmd: FairCommands) -> Result<()> {
    match cmd {
        FairCommands::Commit {
            client_seed,
            nonce,
            items,
        } => {
            let commitment = Commitment::commit(client_seed, nonce, items)?;

            println!("Published before the draw:");
            println!("{}", to_json(&commitment.public())?);
            println!();
            println!("Revealed after the draw:");
            println!("{}", to_json(&commitment.reveal())?);
        }

        FairCommands::Verify {
            server_seed,
            client_seed,
            nonce,
            combined_hash,
            result_hash,
            result,
        } => {
            let valid = fairness::verify(
                &server_seed,
                &client_seed,
                nonce,
                &combined_hash,
                &result_hash,
                result,
            )?;
            if valid {
                println!("Valid: the revealed seeds reproduce both hashes");
            } else {
                println!("INVALID: the revealed values do not match the commitment");
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::Internal(format!("Failed to encode output: {}", e)))
}
