//! Loads the configured model and prints a summary of a sample agreement.
//! Handy for checking a model download without starting the server.

use anyhow::Result;
use summarizer::{config::Config, model::ModelHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_AGREEMENT: &str = "\
This Non-Disclosure Agreement (the \"Agreement\") is entered into as of October 26, 2023, \
by and between ACME Corporation, a Delaware corporation with its principal place of \
business at 123 Main Street, Anytown, USA (\"Disclosing Party\"), and Beta Innovations Inc., \
a California corporation with its principal place of business at 456 Innovation Drive, \
Techville, USA (\"Receiving Party\"). WHEREAS, the Disclosing Party possesses certain \
confidential and proprietary information relating to its new widget technology \
(the \"Confidential Information\"); and WHEREAS, the Receiving Party desires to evaluate \
such Confidential Information for the potential purpose of entering into a business \
relationship with the Disclosing Party; NOW, THEREFORE, in consideration of the mutual \
covenants contained herein, the parties agree as follows: The Receiving Party agrees \
not to disclose the Confidential Information to any third party.";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env();

    let model = ModelHandle::initialize(&config.model).await;
    println!("Input text:\n{SAMPLE_AGREEMENT}\n");
    let result = tokio::task::spawn_blocking(move || model.summarize_text(SAMPLE_AGREEMENT)).await?;
    match result {
        Ok(summary) => println!("Summary:\n{summary}"),
        Err(e) => {
            eprintln!("Summarization failed ({}): {e}", e.kind());
            std::process::exit(1);
        }
    }
    Ok(())
}
