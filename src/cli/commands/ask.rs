use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use crate::cli::output::{AnswerInfo, get_formatter};
use crate::context::AppContext;
use crate::models::{Config, OutputFormat};
use crate::services::{GenerationClient, RagRetriever, augment_prompt};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the ingested documents")]
    pub prompt: String,

    #[arg(long, short = 'm', help = "Generation model (default: generation.model)")]
    pub model: Option<String>,

    #[arg(long, short = 't', help = "Sampling temperature")]
    pub temperature: Option<f32>,

    #[arg(long, short = 'c', help = "Collection to retrieve context from")]
    pub collection: Option<String>,

    #[arg(long, help = "Send the prompt without retrieved context")]
    pub no_rag: bool,

    #[arg(long, help = "Print the retrieved context with the answer")]
    pub show_context: bool,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("prompt cannot be empty");
    }

    let mut config = Config::load()?;
    if let Some(collection) = args.collection {
        config.retrieval.collection = collection;
    }
    let formatter = get_formatter(format);

    let client = GenerationClient::new(&config.generation)?;
    let model = args.model.unwrap_or_else(|| client.model().to_string());
    let temperature = args.temperature.unwrap_or(config.generation.temperature);

    let rag_content = if args.no_rag {
        String::new()
    } else {
        let ctx = AppContext::from_config(config).await?;
        RagRetriever::from_context(&ctx)
            .get_rag_content(prompt)
            .await
    };

    if verbose {
        eprintln!("Model: {model}");
        eprintln!("  Temperature: {temperature}");
        eprintln!("  Context: {} chars", rag_content.len());
    }

    let augmented = augment_prompt(prompt, &rag_content);
    debug!(model = %model, chars = augmented.len(), "sending prompt");

    let answer = client
        .generate_with_model(&model, &augmented, temperature)
        .await
        .context("generation failed")?;

    let info = AnswerInfo {
        model,
        prompt: prompt.to_string(),
        answer,
        context: args.show_context.then_some(rag_content),
    };
    print!("{}", formatter.format_answer(&info));

    Ok(())
}
