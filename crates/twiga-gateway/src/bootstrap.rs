use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use twiga_agents::replies;
use twiga_agents::{
    ConversationalOnboarding, OpenAiEmbeddingProvider, OpenAiProvider, Responder,
    ResponderSettings, StateDispatcher,
};
use twiga_channels::{WhatsAppChannel, WhatsAppClient};
use twiga_common::{Error, ReplySender, Result};
use twiga_config::AppConfig;
use twiga_db::TwigaStore;

use crate::pipeline::MessagePipeline;

/// Resolve an API key: config value first, then the environment variable.
fn resolve_api_key(config_key: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Some(key.to_string());
    }
    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}

fn required(value: Option<&str>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("{name} is not configured")))
}

/// Build the Graph API client from the `whatsapp` section.
pub fn build_whatsapp_client(config: &AppConfig) -> Result<WhatsAppClient> {
    let wa = &config.whatsapp;
    let token = required(wa.access_token.as_deref(), "whatsapp.access_token")?;
    let phone_number_id = required(wa.phone_number_id.as_deref(), "whatsapp.phone_number_id")?;
    Ok(WhatsAppClient::new(token, phone_number_id)
        .with_base_url(&wa.base_url)
        .with_api_version(&wa.api_version))
}

fn llm_api_key(config: &AppConfig) -> Result<String> {
    resolve_api_key(config.llm.api_key.as_deref(), "OPENAI_API_KEY")
        .ok_or_else(|| Error::Config("no LLM API key (set llm.api_key or OPENAI_API_KEY)".into()))
}

pub fn build_llm(config: &AppConfig) -> Result<OpenAiProvider> {
    Ok(OpenAiProvider::new(
        llm_api_key(config)?,
        config.llm.model.clone(),
        config.llm.base_url.clone(),
    )
    .with_timeout(Duration::from_secs(config.llm.timeout_secs)))
}

/// Embedding provider from the `embeddings` section. Falls back to the LLM
/// key when no dedicated key is configured.
pub fn build_embedder(config: &AppConfig) -> Result<OpenAiEmbeddingProvider> {
    let key = match resolve_api_key(config.embeddings.api_key.as_deref(), "OPENAI_API_KEY") {
        Some(key) => key,
        None => llm_api_key(config)?,
    };
    Ok(OpenAiEmbeddingProvider::new(
        key,
        config.embeddings.model.clone(),
        config.embeddings.base_url.clone(),
    )
    .with_timeout(Duration::from_secs(config.embeddings.timeout_secs)))
}

/// Wire the store, providers, onboarding flow and responder into a pipeline.
/// Replies produced during onboarding go out through `sender`.
pub fn build_pipeline(
    config: &AppConfig,
    store: Arc<TwigaStore>,
    sender: Arc<dyn ReplySender>,
) -> Result<MessagePipeline> {
    let llm = build_llm(config)?;
    let embedder = build_embedder(config)?;

    let onboarding = ConversationalOnboarding::new(Arc::clone(&store), sender);
    let dispatcher = StateDispatcher::new(Arc::new(onboarding), &config.bot.support_contact);
    let responder = Responder::new(
        Arc::clone(&store),
        Arc::new(embedder),
        Arc::new(llm),
        ResponderSettings {
            history_limit: config.bot.history_limit,
            search_results: config.bot.search_results,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        },
    );

    info!(
        "message pipeline ready (daily limit: {})",
        config
            .bot
            .daily_message_limit
            .filter(|l| *l > 0)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "none".into())
    );

    Ok(MessagePipeline::new(
        store,
        dispatcher,
        responder,
        config.bot.daily_message_limit,
    ))
}

/// Build the WhatsApp channel whose webhook feeds the message pipeline.
pub fn build_whatsapp_channel(
    config: &AppConfig,
    store: Arc<TwigaStore>,
) -> Result<WhatsAppChannel> {
    let client = build_whatsapp_client(config)?;
    let verify_token = required(config.whatsapp.verify_token.as_deref(), "whatsapp.verify_token")?;
    if config.whatsapp.app_secret.is_none() {
        info!("whatsapp app secret not set, webhook signatures will not be verified");
    }

    let pipeline = Arc::new(build_pipeline(config, store, Arc::new(client.clone()))?);
    Ok(WhatsAppChannel::new(
        client,
        verify_token,
        config.whatsapp.app_secret.clone(),
        replies::default_error(&config.bot.support_contact),
        pipeline.into_handler(),
    ))
}
