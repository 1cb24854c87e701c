//! Minimal host binary wiring `router-core` together: constructs a
//! `Router` with an in-process adapter factory and runs one `generate`
//! call from the command line. Stands in for the browser-extension
//! background service, which is out of scope for this crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use router_core::adapter::{Adapter, AdapterFactory};
use router_core::error::AdapterError;
use router_core::models::{AdapterRequest, AdapterResponse, Request, RoutingConfig};
use router_core::router::AgentConfig;
use router_core::{ProviderRegistry, Router};

#[derive(Parser, Debug)]
struct Args {
    /// Text to summarise.
    text: String,

    /// Ordered list of provider ids to try, e.g. "gemini_paid,openai_paid".
    #[arg(long, value_delimiter = ',', default_value = "ollama")]
    provider_order: Vec<String>,

    /// Preferred provider, overriding the order's first slot (local/free tiers win immediately).
    #[arg(long)]
    preference: Option<String>,

    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

/// An adapter that always succeeds, echoing the input text back as the
/// "summary" — useful for exercising the wiring without real provider keys.
struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
    async fn summarise(&self, request: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
        Ok(AdapterResponse {
            summary: format!("[{}] {}", request.model, request.text),
            prompt_tokens: None,
            completion_tokens: None,
            model: Some(request.model),
        })
    }
}

struct EchoFactory;

impl AdapterFactory for EchoFactory {
    fn create(&self, _adapter_kind: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        Ok(Arc::new(EchoAdapter))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(EchoFactory));
    router
        .set_agent_config(AgentConfig {
            routing: RoutingConfig {
                provider_order: args.provider_order,
                dry_run: args.dry_run,
                ..Default::default()
            },
            providers: HashMap::new(),
            ..Default::default()
        })
        .await;

    let request = Request {
        text: args.text,
        language: "en".to_string(),
        preference: args.preference,
        metadata: Default::default(),
    };

    let response = router.generate(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
