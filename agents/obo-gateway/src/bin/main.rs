//! OBO Workflow Gateway entry point
//!
//! Operator commands for token exchange, workflow runs and connectivity probes.

use clap::{Parser, Subcommand};
use obo_core::Token;
use obo_gateway::client::ExchangeRequest;
use obo_gateway::contracts::{Constraints, WorkflowInput, WorkflowStatus};
use obo_gateway::{Gateway, GatewayConfig, WorkflowSubmission};
use obo_trace::{HeaderBag, TraceContextCodec, TRACEPARENT};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "obo-gateway")]
#[command(about = "OBO Workflow Gateway - delegated agent calls with trace propagation")]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, global = true, env = "OBO_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange an access token for an OBO token
    Exchange {
        /// Subject access token
        #[arg(short, long, env = "SUBJECT_TOKEN")]
        token: String,

        /// Target resource; defaults to the downstream agent id
        #[arg(short, long)]
        resource: Option<String>,
    },

    /// Run one workflow and wait for it to settle
    Run {
        #[arg(short, long, env = "SUBJECT_TOKEN")]
        token: String,

        /// End-user subject recorded in the delegation chain
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        #[arg(long)]
        scenario: Option<String>,

        #[arg(long)]
        budget: Option<u64>,

        #[arg(long)]
        delivery_time: Option<String>,

        #[arg(long)]
        quality: Option<String>,

        /// Parent traceparent to continue
        #[arg(long)]
        traceparent: Option<String>,

        /// Seconds to wait for a terminal state
        #[arg(long, default_value = "180")]
        wait: u64,
    },

    /// Print a child traceparent, or a new root when no parent is given
    Traceparent {
        #[arg(long)]
        parent: Option<String>,
    },

    /// Probe the STS health endpoint
    StsHealth,

    /// Fetch the downstream agent card
    AgentCard,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::from_env(),
    };

    match cli.command {
        Commands::Traceparent { parent } => {
            let codec = TraceContextCodec::new();
            let sources: Vec<HeaderBag> = parent
                .into_iter()
                .map(|tp| HeaderBag::new().with(TRACEPARENT, tp))
                .collect();
            let ctx = codec.derive_child(&codec.extract_or_root(&sources));
            println!("{}", ctx);
        }

        Commands::Exchange { token, resource } => {
            let gateway = Gateway::from_config(config)?;
            let resource = resource.unwrap_or_else(|| gateway.config().downstream_agent_id.clone());
            let request = ExchangeRequest::new(
                Token::access_token(token),
                resource,
                gateway.config().actor_identity.clone(),
            );

            match gateway.sts().exchange(&request).await {
                Ok(obo) => println!(
                    "{}",
                    serde_json::json!({
                        "resource": obo.resource(),
                        "token": obo.token().fingerprint(),
                        "metadata": obo.token().metadata(),
                    })
                ),
                Err(e) => {
                    eprintln!("Token exchange failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Run {
            token,
            user,
            scenario,
            budget,
            delivery_time,
            quality,
            traceparent,
            wait,
        } => {
            let gateway = Gateway::from_config(config)?;
            let constraints = Constraints {
                budget_limit: budget,
                delivery_time,
                quality_requirement: quality,
            };
            let input = WorkflowInput {
                scenario,
                constraints: (!constraints.is_empty()).then_some(constraints),
                ..Default::default()
            };
            let parent = traceparent.and_then(|tp| {
                TraceContextCodec::new().extract(&[HeaderBag::new().with(TRACEPARENT, tp)])
            });

            let submission = WorkflowSubmission::new(user, Token::access_token(token), input)
                .with_parent_trace(parent);
            let coordinator = gateway.coordinator();
            let id = coordinator.create(submission).await;
            let request = coordinator
                .wait_for_terminal(id, Duration::from_secs(wait))
                .await?;
            let result = coordinator.get_result(id).await.ok();

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "request": request,
                    "result": result,
                }))?
            );

            if request.status == WorkflowStatus::Failed {
                std::process::exit(1);
            }
        }

        Commands::StsHealth => {
            let gateway = Gateway::from_config(config)?;
            let health = gateway.sts().health_check().await;
            println!("{}", serde_json::to_string(&health)?);
            if !health.is_connected() {
                std::process::exit(1);
            }
        }

        Commands::AgentCard => {
            let gateway = Gateway::from_config(config)?;
            match gateway.agent().fetch_agent_card().await {
                Ok(card) => println!(
                    "{}",
                    serde_json::json!({
                        "status": "connected",
                        "agent_name": card.name,
                        "agent_description": card.description,
                        "url": gateway.agent().base_url(),
                    })
                ),
                Err(e) => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "status": "error",
                            "error": e.to_string(),
                            "url": gateway.agent().base_url(),
                        })
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
