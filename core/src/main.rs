use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pitchcoach_core::config::EngineConfig;
use pitchcoach_core::entitlement::{
    EntitlementGate, EntitlementSnapshot, InMemoryLedger, UserContext,
};
use pitchcoach_core::generation::{FallbackResponder, GenerationService, ResponseGenerator};
use pitchcoach_core::rate_limit::RateLimiter;
use pitchcoach_core::scenario::Scenario;
use pitchcoach_core::session::{
    PracticeSession, SessionDeps, SessionState, SessionUpdate, Speaker, StartRequest,
};
use pitchcoach_core::telemetry::init_tracing_with_log_dir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const DEMO_USER: &str = "demo-user";

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing_with_log_dir(std::env::var_os("PITCHCOACH_LOG_DIR"));

    let config = EngineConfig::from_env().context("invalid PITCHCOACH_* configuration")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let arg = |index: usize, default: &'static str| -> String {
        args.get(index).cloned().unwrap_or_else(|| default.to_string())
    };
    let scenario = Scenario::parse(&arg(0, "medium"), &arg(1, "price"), &arg(2, "SaaS"), None)
        .context("invalid scenario arguments (difficulty category industry)")?;

    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .insert_account(
            DEMO_USER,
            EntitlementSnapshot {
                credits_remaining: 0,
                trial_used: false,
            },
        )
        .await;
    let gate = Arc::new(
        EntitlementGate::with_trial_policy(ledger, config.auto_grant_trial)
            .with_ledger_timeout(config.ledger_timeout),
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let _janitor = RateLimiter::spawn_janitor(&limiter, config.rate_limit.window);
    let generator = Arc::new(ResponseGenerator::with_components(
        config.generator_config(),
        remote_service(&config),
        Some(limiter),
        FallbackResponder::new(config.fallback_seed),
    ));

    info!(
        target: "pitchcoach",
        remote = config.generation_endpoint.is_some(),
        "starting text-only practice session"
    );
    let session = PracticeSession::spawn(
        config,
        UserContext::authenticated(DEMO_USER),
        SessionDeps::new(gate, generator),
    );

    let mut updates = session.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                SessionUpdate::MessageAppended(message) if message.sender == Speaker::Counterpart => {
                    println!("buyer> {}", message.text);
                }
                SessionUpdate::Notice(notice) => eprintln!("[{}] {}", notice.code, notice.message),
                _ => {}
            }
        }
    });

    let state = session.start(StartRequest::text_only(scenario)).await?;
    if let Some(reason) = state.block_reason() {
        bail!("{}", reason.user_message());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        session.submit_utterance(line).await?;
                    }
                    None => break,
                }
            }
            _ = session.wait_for(|state| !state.is_recording()) => break,
        }
    }

    let state = if session.state().is_recording() {
        session.stop().await?
    } else {
        session
            .wait_for(|state| matches!(state, SessionState::Complete { .. }))
            .await?
    };
    let result = state.score().context("session ended without a score")?;
    println!("{}", serde_json::to_string_pretty(result)?);

    Ok(())
}

#[cfg(feature = "http-generation")]
fn remote_service(config: &EngineConfig) -> Option<Arc<dyn GenerationService>> {
    use pitchcoach_core::generation::HttpGenerationService;

    config.generation_endpoint.as_ref().map(|endpoint| {
        Arc::new(HttpGenerationService::new(
            endpoint.clone(),
            config.remote_timeout,
        )) as Arc<dyn GenerationService>
    })
}

#[cfg(not(feature = "http-generation"))]
fn remote_service(_config: &EngineConfig) -> Option<Arc<dyn GenerationService>> {
    None
}
