//! Bridge scenarios
//!
//! Each scenario has a precondition (`should_run`) checked against the live
//! environment; scenarios whose precondition does not hold are skipped, not
//! failed. A failing scenario does not stop the run.

use amb_relay::{ChainSide, TokenKind};
use async_trait::async_trait;
use eyre::Result;
use std::time::Instant;
use tracing::{error, info};

use crate::env::TestEnv;
use crate::TestResult;

mod failed_message_fix;
mod mediator_balance;
mod metadata;
mod not_owner;
mod round_trip;

pub use failed_message_fix::FailedMessageFix;
pub use mediator_balance::FixMediatorBalance;
pub use metadata::{PullMetadata, PushMetadata};
pub use not_owner::RelayByNotOwner;
pub use round_trip::RoundTrip;

#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> String;

    /// Whether the environment has what the scenario needs
    async fn should_run(&self, env: &TestEnv) -> Result<bool>;

    async fn run(&self, env: &TestEnv) -> Result<()>;
}

/// "Home" / "Foreign", as used in scenario names
fn title(side: ChainSide) -> &'static str {
    match side {
        ChainSide::Home => "Home",
        ChainSide::Foreign => "Foreign",
    }
}

/// Every scenario, in run order
pub fn all_scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(RoundTrip::new(ChainSide::Foreign, TokenKind::Erc721)) as Box<dyn Scenario>,
        Box::new(RoundTrip::new(ChainSide::Home, TokenKind::Erc721)),
        Box::new(RoundTrip::new(ChainSide::Home, TokenKind::Erc721).to_other_user()),
        Box::new(RoundTrip::new(ChainSide::Foreign, TokenKind::Erc721).to_other_user()),
        Box::new(RoundTrip::new(ChainSide::Home, TokenKind::Erc721).using_token_factory()),
        Box::new(RoundTrip::new(ChainSide::Foreign, TokenKind::Erc721).using_token_factory()),
        Box::new(
            RoundTrip::new(ChainSide::Home, TokenKind::Erc721)
                .using_token_factory()
                .to_other_user(),
        ),
        Box::new(RelayByNotOwner::new(ChainSide::Home)),
        Box::new(FixMediatorBalance::new(ChainSide::Foreign)),
        Box::new(FixMediatorBalance::new(ChainSide::Home)),
        Box::new(FailedMessageFix::new(ChainSide::Home)),
        Box::new(FailedMessageFix::new(ChainSide::Foreign)),
        Box::new(RoundTrip::new(ChainSide::Foreign, TokenKind::Erc1155)),
        Box::new(RoundTrip::new(ChainSide::Home, TokenKind::Erc1155)),
        Box::new(PushMetadata::new(TokenKind::Erc721)),
        Box::new(PushMetadata::new(TokenKind::Erc1155)),
        Box::new(PullMetadata),
    ]
}

/// Scenarios whose name contains `filter` (case-insensitive); all when `None`
pub fn select(filter: Option<&str>) -> Vec<Box<dyn Scenario>> {
    let scenarios = all_scenarios();
    match filter {
        Some(filter) => {
            let filter = filter.to_lowercase();
            scenarios
                .into_iter()
                .filter(|s| s.name().to_lowercase().contains(&filter))
                .collect()
        }
        None => scenarios,
    }
}

/// Run scenarios one after another
pub async fn run_scenarios(env: &TestEnv, scenarios: &[Box<dyn Scenario>]) -> Vec<TestResult> {
    let mut results = Vec::with_capacity(scenarios.len());
    for (i, scenario) in scenarios.iter().enumerate() {
        let name = scenario.name();
        println!();
        info!("Running scenario {}/{} - {}", i + 1, scenarios.len(), name);
        let result = run_one(env, scenario.as_ref(), name).await;
        match &result {
            TestResult::Fail { error: e, .. } => error!("FAILED: {}", e),
            other => info!("{}", other.label()),
        }
        results.push(result);
    }
    results
}

async fn run_one(env: &TestEnv, scenario: &dyn Scenario, name: String) -> TestResult {
    let start = Instant::now();
    match scenario.should_run(env).await {
        Ok(true) => {}
        Ok(false) => return TestResult::skip(name, "precondition not met"),
        Err(e) => {
            return TestResult::fail(
                name,
                format!("Precondition check failed: {:#}", e),
                start.elapsed(),
            )
        }
    }
    match scenario.run(env).await {
        Ok(()) => TestResult::pass(name, start.elapsed()),
        Err(e) => TestResult::fail(name, format!("{:#}", e), start.elapsed()),
    }
}
