//! Scripted walk through the console against the simulated chain. Each step
//! goes through the same reducer and effect runner as the interactive console.

use escrow_core::reduce;
use escrow_core::Address;
use escrow_core::CallRequest;
use escrow_core::Config;
use escrow_core::ConsoleAction;
use escrow_core::ConsoleState;
use escrow_core::ConsoleTab;
use escrow_core::FormState;
use escrow_core::OperationId;
use escrow_core::UserAction;
use escrow_exec::CallOutcome;
use escrow_exec::PhaseUpdate;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::services::phase_action;
use crate::services::Services;

/// The timeout scenario should not take the configured two minutes.
const DEMO_CONFIRMATION_TIMEOUT_MS: u64 = 2_000;
const DEMO_POLL_INTERVAL_MS: u64 = 200;

const CHILD: u64 = 0x456;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoEntry {
    pub scenario: &'static str,
    pub step: String,
    pub status: Option<String>,
    pub error_kind: Option<&'static str>,
    pub phases: Vec<&'static str>,
}

struct Demo {
    services: Services,
    updates: mpsc::UnboundedReceiver<PhaseUpdate>,
    state: ConsoleState,
    transcript: Vec<DemoEntry>,
}

impl Demo {
    fn new(config: &Config) -> Self {
        let mut config = config.clone();
        config.tracker.confirmation_timeout_ms = DEMO_CONFIRMATION_TIMEOUT_MS;
        config.tracker.poll_interval_ms = DEMO_POLL_INTERVAL_MS;
        let (tx, updates) = mpsc::unbounded_channel();
        Self {
            services: Services::simulated(&config, tx),
            updates,
            state: ConsoleState::new(),
            transcript: Vec::new(),
        }
    }

    fn drain_updates(&mut self, phases: &mut Vec<&'static str>) {
        while let Ok(update) = self.updates.try_recv() {
            phases.push(update.phase.label());
            reduce(&mut self.state, ConsoleAction::Runtime(phase_action(update)));
        }
    }

    async fn user(&mut self, action: UserAction) -> Vec<&'static str> {
        let mut phases = Vec::new();
        for effect in reduce(&mut self.state, ConsoleAction::User(action)) {
            if let Some(result) = self.services.execute(effect).await {
                self.drain_updates(&mut phases);
                reduce(&mut self.state, ConsoleAction::Runtime(result));
            }
        }
        self.drain_updates(&mut phases);
        phases
    }

    fn record(&mut self, scenario: &'static str, step: impl Into<String>, phases: Vec<&'static str>) {
        let status = self.state.status.clone();
        self.transcript.push(DemoEntry {
            scenario,
            step: step.into(),
            status: status.as_ref().map(|status| status.message.clone()),
            error_kind: status.and_then(|status| status.error_kind).map(|kind| kind.label()),
            phases,
        });
    }

    async fn submit(&mut self, scenario: &'static str, tab: ConsoleTab, form: FormState) {
        self.state.form = form;
        self.user(UserAction::SelectTab(tab)).await;
        let step = describe(&self.state);
        let phases = self.user(UserAction::Submit).await;
        self.record(scenario, step, phases);
    }

    async fn action(&mut self, scenario: &'static str, step: &str, action: UserAction) {
        let phases = self.user(action).await;
        self.record(scenario, step, phases);
    }

    async fn invalid_arguments_probe(&mut self) {
        let before = self.services.chain.network_calls();
        let request = CallRequest::new(OperationId::TaskDetails, Vec::new());
        let result = self.services.gateway().dispatch(request).await;
        let after = self.services.chain.network_calls();
        let (status, error_kind) = match result {
            Ok(CallOutcome::Value(raw)) => (format!("unexpected value {raw:?}"), None),
            Ok(CallOutcome::Pending(_)) => ("unexpected pending write".to_string(), None),
            Err(err) => (
                format!("{err} (network calls: {})", after - before),
                Some(err.kind().label()),
            ),
        };
        self.transcript.push(DemoEntry {
            scenario: "local validation",
            step: "taskDetails with no arguments".to_string(),
            status: Some(status),
            error_kind,
            phases: Vec::new(),
        });
    }
}

fn address(value: u64) -> String {
    Address::from_low_u64(value).to_string()
}

fn form_with_address(value: u64) -> FormState {
    FormState {
        address: address(value),
        ..FormState::default()
    }
}

fn form_with_task(id: &str) -> FormState {
    FormState {
        task_id: id.to_string(),
        ..FormState::default()
    }
}

fn describe(state: &ConsoleState) -> String {
    let values: Vec<&str> = state
        .tab
        .fields()
        .iter()
        .map(|field| state.form.value(*field))
        .filter(|value| !value.is_empty())
        .collect();
    format!(
        "{}({})",
        state.tab.operation().as_str(),
        values.join(", ")
    )
}

pub async fn run_demo(config: &Config) -> Vec<DemoEntry> {
    let mut demo = Demo::new(config);

    demo.submit("reads need no wallet", ConsoleTab::TasksByChild, form_with_address(CHILD))
        .await;
    demo.submit("writes need a wallet", ConsoleTab::ReleaseTask, form_with_task("1"))
        .await;
    demo.action("connect", "connect wallet", UserAction::ConnectWallet)
        .await;

    demo.submit(
        "create task",
        ConsoleTab::CreateTask,
        FormState {
            address: address(CHILD),
            amount: "10".to_string(),
            ..FormState::default()
        },
    )
    .await;
    demo.submit("create task", ConsoleTab::TasksByChild, form_with_address(CHILD))
        .await;
    demo.submit("create task", ConsoleTab::TaskDetails, form_with_task("1"))
        .await;
    demo.submit("create task", ConsoleTab::CheckBalance, form_with_task("1"))
        .await;

    demo.submit("release unknown task", ConsoleTab::ReleaseTask, form_with_task("999"))
        .await;

    demo.submit(
        "relationships",
        ConsoleTab::AddChild,
        FormState {
            address: address(CHILD),
            secret: "demo-secret".to_string(),
            ..FormState::default()
        },
    )
    .await;
    demo.submit("relationships", ConsoleTab::Children, FormState::default())
        .await;

    demo.submit("release task", ConsoleTab::ReleaseTask, form_with_task("1"))
        .await;
    demo.submit("release task", ConsoleTab::CheckBalance, form_with_task("1"))
        .await;

    demo.invalid_arguments_probe().await;

    demo.services.chain.withhold_receipts(true);
    demo.submit(
        "confirmation timeout",
        ConsoleTab::CreateTask,
        FormState {
            address: address(CHILD),
            amount: "0.5".to_string(),
            ..FormState::default()
        },
    )
    .await;
    demo.services.chain.withhold_receipts(false);

    demo.action("disconnect", "disconnect wallet", UserAction::DisconnectWallet)
        .await;
    demo.action("disconnect", "disconnect again", UserAction::DisconnectWallet)
        .await;

    demo.transcript
}

pub fn print_transcript(transcript: &[DemoEntry]) {
    let mut scenario = "";
    for entry in transcript {
        if entry.scenario != scenario {
            scenario = entry.scenario;
            println!("== {scenario}");
        }
        println!("  > {}", entry.step);
        if !entry.phases.is_empty() {
            println!("    phases: {}", entry.phases.join(" -> "));
        }
        match (&entry.status, entry.error_kind) {
            (Some(status), Some(kind)) => println!("    [{kind}] {status}"),
            (Some(status), None) => println!("    {status}"),
            (None, _) => {}
        }
    }
}
