//! Agent loop: the model ↔ tool iteration controller.
//!
//! One run is a sequence of iterations over an explicit state machine:
//!
//! ```text
//! Building → AwaitingModel → Parsing → Dispatching → Building ...
//!     └──────────────┴───────────┴───────────┴──→ Terminal
//! ```
//!
//! Exactly one model call or tool call is outstanding at any time. Every
//! model attempt appends one `IterationRecord`, so the history doubles as
//! the iteration count.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use mcpilot_core::config::AgentConfig;
use mcpilot_core::{Attempt, Error, Instruction, Result, ToolFault, ToolOutcome};
use mcpilot_models::{CompletionConfig, LanguageModel};
use mcpilot_providers::ProviderSessionPool;

use crate::context::PromptBuilder;
use crate::parser;
use crate::state::{RunOutcome, RunReport, RunState};
use crate::tools::{coerce_args, ToolRegistry};

// ─────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────

/// Knobs for one agent loop.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    /// Maximum model calls per run.
    pub max_iterations: usize,
    /// Protocol failures tolerated per run; one more ends it.
    pub retry_limit: u32,
    /// Bound on each model call.
    pub model_timeout: Duration,
    pub completion: CompletionConfig,
    /// Replaces the default system prompt preamble.
    pub instructions: Option<String>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            max_iterations: agent.max_iterations,
            retry_limit: agent.retry_limit,
            model_timeout: agent.model_timeout(),
            completion: CompletionConfig::from(agent),
            instructions: agent.instructions.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────

/// Where the controller is within the current iteration.
enum Phase {
    Building,
    AwaitingModel { prompt: String },
    Parsing { raw: String },
    Dispatching { instruction: Instruction },
    Terminal,
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Drives runs against one model and one provider pool.
pub struct AgentLoop {
    model: Arc<dyn LanguageModel>,
    pool: Arc<ProviderSessionPool>,
    registry: ToolRegistry,
    prompts: PromptBuilder,
    settings: LoopSettings,
}

impl AgentLoop {
    /// Build the registry from the pool's ready providers and render the
    /// system prompt. A tool name declared by two providers is
    /// `DuplicateTool`, before any model call.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        pool: Arc<ProviderSessionPool>,
        settings: LoopSettings,
    ) -> Result<Self> {
        let registry = ToolRegistry::from_pool(&pool)?;
        let prompts = PromptBuilder::new(&registry, settings.instructions.as_deref());

        info!(
            model = model.model(),
            tools = registry.len(),
            max_iterations = settings.max_iterations,
            retry_limit = settings.retry_limit,
            "agent loop initialized"
        );

        Ok(Self {
            model,
            pool,
            registry,
            prompts,
            settings,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn system_prompt(&self) -> &str {
        self.prompts.system_prompt()
    }

    /// Model identifier sent to the backend.
    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run one query to a terminal state.
    ///
    /// Never fails as a whole: every ending, including errors, is a
    /// [`RunOutcome`] in the report.
    pub async fn run(&self, query: &str) -> RunReport {
        let mut state = RunState::new();
        let mut phase = Phase::Building;

        info!(query = %query, "run started");

        loop {
            phase = match phase {
                Phase::Building => self.build(&mut state, query),
                Phase::AwaitingModel { prompt } => self.await_model(&mut state, &prompt).await,
                Phase::Parsing { raw } => self.parse(&mut state, raw),
                Phase::Dispatching { instruction } => self.dispatch(&mut state, instruction).await,
                Phase::Terminal => break,
            };
        }

        let report = state.into_report();
        info!(
            iterations = report.iterations,
            retries = report.retries,
            success = report.outcome.is_success(),
            "run finished"
        );
        report
    }

    // ────────────── Transitions ──────────────

    fn build(&self, state: &mut RunState, query: &str) -> Phase {
        if state.iteration_count() >= self.settings.max_iterations {
            warn!(iterations = state.iteration_count(), "iteration budget exhausted");
            state.finish(RunOutcome::BudgetExhausted {
                iterations: state.iteration_count(),
            });
            return Phase::Terminal;
        }

        let prompt = self.prompts.build(query, state.history());
        debug!(iteration = state.iteration_count(), chars = prompt.len(), "prompt built");
        Phase::AwaitingModel { prompt }
    }

    async fn await_model(&self, state: &mut RunState, prompt: &str) -> Phase {
        let limit = self.settings.model_timeout;
        debug!(iteration = state.iteration_count(), timeout_secs = limit.as_secs_f64(), "calling model");

        let call = self.model.complete(prompt, &self.settings.completion);
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(raw)) => {
                debug!(iteration = state.iteration_count(), response = %raw.trim(), "model replied");
                Phase::Parsing { raw }
            }
            Ok(Err(e)) => {
                let attempt = Attempt::ModelFailed {
                    message: e.to_string(),
                };
                self.protocol_failure(state, attempt, e)
            }
            Err(_) => {
                let attempt = Attempt::TimedOut {
                    timeout_secs: limit.as_secs_f64(),
                };
                self.protocol_failure(state, attempt, Error::ModelTimeout { timeout: limit })
            }
        }
    }

    fn parse(&self, state: &mut RunState, raw: String) -> Phase {
        match parser::parse(&raw) {
            Ok(instruction) => Phase::Dispatching { instruction },
            Err(e) => {
                let reason = match &e {
                    Error::MalformedResponse { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.protocol_failure(state, Attempt::Malformed { raw, reason }, e)
            }
        }
    }

    async fn dispatch(&self, state: &mut RunState, instruction: Instruction) -> Phase {
        match instruction {
            Instruction::FinalAnswer { ref value } => {
                let value = value.clone();
                state.record(Attempt::Parsed(instruction), None, None);
                info!(iteration = state.iteration_count(), "final answer");
                state.finish(RunOutcome::Success { value });
                Phase::Terminal
            }
            Instruction::Error { ref message } => {
                let error = Error::ModelReported(message.clone());
                state.record(Attempt::Parsed(instruction), None, None);
                warn!(error = %error, "model gave up");
                state.finish(RunOutcome::Failed {
                    error,
                    retries: state.retry_count(),
                });
                Phase::Terminal
            }
            Instruction::Uncertain { ref message } => {
                debug!(message = %message, "model uncertain, continuing");
                state.record(Attempt::Parsed(instruction), None, None);
                Phase::Building
            }
            Instruction::FunctionCall { ref name, ref args } => {
                let (outcome, provider, fatal) = self.call_tool(state.iteration_count(), name, args).await;
                state.record(Attempt::Parsed(instruction), Some(outcome), provider);
                match fatal {
                    Some(error) => {
                        state.finish(RunOutcome::Failed {
                            error,
                            retries: state.retry_count(),
                        });
                        Phase::Terminal
                    }
                    None => Phase::Building,
                }
            }
        }
    }

    /// Resolve, coerce, invoke. Tool-side faults become the outcome; any
    /// other failure is also returned as fatal.
    async fn call_tool(
        &self,
        iteration: usize,
        name: &str,
        args: &[String],
    ) -> (ToolOutcome, Option<String>, Option<Error>) {
        let tool = match self.registry.resolve(name) {
            Ok(t) => t,
            Err(e) => {
                warn!(tool = name, "unknown tool requested");
                return (failed(&e), None, None);
            }
        };
        let provider = Some(tool.provider_id.clone());

        let arguments = match coerce_args(tool, args) {
            Ok(a) => a,
            Err(e) => {
                warn!(tool = name, error = %e, "argument coercion failed");
                return (failed(&e), provider, None);
            }
        };

        info!(
            tool = name,
            provider = %tool.provider_id,
            iteration = iteration,
            "executing tool call"
        );

        match self.pool.invoke(&tool.provider_id, name, arguments).await {
            Ok(output) => {
                debug!(tool = name, result_len = output.len(), "tool result");
                (ToolOutcome::Output(output), provider, None)
            }
            Err(e) if e.is_tool_side() => {
                warn!(tool = name, error = %e, "tool execution failed");
                (failed(&e), provider, None)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "provider unavailable, ending run");
                (failed(&e), provider, Some(e))
            }
        }
    }

    /// Record a protocol-side failure and retry, unless the limit is spent.
    fn protocol_failure(&self, state: &mut RunState, attempt: Attempt, error: Error) -> Phase {
        state.record(attempt, None, None);
        let retries = state.bump_retry();

        if retries > self.settings.retry_limit {
            warn!(retries = retries, error = %error, "retry limit exceeded");
            state.finish(RunOutcome::Failed { error, retries });
            return Phase::Terminal;
        }

        warn!(
            retries = retries,
            retry_limit = self.settings.retry_limit,
            error = %error,
            "retrying after protocol failure"
        );
        Phase::Building
    }
}

fn failed(error: &Error) -> ToolOutcome {
    let fault = match error {
        Error::NotFound { .. } => ToolFault::NotFound,
        Error::ParameterType { .. } => ToolFault::ParameterType,
        _ => ToolFault::Execution,
    };
    ToolOutcome::Failed {
        fault,
        message: error.to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpilot_core::ToolDescriptor;
    use mcpilot_providers::ToolTransport;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // ── Scripted model ──

    #[derive(Clone)]
    enum Step {
        Reply(&'static str),
        Fail(&'static str),
        Hang,
    }

    /// A model that plays back steps in order, then repeats `fallback`.
    struct ScriptedModel {
        steps: Mutex<VecDeque<Step>>,
        fallback: Step,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Self::with_fallback(steps, Step::Reply("(script exhausted)"))
        }

        fn always(step: Step) -> Arc<Self> {
            Self::with_fallback(Vec::new(), step)
        }

        fn with_fallback(steps: Vec<Step>, fallback: Step) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                fallback,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompt(&self, i: usize) -> String {
            self.prompts.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str, _config: &CompletionConfig) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            match step {
                Step::Reply(text) => Ok(text.to_string()),
                Step::Fail(message) => Err(Error::Model(message.to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn display_name(&self) -> &str {
            "Scripted"
        }
    }

    // ── In-memory provider ──

    type Calls = Arc<Mutex<Vec<(String, Map<String, Value>)>>>;

    enum Reply {
        /// Sum of all integer arguments.
        Sum,
        Text(&'static str),
        Fail(&'static str),
        Crash,
    }

    struct FakeProvider {
        id: &'static str,
        tools: Vec<(&'static str, Value)>,
        reply: Reply,
        calls: Calls,
    }

    #[async_trait]
    impl ToolTransport for FakeProvider {
        async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
            Ok(self
                .tools
                .iter()
                .map(|(name, schema)| ToolDescriptor::from_schema(self.id, *name, None, schema))
                .collect())
        }

        async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            match &self.reply {
                Reply::Sum => Ok(arguments
                    .values()
                    .filter_map(Value::as_i64)
                    .sum::<i64>()
                    .to_string()),
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail(m) => Err(Error::ToolExecution {
                    provider: self.id.into(),
                    tool: name.into(),
                    message: m.to_string(),
                }),
                Reply::Crash => Err(Error::ProviderClosed(self.id.into())),
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn int_pair() -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        })
    }

    fn email_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"to": {"type": "string"}, "body": {"type": "string"}},
            "required": ["to", "body"]
        })
    }

    async fn attach(
        pool: &mut ProviderSessionPool,
        id: &'static str,
        tools: Vec<(&'static str, Value)>,
        reply: Reply,
    ) -> Calls {
        let calls: Calls = Arc::default();
        let provider = FakeProvider {
            id,
            tools,
            reply,
            calls: calls.clone(),
        };
        pool.attach(id, Box::new(provider), None).await.unwrap();
        calls
    }

    /// `math` (add, subtract) and `mail` (send_email).
    async fn math_and_mail() -> (Arc<ProviderSessionPool>, Calls, Calls) {
        let mut pool = ProviderSessionPool::new();
        let math = attach(
            &mut pool,
            "math",
            vec![("add", int_pair()), ("subtract", int_pair())],
            Reply::Sum,
        )
        .await;
        let mail = attach(&mut pool, "mail", vec![("send_email", email_schema())], Reply::Text("sent")).await;
        (Arc::new(pool), math, mail)
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            max_iterations: 10,
            retry_limit: 2,
            model_timeout: Duration::from_secs(5),
            ..LoopSettings::default()
        }
    }

    fn agent(model: Arc<ScriptedModel>, pool: Arc<ProviderSessionPool>, settings: LoopSettings) -> AgentLoop {
        AgentLoop::new(model, pool, settings).unwrap()
    }

    fn indices(report: &RunReport) -> Vec<usize> {
        report.history.iter().map(|r| r.index).collect()
    }

    // ── Tests ──

    #[tokio::test]
    async fn final_answer_on_first_call() {
        let (pool, math, mail) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("FINAL_ANSWER: 42"));
        let report = agent(model.clone(), pool, settings()).run("What is 6*7?").await;

        assert_eq!(report.final_answer(), Some("42"));
        assert_eq!(report.iterations, 1);
        assert_eq!(report.history.len(), 1);
        assert_eq!(model.calls(), 1);
        assert!(math.lock().unwrap().is_empty());
        assert!(mail.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_output_stops_after_retry_limit_plus_one() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("Sure! The answer is probably 42."));
        let report = agent(model.clone(), pool, settings()).run("q").await;

        match &report.outcome {
            RunOutcome::Failed { error, retries } => {
                assert!(matches!(error, Error::MalformedResponse { .. }));
                assert_eq!(*retries, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(model.calls(), 3);
        assert_eq!(report.history.len(), 3);
        assert!(matches!(report.history[0].attempt, Attempt::Malformed { .. }));
    }

    #[tokio::test]
    async fn malformed_text_is_quoted_in_next_prompt() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![Step::Reply("I think 5"), Step::Reply("FINAL_ANSWER: 5")]);
        let report = agent(model.clone(), pool, settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("5"));
        assert_eq!(report.retries, 1);
        assert!(model.prompt(1).contains("\"I think 5\""));
    }

    #[tokio::test]
    async fn routes_call_to_owning_provider_only() {
        let (pool, math, mail) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: send_email|a@b.com|hi"),
            Step::Reply("FINAL_ANSWER: done"),
        ]);
        let report = agent(model.clone(), pool, settings()).run("mail a@b.com").await;

        assert_eq!(report.final_answer(), Some("done"));
        assert!(math.lock().unwrap().is_empty());

        let mail_calls = mail.lock().unwrap();
        assert_eq!(mail_calls.len(), 1);
        assert_eq!(mail_calls[0].0, "send_email");
        assert_eq!(Value::Object(mail_calls[0].1.clone()), json!({"to": "a@b.com", "body": "hi"}));

        assert_eq!(report.history[0].provider_id.as_deref(), Some("mail"));
        assert_eq!(report.history[0].tool_result, Some(ToolOutcome::Output("sent".into())));
        assert!(model.prompt(1).contains("send_email(a@b.com, hi) and it returned sent"));
    }

    #[tokio::test]
    async fn tool_result_feeds_next_iteration() {
        let (pool, math, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: add|2|3"),
            Step::Reply("FUNCTION_CALL: subtract|5|1"),
            Step::Reply("FINAL_ANSWER: 6"),
        ]);
        let report = agent(model.clone(), pool, settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("6"));
        assert_eq!(math.lock().unwrap().len(), 2);
        assert!(model.prompt(1).contains("add(2, 3) and it returned 5"));
        assert!(model.prompt(2).contains("add(2, 3) and it returned 5"));
        assert!(model.prompt(2).ends_with("What should I do next?"));
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: multiply|2|3"),
            Step::Reply("FINAL_ANSWER: 6"),
        ]);
        let report = agent(model.clone(), pool, settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("6"));
        assert_eq!(report.retries, 0);
        match &report.history[0].tool_result {
            Some(ToolOutcome::Failed { fault, .. }) => assert_eq!(*fault, ToolFault::NotFound),
            other => panic!("unexpected tool result: {other:?}"),
        }
        assert!(model.prompt(1).contains("tool 'multiply' not found"));
    }

    #[tokio::test]
    async fn bad_argument_is_fed_back() {
        let (pool, math, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: add|two|3"),
            Step::Reply("FINAL_ANSWER: 5"),
        ]);
        let report = agent(model, pool, settings()).run("q").await;

        assert!(report.outcome.is_success());
        assert!(math.lock().unwrap().is_empty());
        assert_eq!(report.history[0].provider_id.as_deref(), Some("math"));
        assert!(matches!(
            report.history[0].tool_result,
            Some(ToolOutcome::Failed { fault: ToolFault::ParameterType, .. })
        ));
    }

    #[tokio::test]
    async fn history_indices_are_gapless_across_outcomes() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: add|1|2"),
            Step::Reply("FUNCTION_CALL: nope|1"),
            Step::Reply("FUNCTION_CALL: add|x|2"),
            Step::Reply("UNCERTAIN: AMBIGUOUS|which sum?"),
            Step::Reply("not the grammar"),
            Step::Reply("FUNCTION_CALL: subtract|3|1"),
            Step::Reply("FINAL_ANSWER: 3"),
        ]);
        let report = agent(model, pool, settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("3"));
        assert_eq!(indices(&report), (0..7).collect::<Vec<_>>());
        assert_eq!(report.iterations, 7);
    }

    #[tokio::test]
    async fn uncertain_never_terminates() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("UNCERTAIN: AMBIGUOUS|which number?"));
        let mut s = settings();
        s.max_iterations = 4;
        let report = agent(model.clone(), pool, s).run("q").await;

        assert!(matches!(report.outcome, RunOutcome::BudgetExhausted { iterations: 4 }));
        assert_eq!(model.calls(), 4);
        assert_eq!(indices(&report), vec![0, 1, 2, 3]);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test]
    async fn budget_exhausted_with_tool_calls() {
        let (pool, math, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("FUNCTION_CALL: add|1|1"));
        let mut s = settings();
        s.max_iterations = 3;
        let report = agent(model.clone(), pool, s).run("q").await;

        assert!(matches!(report.outcome, RunOutcome::BudgetExhausted { iterations: 3 }));
        assert_eq!(math.lock().unwrap().len(), 3);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn model_timeout_is_retried() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![Step::Hang, Step::Reply("FINAL_ANSWER: 1")]);
        let mut s = settings();
        s.model_timeout = Duration::from_millis(50);
        let report = agent(model.clone(), pool, s).run("q").await;

        assert_eq!(report.final_answer(), Some("1"));
        assert_eq!(report.retries, 1);
        assert!(matches!(report.history[0].attempt, Attempt::TimedOut { .. }));
        assert!(model.prompt(1).contains("no reply arrived"));
    }

    #[tokio::test]
    async fn repeated_timeouts_end_with_timeout_cause() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Hang);
        let mut s = settings();
        s.model_timeout = Duration::from_millis(20);
        s.retry_limit = 1;
        let report = agent(model.clone(), pool, s).run("q").await;

        match &report.outcome {
            RunOutcome::Failed { error, retries } => {
                assert!(matches!(error, Error::ModelTimeout { .. }));
                assert_eq!(*retries, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn model_transport_failure_is_retried() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![Step::Fail("503"), Step::Reply("FINAL_ANSWER: ok")]);
        let report = agent(model, pool, settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("ok"));
        assert!(matches!(report.history[0].attempt, Attempt::ModelFailed { .. }));
    }

    #[tokio::test]
    async fn error_instruction_ends_run() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("ERROR: INVALID_INPUT|negative radius"));
        let report = agent(model.clone(), pool, settings()).run("q").await;

        match &report.outcome {
            RunOutcome::Failed { error, .. } => {
                assert!(matches!(error, Error::ModelReported(m) if m == "INVALID_INPUT|negative radius"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(model.calls(), 1);
        assert_eq!(report.history.len(), 1);
    }

    #[tokio::test]
    async fn tool_execution_error_is_fed_back() {
        let mut pool = ProviderSessionPool::new();
        let calls = attach(&mut pool, "math", vec![("divide", int_pair())], Reply::Fail("division by zero")).await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: divide|1|0"),
            Step::Reply("FINAL_ANSWER: undefined"),
        ]);
        let report = agent(model.clone(), Arc::new(pool), settings()).run("q").await;

        assert_eq!(report.final_answer(), Some("undefined"));
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(matches!(
            report.history[0].tool_result,
            Some(ToolOutcome::Failed { fault: ToolFault::Execution, .. })
        ));
        assert!(model.prompt(1).contains("division by zero"));
    }

    #[tokio::test]
    async fn provider_crash_ends_run() {
        let mut pool = ProviderSessionPool::new();
        attach(&mut pool, "math", vec![("add", int_pair())], Reply::Crash).await;
        let model = ScriptedModel::always(Step::Reply("FUNCTION_CALL: add|1|2"));
        let report = agent(model.clone(), Arc::new(pool), settings()).run("q").await;

        match &report.outcome {
            RunOutcome::Failed { error, .. } => assert!(matches!(error, Error::ProviderLaunch { .. })),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(model.calls(), 1);
        assert_eq!(report.history.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_tool_fails_construction() {
        let mut pool = ProviderSessionPool::new();
        attach(&mut pool, "math", vec![("add", int_pair())], Reply::Sum).await;
        attach(&mut pool, "calc", vec![("add", int_pair())], Reply::Sum).await;
        let model = ScriptedModel::always(Step::Reply("FINAL_ANSWER: 1"));

        let err = AgentLoop::new(model.clone(), Arc::new(pool), settings()).err().unwrap();
        assert!(matches!(err, Error::DuplicateTool { ref tool, .. } if tool == "add"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn system_prompt_lists_all_tools() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::always(Step::Reply("FINAL_ANSWER: 1"));
        let agent = agent(model.clone(), pool, settings());

        assert_eq!(agent.registry().tool_names(), vec!["add", "subtract", "send_email"]);
        assert!(agent.system_prompt().contains("3. send_email(to: string, body: string)"));

        agent.run("q").await;
        assert!(model.prompt(0).starts_with(agent.system_prompt()));
    }

    #[tokio::test]
    async fn runs_are_independent() {
        let (pool, _, _) = math_and_mail().await;
        let model = ScriptedModel::new(vec![
            Step::Reply("FUNCTION_CALL: add|1|1"),
            Step::Reply("FINAL_ANSWER: 2"),
            Step::Reply("FINAL_ANSWER: 3"),
        ]);
        let agent = agent(model.clone(), pool, settings());

        let first = agent.run("one").await;
        let second = agent.run("two").await;
        assert_eq!(first.history.len(), 2);
        assert_eq!(second.history.len(), 1);
        assert!(!model.prompt(2).contains("What should I do next?"));
    }
}
