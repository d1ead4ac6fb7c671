use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use callbox::config::Config;
use callbox::context::Key;
use callbox::descriptor::{Interface, MethodSpec, ParamSpec, ReturnKind};
use callbox::handlers::{Handler, HandlerResolver, Interceptor, Phase};
use callbox::invoker::MAX_ATTEMPTS;
use callbox::markers::{Intercept, Retry};
use callbox::{Arg, CallError, ClientBuilder, Data, Invocation, RemoteClient};

type Log = Arc<Mutex<Vec<String>>>;
type InvokeScript = Box<dyn Fn(&mut Invocation<'_>) -> Result<(), CallError> + Send + Sync>;
type AttemptRule = Box<dyn Fn(u32) -> bool + Send + Sync>;

/// Scripted handler that counts every phase it sees
struct Recorder {
    label: &'static str,
    phases: &'static [Phase],
    priority: i32,
    counts: [AtomicUsize; 11],
    log: Log,
    invoke: InvokeScript,
    success: AttemptRule,
    retry: AttemptRule,
    classify: bool,
}

impl Recorder {
    fn new(label: &'static str, log: &Log) -> Self {
        Self {
            label,
            phases: &Phase::ALL,
            priority: 0,
            counts: Default::default(),
            log: log.clone(),
            invoke: Box::new(|_| Ok(())),
            success: Box::new(|_| true),
            retry: Box::new(|_| false),
            classify: false,
        }
    }

    fn only(mut self, phases: &'static [Phase]) -> Self {
        self.phases = phases;
        self
    }

    fn first(mut self) -> Self {
        self.priority = i32::MIN;
        self
    }

    fn invoking<F>(mut self, script: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), CallError> + Send + Sync + 'static,
    {
        self.invoke = Box::new(script);
        self
    }

    fn succeeding_when(mut self, rule: impl Fn(u32) -> bool + Send + Sync + 'static) -> Self {
        self.success = Box::new(rule);
        self
    }

    fn retrying_when(mut self, rule: impl Fn(u32) -> bool + Send + Sync + 'static) -> Self {
        self.retry = Box::new(rule);
        self
    }

    fn classifying(mut self) -> Self {
        self.classify = true;
        self
    }

    fn count(&self, phase: Phase) -> usize {
        self.counts[slot(phase)].load(Ordering::SeqCst)
    }

    fn hit(&self, phase: Phase) {
        self.counts[slot(phase)].fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(format!("{}:{}", self.label, phase));
    }
}

fn slot(phase: Phase) -> usize {
    Phase::ALL.iter().position(|p| *p == phase).unwrap()
}

#[async_trait]
impl Interceptor for Recorder {
    fn name(&self) -> &'static str {
        self.label
    }

    fn phases(&self) -> &'static [Phase] {
        self.phases
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::Before);
        Ok(())
    }

    async fn invoke(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::Invoke);
        (self.invoke)(inv)
    }

    async fn after(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::After);
        Ok(())
    }

    async fn success_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        self.hit(Phase::SuccessCheck);
        Ok((self.success)(inv.attempt()))
    }

    async fn on_success(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::OnSuccess);
        Ok(())
    }

    async fn on_fail(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::OnFail);
        Ok(())
    }

    async fn retry_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        self.hit(Phase::RetryCheck);
        Ok((self.retry)(inv.attempt()))
    }

    async fn on_retry(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.hit(Phase::OnRetry);
        Ok(())
    }

    async fn on_error(&self, _inv: &mut Invocation<'_>, _error: &CallError) -> bool {
        self.hit(Phase::OnError);
        self.classify
    }

    async fn on_finish(&self, _inv: &mut Invocation<'_>) {
        self.hit(Phase::OnFinish);
    }

    async fn on_call_complete(&self, _inv: &mut Invocation<'_>) {
        self.hit(Phase::OnCallComplete);
    }
}

impl Handler for Recorder {
    const NAME: &'static str = "test.recorder";

    fn construct() -> Result<Self, String> {
        Err("recorders are installed, never constructed".into())
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// A client for one method `m`, with `recorder` installed as the singleton
/// behind `Intercept::with::<Recorder>()`
fn client_with(recorder: &Arc<Recorder>, method: MethodSpec) -> RemoteClient {
    let resolver = Arc::new(HandlerResolver::new());
    resolver.install(recorder.clone());
    ClientBuilder::new(Config::default())
        .resolver(resolver)
        .build(Interface::new("Svc").method(method))
        .expect("client should build")
}

fn recorderd(returns: ReturnKind) -> MethodSpec {
    MethodSpec::new("m", returns).marker(Intercept::with::<Recorder>())
}

fn callback(recorder: &Arc<Recorder>) -> Arg {
    Arg::Callback(recorder.clone())
}

fn text(value: &str) -> Option<Data> {
    Some(Data::Text(value.to_string()))
}

#[tokio::test]
async fn test_scenario_a_success_returns_data() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).invoking(|inv| {
        inv.response.data = text("ok");
        Ok(())
    }));
    let client = client_with(&recorder, recorderd(ReturnKind::Text));

    let result = client.invoke("m", vec![]).await.unwrap();

    assert_eq!(result, text("ok"));
    assert_eq!(recorder.count(Phase::OnSuccess), 1);
    assert_eq!(recorder.count(Phase::OnFail), 0);
    assert_eq!(recorder.count(Phase::OnRetry), 0);
    assert_eq!(recorder.count(Phase::OnFinish), 1);
    assert_eq!(recorder.count(Phase::OnCallComplete), 1);
}

#[tokio::test]
async fn test_scenario_b_retries_transient_errors() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).first().invoking(|inv| {
        if inv.attempt() < 3 {
            return Err(CallError::Transport("connection reset".into()));
        }
        inv.response.data = text("third time");
        Ok(())
    }));
    // Recorder declared first so its OnError runs before the retry handler's
    let method = recorderd(ReturnKind::Text).marker(Retry::default());
    let client = client_with(&recorder, method);

    let result = client.invoke("m", vec![]).await.unwrap();

    assert_eq!(result, text("third time"));
    assert_eq!(recorder.count(Phase::Invoke), 3);
    assert_eq!(recorder.count(Phase::OnError), 2);
    assert_eq!(recorder.count(Phase::OnRetry), 2);
    assert_eq!(recorder.count(Phase::OnFinish), 3);
    assert_eq!(recorder.count(Phase::OnSuccess), 1);
    assert_eq!(recorder.count(Phase::OnCallComplete), 1);

    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
}

#[tokio::test]
async fn test_scenario_c_swallows_unclassified_error() {
    let log = new_log();
    let recorder = Arc::new(
        Recorder::new("p", &log)
            .invoking(|_| Err(CallError::Transport("connection refused".into()))),
    );
    let client = client_with(&recorder, recorderd(ReturnKind::Json));

    let result = client.invoke("m", vec![]).await.unwrap();

    assert!(result.is_none());
    assert_eq!(recorder.count(Phase::Invoke), 1);
    assert_eq!(recorder.count(Phase::OnError), 1);
    assert_eq!(recorder.count(Phase::After), 0);
    assert_eq!(recorder.count(Phase::OnFinish), 1);
}

#[tokio::test]
async fn test_swallowed_error_keeps_partial_data() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).invoking(|inv| {
        inv.response.data = text("partial");
        Err(CallError::Transport("stream cut".into()))
    }));
    let client = client_with(&recorder, recorderd(ReturnKind::Text));

    let result = client.invoke("m", vec![]).await.unwrap();
    assert_eq!(result, text("partial"));
}

#[tokio::test]
async fn test_fatal_causes_are_aggregated() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).invoking(|inv| {
        inv.response.add_fatal_cause(CallError::Decode("bad header".into()));
        inv.response.add_fatal_cause(CallError::Encode("bad body".into()));
        Err(CallError::Transport("aborted".into()))
    }));
    let client = client_with(&recorder, recorderd(ReturnKind::Json));

    let err = client.invoke("m", vec![]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to decode response: bad header; failed to encode request: bad body"
    );
}

#[tokio::test]
async fn test_scenario_d_callback_argument_only() {
    let log = new_log();
    let registered = Arc::new(Recorder::new("registered", &log).only(&[]));
    let hook = Arc::new(Recorder::new("hook", &log).only(&[Phase::Before]));
    let method = recorderd(ReturnKind::Json).param(ParamSpec::callback("hook"));
    let client = client_with(&registered, method);

    client.invoke("m", vec![callback(&hook)]).await.unwrap();

    assert_eq!(hook.count(Phase::Before), 1);
    // Declared phases only: Invoke is never dispatched to this hook
    assert_eq!(hook.count(Phase::Invoke), 0);
    assert_eq!(hook.count(Phase::OnFinish), 0);
}

#[tokio::test]
async fn test_dispatch_order_of_callbacks_and_registered() {
    let log = new_log();
    let registered = Arc::new(Recorder::new("registered", &log).invoking(|inv| {
        inv.response.data = text("ok");
        Ok(())
    }));
    let hook = Arc::new(Recorder::new("hook", &log));
    let method = recorderd(ReturnKind::Text).param(ParamSpec::callback("hook"));
    let client = client_with(&registered, method);

    client.invoke("m", vec![callback(&hook)]).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "hook:before",
            "registered:before",
            "hook:invoke",
            "registered:invoke",
            "hook:after",
            "registered:after",
            "hook:success_check",
            "registered:success_check",
            "registered:on_success",
            "hook:on_success",
            "registered:on_finish",
            "hook:on_finish",
            "registered:on_call_complete",
            "hook:on_call_complete",
        ]
    );
}

#[tokio::test]
async fn test_null_callback_argument_is_skipped() {
    let log = new_log();
    let registered = Arc::new(Recorder::new("registered", &log));
    let method = recorderd(ReturnKind::Json).param(ParamSpec::callback("hook"));
    let client = client_with(&registered, method);

    client.invoke("m", vec![Arg::Null]).await.unwrap();
    assert_eq!(registered.count(Phase::Before), 1);
}

#[tokio::test]
async fn test_unit_return_takes_failure_branch() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).invoking(|inv| {
        inv.response.data = text("ignored");
        Ok(())
    }));
    let client = client_with(&recorder, recorderd(ReturnKind::Unit));

    let result = client.invoke("m", vec![]).await.unwrap();

    assert_eq!(result, text("ignored"));
    assert_eq!(recorder.count(Phase::OnSuccess), 0);
    assert_eq!(recorder.count(Phase::OnFail), 1);
}

#[tokio::test]
async fn test_retry_ceiling_on_eleventh_attempt() {
    let log = new_log();
    let recorder = Arc::new(
        Recorder::new("p", &log)
            .first()
            .invoking(|_| Err(CallError::Timeout(std::time::Duration::from_millis(1)))),
    );
    let method = recorderd(ReturnKind::Json).marker(Retry::default().max_retries(u32::MAX));
    let client = client_with(&recorder, method);

    let err = client.invoke("m", vec![]).await.unwrap_err();

    assert!(matches!(err, CallError::RetryCeiling(10)));
    assert_eq!(recorder.count(Phase::Invoke), MAX_ATTEMPTS as usize);
    assert_eq!(recorder.count(Phase::Before), 10);
    assert_eq!(recorder.count(Phase::OnError), 10);
    assert_eq!(recorder.count(Phase::OnRetry), 10);
    // The ceiling attempt still finishes, but never reaches OnError
    assert_eq!(recorder.count(Phase::OnFinish), 11);
    assert_eq!(recorder.count(Phase::OnCallComplete), 1);
}

#[tokio::test]
async fn test_success_check_short_circuits_on_false() {
    let log = new_log();
    let registered = Arc::new(Recorder::new("registered", &log).invoking(|inv| {
        inv.response.data = text("rejected");
        Ok(())
    }));
    let accept = Arc::new(Recorder::new("accept", &log).only(&[Phase::SuccessCheck]));
    let reject = Arc::new(
        Recorder::new("reject", &log)
            .only(&[Phase::SuccessCheck])
            .succeeding_when(|_| false),
    );
    let unreached = Arc::new(Recorder::new("unreached", &log).only(&[Phase::SuccessCheck]));
    let method = recorderd(ReturnKind::Text)
        .param(ParamSpec::callback("a"))
        .param(ParamSpec::callback("b"))
        .param(ParamSpec::callback("c"));
    let client = client_with(&registered, method);

    let result = client
        .invoke("m", vec![callback(&accept), callback(&reject), callback(&unreached)])
        .await
        .unwrap();

    // A business failure hands back the data without raising
    assert_eq!(result, text("rejected"));
    assert_eq!(accept.count(Phase::SuccessCheck), 1);
    assert_eq!(reject.count(Phase::SuccessCheck), 1);
    assert_eq!(unreached.count(Phase::SuccessCheck), 0);
    assert_eq!(registered.count(Phase::SuccessCheck), 0);
    assert_eq!(registered.count(Phase::OnFail), 1);
}

#[tokio::test]
async fn test_retry_check_short_circuits_on_true() {
    let log = new_log();
    let registered = Arc::new(
        Recorder::new("registered", &log)
            .first()
            .succeeding_when(|_| false)
            .invoking(|inv| {
                inv.response.data = text("not yet");
                Ok(())
            }),
    );
    let eager = Arc::new(
        Recorder::new("eager", &log)
            .only(&[Phase::RetryCheck])
            .retrying_when(|attempt| attempt == 1),
    );
    let later = Arc::new(Recorder::new("later", &log).only(&[Phase::RetryCheck]));
    let method = recorderd(ReturnKind::Text)
        .marker(Retry::default())
        .param(ParamSpec::callback("eager"))
        .param(ParamSpec::callback("later"));
    let client = client_with(&registered, method);

    let result = client
        .invoke("m", vec![callback(&eager), callback(&later)])
        .await
        .unwrap();

    assert_eq!(result, text("not yet"));
    assert_eq!(eager.count(Phase::RetryCheck), 2);
    // Skipped on attempt 1, consulted on attempt 2
    assert_eq!(later.count(Phase::RetryCheck), 1);
    assert_eq!(registered.count(Phase::RetryCheck), 1);
    assert_eq!(registered.count(Phase::OnRetry), 1);
    assert_eq!(registered.count(Phase::OnFinish), 2);
}

#[tokio::test]
async fn test_retry_check_needs_retry_marker() {
    let log = new_log();
    let registered = Arc::new(
        Recorder::new("registered", &log)
            .succeeding_when(|_| false)
            .retrying_when(|_| true),
    );
    let client = client_with(&registered, recorderd(ReturnKind::Json));

    client.invoke("m", vec![]).await.unwrap();

    // Without a retry marker the call is never retryable, so the check is skipped
    assert_eq!(registered.count(Phase::RetryCheck), 0);
    assert_eq!(registered.count(Phase::Invoke), 1);
}

#[tokio::test]
async fn test_on_error_short_circuits_on_true() {
    let log = new_log();
    let registered = Arc::new(
        Recorder::new("registered", &log)
            .first()
            .classifying()
            .invoking(|inv| {
                if inv.attempt() == 1 {
                    return Err(CallError::Decode("garbled".into()));
                }
                inv.response.data = text("recovered");
                Ok(())
            }),
    );
    let hook = Arc::new(Recorder::new("hook", &log).only(&[Phase::OnError]));
    let method = recorderd(ReturnKind::Text)
        .marker(Retry::default())
        .param(ParamSpec::callback("hook"));
    let client = client_with(&registered, method);

    let result = client.invoke("m", vec![callback(&hook)]).await.unwrap();

    assert_eq!(result, text("recovered"));
    assert_eq!(registered.count(Phase::OnError), 1);
    assert_eq!(hook.count(Phase::OnError), 0);
}

const CARRIED: Key<String> = Key::new("test.carried");

/// Writes into the request context on attempt 1 and reads it back later
struct Carrier {
    seen_on_retry: Mutex<Option<String>>,
    left_at_completion: AtomicUsize,
    order: Log,
}

#[async_trait]
impl Interceptor for Carrier {
    fn phases(&self) -> &'static [Phase] {
        &[Phase::Before, Phase::Invoke, Phase::OnCallComplete]
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }

    async fn before(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        if inv.attempt() > 1 {
            *self.seen_on_retry.lock() = inv.request.get(&CARRIED).cloned();
        }
        Ok(())
    }

    async fn invoke(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        if inv.attempt() == 1 {
            inv.request.put(&CARRIED, "from attempt 1".to_string());
            let order = self.order.clone();
            inv.response.defer(move || order.lock().push("deferred".to_string()));
            return Err(CallError::Transport("flaky".into()));
        }
        inv.response.data = Some(Data::Json(serde_json::json!({"ok": true})));
        Ok(())
    }

    async fn on_call_complete(&self, inv: &mut Invocation<'_>) {
        self.left_at_completion
            .store(inv.request.len(), Ordering::SeqCst);
        self.order.lock().push("call_complete".to_string());
    }
}

impl Handler for Carrier {
    const NAME: &'static str = "test.carrier";

    fn construct() -> Result<Self, String> {
        Err("installed by the test".into())
    }
}

#[tokio::test]
async fn test_request_context_survives_retries_and_clears_after() {
    let carrier = Arc::new(Carrier {
        seen_on_retry: Mutex::new(None),
        left_at_completion: AtomicUsize::new(usize::MAX),
        order: new_log(),
    });
    let resolver = Arc::new(HandlerResolver::new());
    resolver.install(carrier.clone());
    let method = MethodSpec::new("m", ReturnKind::Json)
        .marker(Intercept::with::<Carrier>())
        .marker(Retry::default());
    let client = ClientBuilder::new(Config::default())
        .resolver(resolver)
        .build(Interface::new("Svc").method(method))
        .unwrap();

    let ok: serde_json::Value = client.call("m", vec![]).await.unwrap();

    assert_eq!(ok, serde_json::json!({"ok": true}));
    assert_eq!(carrier.seen_on_retry.lock().as_deref(), Some("from attempt 1"));
    assert_eq!(carrier.left_at_completion.load(Ordering::SeqCst), 0);
    // Deferred response callbacks run after OnCallComplete
    assert_eq!(*carrier.order.lock(), vec!["call_complete", "deferred"]);
}

#[tokio::test]
async fn test_concurrent_calls_share_descriptor() {
    let log = new_log();
    let recorder = Arc::new(Recorder::new("p", &log).invoking(|inv| {
        let echoed = inv.arg(0).and_then(Arg::render).unwrap_or_default();
        inv.response.data = Some(Data::Text(echoed));
        Ok(())
    }));
    let method = recorderd(ReturnKind::Text).param(ParamSpec::value("msg"));
    let client = Arc::new(client_with(&recorder, method));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client.invoke("m", vec![format!("msg-{}", i).into()]).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, Some(Data::Text(format!("msg-{}", i))));
    }
    assert_eq!(recorder.count(Phase::OnCallComplete), 16);
}
