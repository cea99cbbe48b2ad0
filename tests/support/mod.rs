#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use taskflow::block::BlockResult;
use taskflow::llm::ScriptedLlmClient;
use taskflow::model::{TaskRequest, TaskRun, WorkflowRun};
use taskflow::planner::{initialize_task_run, PlannerServices, TaskV2Channel};
use taskflow::services::{
    ArtifactStore, BlockExecutor, BlockInvocation, BrowserProvider, BrowserSession,
    MemoryPersistence, Observation, PageObserver, Persistence, WebhookNotifier, WebhookSender,
    BLANK_PAGE,
};
use taskflow::{BlockKind, DynLlmClient, TaskFlowError};

pub const API_KEY: &str = "whsec_test";

pub struct FakeBrowser {
    url: Mutex<String>,
    closed: AtomicBool,
}

impl FakeBrowser {
    pub fn at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(url.to_string()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn navigate(&self, url: &str) {
        *self.url.lock() = url.to_string();
    }

    pub fn url(&self) -> String {
        self.url.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn current_url(&self) -> taskflow::Result<String> {
        Ok(self.url())
    }

    async fn close(&self) -> taskflow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeBrowserProvider {
    browser: Arc<FakeBrowser>,
}

#[async_trait]
impl BrowserProvider for FakeBrowserProvider {
    async fn open(&self, _workflow_run: &WorkflowRun) -> taskflow::Result<Arc<dyn BrowserSession>> {
        let browser: Arc<dyn BrowserSession> = self.browser.clone();
        Ok(browser)
    }
}

/// Reports the browser's url and a one-byte screenshot.
#[derive(Default)]
pub struct FakeObserver {
    failures_left: AtomicUsize,
    pub observations: AtomicUsize,
}

impl FakeObserver {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            observations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageObserver for FakeObserver {
    async fn observe(
        &self,
        browser: &dyn BrowserSession,
        _url: Option<&str>,
    ) -> taskflow::Result<Observation> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(TaskFlowError::Observation("page crashed".into()));
        }
        self.observations.fetch_add(1, Ordering::SeqCst);
        let url = browser.current_url().await?;
        Ok(Observation {
            element_tree_html: format!("<body data-url=\"{url}\"><button id=\"1\">Go</button></body>"),
            screenshots: vec![vec![0x89]],
            current_url: url,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Invocation {
    pub label: String,
    pub block_type: &'static str,
    pub url: Option<String>,
    pub parameters: HashMap<String, Value>,
    pub workflow_run_id: String,
    pub max_steps: u32,
}

/// Completes every block unless a result is queued for its label.
pub struct FakeExecutor {
    browser: Arc<FakeBrowser>,
    queued: Mutex<HashMap<String, VecDeque<BlockResult>>>,
    errors: Mutex<HashMap<String, VecDeque<TaskFlowError>>>,
    invocations: Mutex<Vec<Invocation>>,
    steps_per_block: u32,
}

impl FakeExecutor {
    pub fn new(browser: Arc<FakeBrowser>) -> Self {
        Self::with_steps(browser, 1)
    }

    pub fn with_steps(browser: Arc<FakeBrowser>, steps_per_block: u32) -> Self {
        Self {
            browser,
            queued: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            steps_per_block,
        }
    }

    pub fn respond(&self, label: &str, result: BlockResult) {
        self.queued
            .lock()
            .entry(label.to_string())
            .or_default()
            .push_back(result);
    }

    /// The next execution of `label` returns `error` instead of a result.
    pub fn fail(&self, label: &str, error: TaskFlowError) {
        self.errors
            .lock()
            .entry(label.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.label).collect()
    }
}

#[async_trait]
impl BlockExecutor for FakeExecutor {
    async fn execute(&self, invocation: BlockInvocation<'_>) -> taskflow::Result<BlockResult> {
        let label = invocation.block.label.clone();
        self.invocations.lock().push(Invocation {
            label: label.clone(),
            block_type: invocation.block.kind.name(),
            url: invocation.url.clone(),
            parameters: invocation.parameters.clone(),
            workflow_run_id: invocation.workflow_run_id.to_string(),
            max_steps: invocation.max_steps,
        });
        if let Some(url) = &invocation.url {
            self.browser.navigate(url);
        }
        let error = self
            .errors
            .lock()
            .get_mut(&label)
            .and_then(VecDeque::pop_front);
        if let Some(error) = error {
            return Err(error);
        }
        let queued = self
            .queued
            .lock()
            .get_mut(&label)
            .and_then(VecDeque::pop_front);
        Ok(queued.unwrap_or_else(|| {
            let output = match &invocation.block.kind {
                BlockKind::Extraction { .. } | BlockKind::Task { .. } => {
                    Some(json!({"extracted_information": {"from": label}}))
                }
                _ => None,
            };
            BlockResult::completed(&label, output, self.steps_per_block)
        }))
    }
}

#[derive(Default)]
pub struct RecordingWebhook {
    pub posts: Mutex<Vec<(String, String, Vec<(String, String)>)>>,
}

#[async_trait]
impl WebhookSender for RecordingWebhook {
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: Vec<(String, String)>,
    ) -> taskflow::Result<()> {
        self.posts.lock().push((url.to_string(), body, headers));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn upload(&self, key: &str, _bytes: Vec<u8>) -> taskflow::Result<()> {
        self.keys.lock().push(key.to_string());
        Ok(())
    }
}

/// Wires fakes together the way a service would.
pub struct Harness {
    pub llm: Arc<ScriptedLlmClient>,
    pub persistence: Arc<MemoryPersistence>,
    pub browser: Arc<FakeBrowser>,
    pub executor: Arc<FakeExecutor>,
    pub observer: Arc<FakeObserver>,
    pub webhook: Arc<RecordingWebhook>,
    pub artifacts: Arc<MemoryArtifacts>,
}

impl Harness {
    pub fn new(browser_url: &str) -> Self {
        let browser = FakeBrowser::at(browser_url);
        Self::with_executor(browser.clone(), FakeExecutor::new(browser))
    }

    pub fn blank() -> Self {
        Self::new(BLANK_PAGE)
    }

    pub fn with_executor(browser: Arc<FakeBrowser>, executor: FakeExecutor) -> Self {
        Self {
            llm: Arc::new(ScriptedLlmClient::new()),
            persistence: Arc::new(MemoryPersistence::new()),
            browser,
            executor: Arc::new(executor),
            observer: Arc::new(FakeObserver::default()),
            webhook: Arc::new(RecordingWebhook::default()),
            artifacts: Arc::new(MemoryArtifacts::default()),
        }
    }

    pub fn with_observer(mut self, observer: FakeObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn services(&self) -> PlannerServices {
        let artifacts: Arc<dyn ArtifactStore> = self.artifacts.clone();
        PlannerServices {
            llm: self.llm.clone(),
            observer: self.observer.clone(),
            executor: self.executor.clone(),
            persistence: self.persistence.clone(),
            browsers: Arc::new(FakeBrowserProvider {
                browser: self.browser.clone(),
            }),
            webhook: Some(WebhookNotifier::new(
                self.webhook.clone(),
                Some(API_KEY.to_string()),
            )),
            artifacts: Some(artifacts),
        }
    }

    pub fn llm(&self) -> DynLlmClient {
        self.llm.clone()
    }

    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.persistence.clone()
    }

    pub async fn seed(&self, prompt: &str, url: &str) -> anyhow::Result<TaskRun> {
        self.seed_request(TaskRequest {
            organization_id: "org_1".into(),
            prompt: prompt.into(),
            url: Some(url.into()),
            webhook_callback_url: Some("https://hooks.example.com/taskflow".into()),
            ..TaskRequest::default()
        })
        .await
    }

    pub async fn seed_request(&self, request: TaskRequest) -> anyhow::Result<TaskRun> {
        let channel = TaskV2Channel::new(self.persistence());
        Ok(initialize_task_run(request, &self.llm(), &self.persistence(), &channel).await?)
    }

    pub async fn workflow_run(&self, id: &str) -> anyhow::Result<WorkflowRun> {
        self.persistence
            .get_workflow_run(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("workflow run {id} missing"))
    }
}

pub fn plan(task_type: &str, plan: &str) -> Value {
    json!({
        "user_goal_achieved": false,
        "observation": "a page",
        "thoughts": "next step",
        "plan": plan,
        "task_type": task_type,
    })
}

pub fn goal_achieved() -> Value {
    json!({
        "user_goal_achieved": true,
        "observation": "done",
        "thoughts": "the goal is met",
        "plan": "",
        "task_type": "",
    })
}

pub fn summary(description: &str, output: Value) -> Value {
    json!({"description": description, "output": output})
}

pub fn not_done() -> Value {
    json!({"page_info": "still working", "thoughts": "not yet", "user_goal_achieved": false})
}
