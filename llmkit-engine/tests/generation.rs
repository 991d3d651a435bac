use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use llmkit_adapters::traits::{
    AdapterError, AdapterMetadata, AdapterResult, InvocationRequest, ModelAdapter, ModelResponse,
    TokenUsage,
};
use llmkit_engine::{
    CostTable, GenerationEngine, GenerationError, GenerationRequest, INVOCATION_FAILED,
    OutputTransform, PostprocessConfig, RefinementConfig, ResponseType, UsageStats,
};
use llmkit_primitives::RequestId;
use llmkit_prompts::units::ANSWER_REFINER;
use llmkit_prompts::{PlaceholderValues, UnitRegistry, UnitSkeleton};

const GREETING: &str = "Hello {name}, today is {day}.";

type Reply = AdapterResult<ModelResponse>;

struct ScriptedAdapter {
    metadata: AdapterMetadata,
    reports_usage: bool,
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<InvocationRequest>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new<I: IntoIterator<Item = Reply>>(replies: I) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "gpt-4o-mini"),
            reports_usage: true,
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn without_usage<I: IntoIterator<Item = Reply>>(replies: I) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "llama3"),
            reports_usage: false,
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<InvocationRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    fn reports_usage(&self, _model: &str) -> bool {
        self.reports_usage
    }

    async fn invoke(&self, request: InvocationRequest) -> AdapterResult<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model().to_owned();
        self.prompts.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AdapterError::response("script exhausted")))
            .map(|mut response| {
                response.model = model;
                response
            })
    }
}

fn reply(content: &str, input: u64, output: u64) -> Reply {
    Ok(ModelResponse::new("", content).with_usage(TokenUsage::new(input, output)))
}

fn values<const N: usize>(pairs: [(&str, &str); N]) -> PlaceholderValues {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

#[tokio::test]
async fn greeting_is_formatted_and_priced() {
    let adapter = ScriptedAdapter::new([reply("Hi Ana!", 10, 5)]);
    let engine = GenerationEngine::new(adapter.clone());

    let result = engine
        .generate(GREETING, &values([("name", "Ana"), ("day", "Monday")]))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.content(), Some("Hi Ana!"));
    assert!(result.error_message.is_none());
    assert_eq!(result.model, "gpt-4o-mini");
    assert_eq!(result.formatted_prompt.as_deref(), Some("Hello Ana, today is Monday."));
    assert_eq!(result.unformatted_prompt.as_deref(), Some(GREETING));
    assert_eq!(result.elapsed_time, std::time::Duration::ZERO);

    let meta = result.meta;
    assert_eq!(meta.input_tokens, 10);
    assert_eq!(meta.output_tokens, 5);
    assert_eq!(meta.total_tokens, 15);
    assert!(close(meta.input_cost, 10.0 * 0.15 / 1e6));
    assert!(close(meta.output_cost, 5.0 * 0.6 / 1e6));
    assert!(close(meta.total_cost, meta.input_cost + meta.output_cost));

    assert_eq!(adapter.calls(), 1);
    assert_eq!(adapter.requests()[0].prompt(), "Hello Ana, today is Monday.");
}

#[tokio::test]
async fn extra_values_are_ignored() {
    let adapter = ScriptedAdapter::new([reply("ok", 1, 1)]);
    let engine = GenerationEngine::new(adapter.clone());

    let result = engine
        .generate(
            GREETING,
            &values([("name", "Ana"), ("day", "Monday"), ("unused", "x")]),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert!(!adapter.requests()[0].prompt().contains('{'));
}

#[tokio::test]
async fn missing_day_never_reaches_the_model() {
    let adapter = ScriptedAdapter::new([reply("unused", 1, 1)]);
    let engine = GenerationEngine::new(adapter.clone());

    let err = engine
        .generate(GREETING, &values([("name", "Ana")]))
        .await
        .expect_err("day is missing");

    match err {
        GenerationError::MissingPlaceholder { names } => {
            assert_eq!(names.iter().map(String::as_str).collect::<Vec<_>>(), ["day"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn failed_invocation_is_reported_as_data() {
    let adapter = ScriptedAdapter::new([Err(AdapterError::transport("connection reset"))]);
    let engine = GenerationEngine::new(adapter.clone());

    let result = engine
        .generate(GREETING, &values([("name", "Ana"), ("day", "Monday")]))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.content.is_none());
    assert_eq!(result.error_message.as_deref(), Some(INVOCATION_FAILED));
    assert_eq!(result.meta, Default::default());
    assert_eq!(result.formatted_prompt.as_deref(), Some("Hello Ana, today is Monday."));
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn missing_usage_is_an_error() {
    let adapter = ScriptedAdapter::new([Ok(ModelResponse::new("", "no usage"))]);
    let engine = GenerationEngine::new(adapter);

    let err = engine
        .generate("ping", &PlaceholderValues::new())
        .await
        .expect_err("usage required");
    assert!(matches!(err, GenerationError::MalformedUsageMetadata { model } if model == "gpt-4o-mini"));
}

#[tokio::test]
async fn unpriced_model_is_rejected_without_a_call() {
    let adapter = ScriptedAdapter::new([reply("unused", 1, 1)]);
    let engine = GenerationEngine::new(adapter.clone()).with_cost_table(CostTable::empty());

    let err = engine
        .generate("ping", &PlaceholderValues::new())
        .await
        .expect_err("no pricing");
    assert!(matches!(err, GenerationError::UnsupportedModel { .. }));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn models_without_usage_are_only_timed() {
    let adapter = ScriptedAdapter::without_usage([Ok(ModelResponse::new("", "local answer"))]);
    let engine = GenerationEngine::new(adapter).with_cost_table(CostTable::empty());

    let result = engine.generate("ping", &PlaceholderValues::new()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.model, "llama3");
    assert_eq!(result.meta.total_tokens, 0);
    assert!(close(result.meta.total_cost, 0.0));
}

#[tokio::test]
async fn retries_are_counted() {
    let mut response = ModelResponse::new("", "eventually").with_usage(TokenUsage::new(2, 2));
    response.attempts = 3;
    let engine = GenerationEngine::new(ScriptedAdapter::new([Ok(response)]));

    let result = engine.generate("ping", &PlaceholderValues::new()).await.unwrap();
    assert_eq!(result.number_of_retries, 2);
}

#[tokio::test]
async fn failed_calls_keep_the_retry_count() {
    let adapter = ScriptedAdapter::new([Err(AdapterError::exhausted(
        3,
        AdapterError::transport("connection reset"),
    ))]);
    let engine = GenerationEngine::new(adapter);

    let result = engine.generate("ping", &PlaceholderValues::new()).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.number_of_retries, 2);

    let outcome = engine.invoke_llm_async("ping").await;
    assert!(!outcome.success());
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn postprocess_extracts_key() {
    let adapter = ScriptedAdapter::new([reply(r#"{"result": "ok"}"#, 4, 6)]);
    let engine = GenerationEngine::new(adapter);

    let result = engine
        .generate_output(
            "Answer in JSON",
            &PlaceholderValues::new(),
            Some(PostprocessConfig::extract_key("result").into()),
            Some("classify"),
        )
        .await
        .unwrap();

    assert_eq!(result.content(), Some("ok"));
    assert_eq!(result.raw_content.as_deref(), Some(r#"{"result": "ok"}"#));
    assert_eq!(result.response_type, ResponseType::Text);
    assert_eq!(result.operation_name.as_deref(), Some("classify"));
    assert!(result.request_id.is_some());
}

#[tokio::test]
async fn postprocess_to_dict_yields_json_content() {
    let adapter = ScriptedAdapter::new([reply("```json\n{'a': True}\n```", 1, 1)]);
    let engine = GenerationEngine::new(adapter);

    let result = engine
        .generate_output(
            "Answer in JSON",
            &PlaceholderValues::new(),
            Some(OutputTransform::Postprocess(PostprocessConfig::to_dict())),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.response_type, ResponseType::Json);
    let parsed: serde_json::Value = serde_json::from_str(result.content().unwrap()).unwrap();
    assert_eq!(parsed, serde_json::json!({"a": true}));
}

#[tokio::test]
async fn postprocess_errors_propagate() {
    let engine = GenerationEngine::new(ScriptedAdapter::new([reply("not json", 1, 1)]));

    let err = engine
        .generate_output(
            "Answer in JSON",
            &PlaceholderValues::new(),
            Some(PostprocessConfig::extract_key("result").into()),
            None,
        )
        .await
        .expect_err("cannot parse");
    assert!(matches!(err, GenerationError::Postprocess { .. }));
}

#[tokio::test]
async fn failed_generation_skips_postprocessing() {
    let engine = GenerationEngine::new(ScriptedAdapter::new([Err(AdapterError::transport("down"))]));

    let result = engine
        .generate_output(
            "Answer in JSON",
            &PlaceholderValues::new(),
            Some(PostprocessConfig::extract_key("result").into()),
            Some("classify"),
        )
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.operation_name.as_deref(), Some("classify"));
}

#[tokio::test]
async fn refiner_returns_the_refined_answer() {
    let adapter = ScriptedAdapter::new([reply("Paris", 20, 1)]);
    let engine = GenerationEngine::new(adapter.clone());

    let refined = engine
        .answer_isolater_refiner(
            "The capital of France is Paris, a city of {many} bridges.",
            &RefinementConfig::new("the city name"),
        )
        .await
        .unwrap();

    assert_eq!(refined.content(), Some("Paris"));
    let prompt = adapter.requests()[0].prompt().to_owned();
    assert!(prompt.contains("The capital of France is Paris, a city of {many} bridges."));
    assert!(prompt.contains("the city name"));
    assert!(prompt.ends_with("without any commentary or formatting."));
}

#[tokio::test]
async fn refine_transform_replaces_content_and_adds_costs() {
    let adapter = ScriptedAdapter::new([reply("It is 42, obviously.", 10, 5), reply("42", 30, 1)]);
    let engine = GenerationEngine::new(adapter.clone());

    let result = engine
        .execute(
            GenerationRequest::new("What is the answer?", PlaceholderValues::new())
                .with_transform(RefinementConfig::new("the number")),
        )
        .await
        .unwrap();

    assert_eq!(adapter.calls(), 2);
    assert_eq!(result.content(), Some("42"));
    assert_eq!(result.raw_content.as_deref(), Some("It is 42, obviously."));
    assert_eq!(result.meta.input_tokens, 40);
    assert_eq!(result.meta.total_tokens, 46);
    assert!(close(result.meta.total_cost, result.meta.input_cost + result.meta.output_cost));
}

#[tokio::test]
async fn failed_refinement_keeps_original_answer() {
    let adapter = ScriptedAdapter::new([
        reply("It is 42.", 10, 5),
        Err(AdapterError::transport("down")),
    ]);
    let engine = GenerationEngine::new(adapter);

    let result = engine
        .execute(
            GenerationRequest::new("What is the answer?", PlaceholderValues::new())
                .with_transform(RefinementConfig::new("the number")),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.content(), Some("It is 42."));
    assert!(result.raw_content.is_none());
}

#[tokio::test]
async fn refinement_that_cannot_be_formatted_keeps_original_answer() {
    let mut units = UnitRegistry::with_builtin_units();
    units.register(UnitSkeleton::new(
        ANSWER_REFINER,
        "Rewrite the answer in a {style} tone.",
    ));
    let adapter = ScriptedAdapter::new([reply("It is 42.", 10, 5), reply("unused", 1, 1)]);
    let engine = GenerationEngine::new(adapter.clone()).with_units(units);

    let result = engine
        .execute(
            GenerationRequest::new("What is the answer?", PlaceholderValues::new())
                .with_transform(RefinementConfig::new("the number")),
        )
        .await
        .unwrap();

    assert_eq!(adapter.calls(), 1);
    assert!(result.success);
    assert_eq!(result.content(), Some("It is 42."));
    assert!(result.raw_content.is_none());
    assert_eq!(result.meta.total_tokens, 15);
}

#[tokio::test]
async fn per_request_model_override() {
    let adapter = ScriptedAdapter::new([reply("hi", 1000, 1000)]);
    let engine = GenerationEngine::new(adapter.clone());
    let id = RequestId::random();

    let result = engine
        .execute(
            GenerationRequest::new("ping", PlaceholderValues::new())
                .with_model("gpt-4o")
                .with_request_id(id),
        )
        .await
        .unwrap();

    assert_eq!(engine.model(), "gpt-4o-mini");
    assert_eq!(result.model, "gpt-4o");
    assert_eq!(result.request_id, Some(id));
    assert_eq!(adapter.requests()[0].model(), "gpt-4o");
    assert!(close(result.meta.input_cost, 1000.0 * 5.0 / 1e6));
}

#[tokio::test]
async fn invoke_llm_async_skips_accounting() {
    let adapter = ScriptedAdapter::new([Ok(ModelResponse::new("", "raw")), Err(AdapterError::transport("down"))]);
    let engine = GenerationEngine::new(adapter);

    let outcome = engine.invoke_llm_async("already formatted {braces}").await;
    assert!(outcome.success());
    assert_eq!(outcome.response.unwrap().content, "raw");

    let outcome = engine.invoke_llm_async("again").await;
    assert!(!outcome.success());
    assert!(outcome.response.is_none());
}

#[tokio::test]
async fn totals_hold_across_many_calls() {
    let replies = (1..=8).map(|n| reply("ok", n * 13, n * 7));
    let engine = GenerationEngine::new(ScriptedAdapter::new(replies)).with_model("o1-mini");
    let mut stats = UsageStats::new();

    for _ in 0..8 {
        let result = engine
            .generate_output("ping", &PlaceholderValues::new(), None, Some("probe"))
            .await
            .unwrap();
        let meta = result.meta;
        assert_eq!(meta.total_tokens, meta.input_tokens + meta.output_tokens);
        assert!(close(meta.total_cost, meta.input_cost + meta.output_cost));
        stats.record(&result);
    }

    let probe = stats.operation("probe").unwrap();
    assert_eq!(probe.calls, 8);
    assert_eq!(probe.input_tokens, 13 * 36);
    assert_eq!(probe.output_tokens, 7 * 36);
}
