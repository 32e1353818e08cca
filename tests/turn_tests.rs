//! Turn loop behavior driven through the public `Agent` API.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{counting_tool, slow_tool, HangingGenerator, MockGenerator};
use parley::agent::Agent;
use parley::error::ParleyError;
use parley::tools::ToolRegistry;
use parley::turn::{TurnEvent, TurnEventPayload, TurnOptions, TurnState};
use parley::types::Role;
use parley::util::retry::RetryPolicy;

fn roles(session: &parley::agent::Session) -> Vec<Role> {
    session.messages().all().iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn hello_produces_user_then_assistant() {
    let generator = MockGenerator::new();
    generator.queue_response("Hi! How can I help?");
    let agent = Agent::builder(generator.clone()).build();
    let mut session = agent.new_session();

    let outcome = agent.send(&mut session, "hello").await.unwrap();

    assert_eq!(outcome.text(), "Hi! How can I help?");
    assert_eq!(roles(&session), vec![Role::User, Role::Assistant]);
    assert_eq!(session.messages().all()[0].text(), "hello");
    assert_eq!(generator.requests().len(), 1);
}

#[tokio::test]
async fn turns_without_tools_alternate_user_and_assistant() {
    let generator = MockGenerator::new();
    let agent = Agent::builder(generator).build();
    let mut session = agent.new_session();

    for i in 0..4 {
        agent.send(&mut session, format!("message {i}")).await.unwrap();
    }

    assert_eq!(session.messages().len(), 8);
    for (i, message) in session.messages().all().iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(message.role, expected, "message {i}");
    }
}

#[tokio::test]
async fn single_tool_round_appends_four_messages() {
    let generator = MockGenerator::new();
    generator.queue_tool_call("call_1", "web_search", serde_json::json!({"query": "weather in Seoul"}));
    generator.queue_response("It is sunny in Seoul.");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Agent::builder(generator.clone())
        .with_tool(counting_tool(
            "web_search",
            serde_json::json!([{"title": "Forecast", "content": "sunny"}]),
            Arc::clone(&calls),
        ))
        .build();
    let mut session = agent.new_session();

    let outcome = agent
        .send(&mut session, "What's the weather in Seoul?")
        .await
        .unwrap();

    assert_eq!(
        roles(&session),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.usage.total(), 45);

    let messages = session.messages().all();
    assert_eq!(messages[1].tool_calls()[0].id, "call_1");
    let result = messages[2].tool_result_part().unwrap();
    assert_eq!(result.tool_call_id, "call_1");
    assert!(!result.is_error);

    // The second generation step sees the tool result; the first does not.
    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].role, Role::Tool);
    assert_eq!(requests[0].tools.len(), 1);
}

#[tokio::test]
async fn every_result_answers_a_request_from_its_round() {
    let generator = MockGenerator::new();
    generator.queue_tool_calls(vec![
        ("a", "lookup", serde_json::json!({})),
        ("b", "lookup", serde_json::json!({})),
        ("c", "missing", serde_json::json!({})),
    ]);
    generator.queue_response("done");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Agent::builder(generator)
        .with_tool(counting_tool("lookup", serde_json::json!("ok"), Arc::clone(&calls)))
        .build();
    let mut session = agent.new_session();

    agent.send(&mut session, "go").await.unwrap();

    let messages = session.messages().all();
    assert_eq!(messages.len(), 1 + 1 + 3 + 1);
    let requested: HashSet<&str> = messages[1].tool_calls().iter().map(|c| c.id.as_str()).collect();
    let answered: Vec<&str> = messages[2..5]
        .iter()
        .map(|m| m.tool_result_part().unwrap().tool_call_id.as_str())
        .collect();
    assert_eq!(answered, vec!["a", "b", "c"]);
    assert!(answered.iter().all(|id| requested.contains(id)));
    assert!(messages[4].tool_result_part().unwrap().is_error);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn tool_timeout_becomes_error_result_and_turn_finishes() {
    let generator = MockGenerator::new();
    generator.queue_tool_call("slow_1", "slow", serde_json::json!({}));
    generator.queue_response("The tool took too long, sorry.");
    let tools = ToolRegistry::new()
        .with_tool(slow_tool("slow", Duration::from_secs(60)))
        .with_call_timeout(Duration::from_millis(50));
    let agent = Agent::builder(generator).with_tools(tools).build();
    let mut session = agent.new_session();

    let outcome = agent.send(&mut session, "try it").await.unwrap();

    let result = session.messages().all()[2].tool_result_part().unwrap().clone();
    assert!(result.is_error);
    assert!(result.content["error"].as_str().unwrap().contains("Timeout after 50ms"));
    assert_eq!(outcome.text(), "The tool took too long, sorry.");
    assert_eq!(session.snapshot().next, None);
}

#[tokio::test(start_paused = true)]
async fn tools_in_one_round_run_concurrently() {
    let generator = MockGenerator::new();
    generator.queue_tool_calls(vec![
        ("1", "slow", serde_json::json!({})),
        ("2", "slow", serde_json::json!({})),
        ("3", "slow", serde_json::json!({})),
    ]);
    generator.queue_response("all done");
    let agent = Agent::builder(generator)
        .with_tool(slow_tool("slow", Duration::from_secs(1)))
        .build();
    let mut session = agent.new_session();

    let started = tokio::time::Instant::now();
    agent.send(&mut session, "go").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn endless_tool_requests_hit_round_limit() {
    let generator = MockGenerator::new();
    for i in 0..10 {
        generator.queue_tool_call(&format!("c{i}"), "lookup", serde_json::json!({}));
    }
    let agent = Agent::builder(generator.clone())
        .with_tool(counting_tool("lookup", serde_json::json!("again"), Arc::default()))
        .with_max_rounds(3)
        .build();
    let mut session = agent.new_session();

    let err = agent.send(&mut session, "loop forever").await.unwrap_err();

    assert!(matches!(err, ParleyError::RoundLimitExceeded { max_rounds: 3 }));
    assert_eq!(generator.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_generation_errors_are_retried() {
    let generator = MockGenerator::new();
    generator.queue_error(ParleyError::api(529, "overloaded"));
    generator.queue_response("recovered");
    let agent = Agent::builder(generator.clone())
        .with_options(TurnOptions {
            retry: RetryPolicy::default(),
            ..TurnOptions::default()
        })
        .build();
    let mut session = agent.new_session();

    let outcome = agent.send(&mut session, "hi").await.unwrap();

    assert_eq!(outcome.text(), "recovered");
    assert_eq!(generator.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_generator_times_out_after_every_attempt() {
    let generator = Arc::new(HangingGenerator::default());
    let agent = Agent::builder(generator.clone())
        .with_options(TurnOptions {
            generation_timeout: Some(Duration::from_millis(100)),
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            ..TurnOptions::default()
        })
        .build();
    let mut session = agent.new_session();

    let started = tokio::time::Instant::now();
    let err = agent.send(&mut session, "hello?").await.unwrap_err();

    assert!(
        matches!(&err, ParleyError::Generation(msg) if msg == "hanging: Timeout after 100ms"),
        "unexpected error: {err}"
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(roles(&session), vec![Role::User]);
    assert_eq!(session.snapshot().next, Some(TurnState::AwaitingGeneration));
}

#[tokio::test]
async fn generation_failure_leaves_user_message_in_history() {
    let generator = MockGenerator::new();
    generator.queue_error(ParleyError::Authentication("bad key".into()));
    let agent = Agent::builder(generator).build();
    let mut session = agent.new_session();

    let err = agent.send(&mut session, "hi").await.unwrap_err();

    assert!(matches!(err, ParleyError::Generation(_)));
    assert_eq!(roles(&session), vec![Role::User]);
    assert_eq!(session.snapshot().next, Some(TurnState::AwaitingGeneration));
}

#[tokio::test]
async fn system_prompt_is_sent_but_not_stored() {
    let generator = MockGenerator::new();
    let agent = Agent::builder(generator.clone())
        .with_system_prompt("You are terse.")
        .build();
    let mut session = agent.new_session();

    agent.send(&mut session, "hi").await.unwrap();

    assert_eq!(generator.requests()[0].system.as_deref(), Some("You are terse."));
    assert!(session.messages().all().iter().all(|m| m.role != Role::System));
}

#[tokio::test]
async fn events_carry_turn_and_session_ids_in_sequence() {
    let events: Arc<Mutex<Vec<TurnEvent>>> = Arc::default();
    let sink_events = Arc::clone(&events);
    let generator = MockGenerator::new();
    generator.queue_tool_call("t1", "lookup", serde_json::json!({}));
    generator.queue_response("ok");
    let agent = Agent::builder(generator)
        .with_tool(counting_tool("lookup", serde_json::json!(1), Arc::default()))
        .with_event_sink(Arc::new(move |event| sink_events.lock().unwrap().push(event)))
        .build();
    let mut session = agent.new_session();

    let outcome = agent.send(&mut session, "go").await.unwrap();

    let events = events.lock().unwrap();
    assert!(matches!(events.first().unwrap().payload, TurnEventPayload::Started));
    assert!(matches!(events.last().unwrap().payload, TurnEventPayload::Completed { rounds: 2, .. }));
    assert!(events.iter().all(|e| e.turn_id == outcome.turn_id));
    assert!(events.iter().all(|e| e.session_id == session.id()));
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    let expected: Vec<u64> = (1..=events.len() as u64).collect();
    assert_eq!(seqs, expected);

    let appended = events
        .iter()
        .filter(|e| matches!(e.payload, TurnEventPayload::MessageAppended { .. }))
        .count();
    assert_eq!(appended, session.messages().len());
}

#[tokio::test]
async fn sessions_on_one_agent_run_concurrently_and_stay_isolated() {
    let agent = Arc::new(Agent::builder(MockGenerator::new()).build());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move {
                let mut session = parley::agent::Session::new(format!("s{i}"));
                for turn in 0..3 {
                    agent
                        .send(&mut session, format!("session {i} turn {turn}"))
                        .await
                        .unwrap();
                }
                session
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let session = handle.await.unwrap();
        assert_eq!(session.messages().len(), 6);
        assert!(session.messages().all()[0].text().starts_with(&format!("session {i} ")));
    }
}
