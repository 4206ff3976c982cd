use httpmock::prelude::*;
use serde_json::{json, Value};
use skill_canon::core::merge_validator::MergeResultValidator;
use skill_canon::domain::model::{JobResult, MergeJob, Outcome, SkillRef};
use skill_canon::domain::ports::{InteractionStore, PromptConfig};
use skill_canon::{
    BatchJobRunner, BatchSummary, CancellationFlag, GeminiClient, JsonlInteractionStore, MergeStep,
};
use std::time::Duration;
use tempfile::TempDir;

const CLUSTERS: [&str; 5] = [
    "Cluster Alpha",
    "Cluster Bravo",
    "Cluster Charlie",
    "Cluster Delta",
    "Cluster Echo",
];

fn merge_prompt() -> PromptConfig {
    PromptConfig {
        system_prompt: "Merge duplicate skills".to_string(),
        model: "gemini-2.5-flash".to_string(),
        max_tokens: 4096,
        temperature: 0.1,
        thinking_mode: false,
    }
}

fn jobs() -> Vec<MergeJob> {
    CLUSTERS
        .iter()
        .enumerate()
        .map(|(i, cluster)| {
            let n = i + 1;
            MergeJob {
                domain_id: 1,
                cluster_id: n as u32,
                domain: "Technology & IT".to_string(),
                cluster: cluster.to_string(),
                skills: vec![
                    SkillRef {
                        skill_id: format!("{}01", n),
                        skill_name: "Python".to_string(),
                    },
                    SkillRef {
                        skill_id: format!("{}02", n),
                        skill_name: "python3".to_string(),
                    },
                ],
            }
        })
        .collect()
}

fn candidates(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn merge_csv_for(n: usize) -> String {
    format!(
        "skill_id,outcome_id,merge_with_skill_id,reason\n\
         {n}01,1,,Canonical form\n\
         {n}02,2,{n}01,Same skill as Python\n"
    )
}

#[tokio::test]
async fn test_batch_keeps_order_and_survives_transport_failure() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;
    let path = "/models/gemini-2.5-flash:generateContent";

    let alpha = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(path)
                .header("x-goog-api-key", "test-key")
                .body_contains("Cluster Alpha");
            then.status(200).json_body(candidates(&merge_csv_for(1)));
        })
        .await;
    // thinking 模式的回應包在 data 底下
    let bravo = server
        .mock_async(|when, then| {
            when.method(POST).path(path).body_contains("Cluster Bravo");
            then.status(200)
                .json_body(json!({ "data": candidates(&merge_csv_for(2)) }));
        })
        .await;
    let charlie = server
        .mock_async(|when, then| {
            when.method(POST).path(path).body_contains("Cluster Charlie");
            then.status(500)
                .json_body(json!({ "error": { "code": 500, "message": "Internal error" } }));
        })
        .await;
    let delta = server
        .mock_async(|when, then| {
            when.method(POST).path(path).body_contains("Cluster Delta");
            then.status(200)
                .json_body(candidates(&format!("```csv\n{}```", merge_csv_for(4))));
        })
        .await;
    let echo = server
        .mock_async(|when, then| {
            when.method(POST).path(path).body_contains("Cluster Echo");
            then.status(200).json_body(candidates(
                "skill_id,outcome_id,merge_with_skill_id,reason\n501,1,,Canonical form\n",
            ));
        })
        .await;

    let client = GeminiClient::new(server.base_url(), "test-key")?;
    let store = JsonlInteractionStore::new(temp_dir.path().join("interactions.jsonl"));
    let step = MergeStep::new(client, store, merge_prompt());
    let runner = BatchJobRunner::new(step);

    let jobs = jobs();
    let report = runner.run(&jobs).await;

    for mock in [&alpha, &bravo, &charlie, &delta, &echo] {
        mock.assert_async().await;
    }

    assert_eq!(report.len(), 5);
    assert!(!report.interrupted);
    let clusters: Vec<&str> = report.entries.iter().map(|e| e.cluster.as_str()).collect();
    assert_eq!(clusters, CLUSTERS);

    assert!(report.entries[0].result.is_success());
    assert!(report.entries[1].result.is_success());
    match &report.entries[2].result {
        JobResult::Exception { message, kind } => {
            assert_eq!(kind, "http_status");
            assert!(message.contains("Internal error"));
        }
        other => panic!("expected an exception, got {:?}", other),
    }
    assert!(report.entries[3].result.is_success());
    match &report.entries[4].result {
        JobResult::ValidationFailure { reason } => {
            assert!(reason.contains("Missing skills in output: 502"));
        }
        other => panic!("expected a validation failure, got {:?}", other),
    }

    let (entry, records) = report.successes().next().expect("at least one success");
    assert_eq!(entry.output_filename(), "skills_details_domain_1_cluster_1.csv");
    assert_eq!(records[1].outcome(), Some(Outcome::Merge));
    assert_eq!(records[1].merge_target(), Some("101"));

    // HTTP 500 也會寫入互動紀錄
    let interactions = runner.executor().store().all().await?;
    assert_eq!(interactions.len(), 5);
    assert_eq!(
        interactions.iter().filter(|i| !i.is_successful()).count(),
        1
    );

    let summary = BatchSummary::from_report(&report);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.validation_failed, 1);
    assert_eq!(summary.raised, 1);
    assert_eq!(summary.total_skills, 10);

    Ok(())
}

#[tokio::test]
async fn test_unknown_output_ids_follow_validator_setting() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    let answer = format!("{}999,3,,Not in the input\n", merge_csv_for(1));
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(candidates(&answer));
        })
        .await;

    let job = jobs().remove(0);

    let strict = MergeStep::new(
        GeminiClient::new(server.base_url(), "test-key")?,
        JsonlInteractionStore::new(temp_dir.path().join("strict.jsonl")),
        merge_prompt(),
    );
    let report = BatchJobRunner::new(strict).run(std::slice::from_ref(&job)).await;
    match &report.entries[0].result {
        JobResult::ValidationFailure { reason } => {
            assert!(reason.contains("Unknown skills in output: 999"));
        }
        other => panic!("expected a validation failure, got {:?}", other),
    }

    let lenient = MergeStep::new(
        GeminiClient::new(server.base_url(), "test-key")?,
        JsonlInteractionStore::new(temp_dir.path().join("lenient.jsonl")),
        merge_prompt(),
    )
    .with_validator(MergeResultValidator::new(false));
    let report = BatchJobRunner::new(lenient).run(std::slice::from_ref(&job)).await;
    assert!(report.entries[0].result.is_success());

    Ok(())
}

#[tokio::test]
async fn test_empty_answer_is_validation_failure() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({ "candidates": [] }));
        })
        .await;

    let step = MergeStep::new(
        GeminiClient::new(server.base_url(), "test-key")?,
        JsonlInteractionStore::new(temp_dir.path().join("interactions.jsonl")),
        merge_prompt(),
    );
    let report = BatchJobRunner::new(step).run(&jobs()[..1]).await;

    assert_eq!(
        report.entries[0].result,
        JobResult::ValidationFailure {
            reason: "No CSV content found in response".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_cancellation_during_delay_stops_batch() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(candidates(&merge_csv_for(1)));
        })
        .await;

    let cancellation = CancellationFlag::new();
    let step = MergeStep::new(
        GeminiClient::new(server.base_url(), "test-key")?,
        JsonlInteractionStore::new(temp_dir.path().join("interactions.jsonl")),
        merge_prompt(),
    );
    let runner = BatchJobRunner::new(step)
        .with_inter_job_delay(Duration::from_secs(60))
        .with_cancellation(cancellation.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancellation.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), runner.run(&jobs())).await?;
    canceller.await?;

    assert!(report.interrupted);
    assert_eq!(report.len(), 1);
    assert!(report.entries[0].result.is_success());
    mock.assert_hits_async(1).await;
    Ok(())
}
