//! End-to-end runs of the video pipeline against in-memory collaborators
//!
//! Run with: cargo test -p reelcore --test pipeline_test

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{png, FakeChat, FakeCompositor, FakeImageBackend, FakeSpeech, FakeUploader, RecordingDelivery, Sent};
use pretty_assertions::assert_eq;
use reelcore::cover::CoverGenerator;
use reelcore::diffusion::{generate_sequential_variations, ChainConfig};
use reelcore::llm::ChatModel;
use reelcore::pipeline::{
    PipelineError, UploadOutcome, VideoPipeline, START_MESSAGE, VIDEO_CAPTION, WRONG_DURATION_MESSAGE,
};
use reelcore::prompt::PromptGenerator;
use reelcore::speech::NarrationGenerator;
use tempfile::TempDir;

const CHAT: i64 = 123456789;
const TITLE: &str = "ШОК! Кот в неоне 🤯";

fn narration_text() -> String {
    "Неоновый город медленно просыпается, и кибернетический кот неспешно выходит на мокрую улицу. ".repeat(9)
}

struct Setup {
    dir: TempDir,
    backend: Arc<FakeImageBackend>,
    compositor: Arc<FakeCompositor>,
}

impl Setup {
    fn new(durations: Vec<f64>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let compositor = Arc::new(FakeCompositor::new(dir.path().join("video"), durations));
        Self {
            dir,
            backend: Arc::new(FakeImageBackend::new()),
            compositor,
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn pipeline(&self, iterations: usize, max_attempts: u32, narration: String) -> VideoPipeline {
        let prompt_chat: Arc<dyn ChatModel> = Arc::new(FakeChat("cyberpunk cat in neon metropolis".to_string()));
        let title_chat: Arc<dyn ChatModel> = Arc::new(FakeChat(TITLE.to_string()));
        let narration_chat: Arc<dyn ChatModel> = Arc::new(FakeChat(narration));

        VideoPipeline::builder()
            .prompts(PromptGenerator::GigaChat(prompt_chat))
            .images(self.backend.clone())
            .chain(ChainConfig::new(iterations, self.path("sequential")).step_delay(Duration::ZERO))
            .cover(CoverGenerator::new(Some(title_chat), None, self.path("covers")))
            .narration(NarrationGenerator::new(
                narration_chat,
                Arc::new(FakeSpeech),
                vec!["Nec_24000".to_string()],
                self.path("sound"),
            ))
            .compositor(self.compositor.clone())
            .generated_dir(self.path("generated"))
            .max_attempts(max_attempts)
            .build()
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_scheduled_run_regenerates_until_duration_fits() {
    // First cycle renders 3 s and is rejected, second renders 45 s
    let setup = Setup::new(vec![3.0, 45.0]);
    let pipeline = setup.pipeline(5, 10, narration_text());
    let delivery = RecordingDelivery::default();

    let run = pipeline.run_scheduled_generation(&delivery, CHAT, None).await.unwrap();

    assert_eq!(run.upload, UploadOutcome::Skipped);
    assert_eq!(run.video.title, TITLE);
    assert_eq!(run.video.description, narration_text());
    assert!(run.video.video.exists());

    // Cover, base image, five variations
    assert_eq!(run.video.images.len(), 7);
    assert!(run.video.images[0].starts_with(setup.path("covers")));
    assert!(run.video.images[1].starts_with(setup.path("generated")));

    // The rejected cycle left nothing behind
    assert_eq!(count_files(&setup.path("generated")), 1);
    assert_eq!(count_files(&setup.path("sequential")), 5);
    assert_eq!(count_files(&setup.path("covers")), 1);
    assert_eq!(count_files(&setup.path("sound")), 1);
    assert_eq!(count_files(&setup.path("video")), 1);

    let plans = setup.compositor.plans.lock().unwrap().clone();
    assert_eq!(plans.len(), 2);
    let accepted = &plans[1];
    assert_eq!(accepted.fps(), 24);
    assert_eq!(accepted.frames().len(), 7);
    assert_eq!(accepted.frames()[0].0, run.video.images[0]);
    assert_eq!(accepted.frames()[0].1, 1.0);
    assert!(accepted.frames()[1..].iter().all(|(_, secs)| *secs == 0.5));
    assert_eq!(accepted.total_duration(), 4.0);

    assert_eq!(delivery.messages(), vec![START_MESSAGE.to_string(), WRONG_DURATION_MESSAGE.to_string()]);
    let sent = delivery.sent.lock().unwrap().clone();
    assert!(sent.contains(&Sent::Video(run.video.video.clone(), VIDEO_CAPTION.to_string())));
    assert!(sent.contains(&Sent::MediaGroup(run.video.images.clone())));
}

#[tokio::test]
async fn test_duration_bounds_are_exclusive() {
    let setup = Setup::new(vec![30.0, 60.0]);
    let pipeline = setup.pipeline(1, 2, narration_text());
    let delivery = RecordingDelivery::default();

    let err = pipeline.run_scheduled_generation(&delivery, CHAT, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::AttemptsExhausted(2)));
    assert!(delivery.videos().is_empty());
    assert_eq!(
        delivery.messages().iter().filter(|m| m.as_str() == WRONG_DURATION_MESSAGE).count(),
        2
    );
    assert_eq!(count_files(&setup.path("video")), 0);
    assert_eq!(count_files(&setup.path("sequential")), 0);
}

#[tokio::test]
async fn test_missing_video_is_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut compositor = FakeCompositor::new(dir.path().join("video"), vec![45.0]);
    compositor.skip_write = true;
    let setup = Setup {
        dir,
        backend: Arc::new(FakeImageBackend::new()),
        compositor: Arc::new(compositor),
    };
    let pipeline = setup.pipeline(2, 1, narration_text());
    let delivery = RecordingDelivery::default();

    let err = pipeline.run_scheduled_generation(&delivery, CHAT, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::AttemptsExhausted(1)));
    let messages = delivery.messages();
    assert!(messages[1].starts_with("🚨 Критическая ошибка генерации:\n• Тип: MissingArtifact"));
    assert_eq!(count_files(&setup.path("generated")), 0);
}

#[tokio::test]
async fn test_failed_cycle_removes_partial_files() {
    let setup = Setup::new(vec![45.0]);
    // Empty narration makes the TTS step fail after images and cover exist
    let pipeline = setup.pipeline(3, 1, "   ".to_string());
    let delivery = RecordingDelivery::default();

    let err = pipeline.run_scheduled_generation(&delivery, CHAT, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::AttemptsExhausted(1)));
    assert!(delivery.messages()[1].contains("• Тип: Speech"));
    assert_eq!(count_files(&setup.path("generated")), 0);
    assert_eq!(count_files(&setup.path("sequential")), 0);
    assert_eq!(count_files(&setup.path("covers")), 0);
}

#[tokio::test]
async fn test_video_delivery_failure_does_not_regenerate() {
    let setup = Setup::new(vec![45.0]);
    let pipeline = setup.pipeline(1, 3, narration_text());
    let delivery = RecordingDelivery {
        fail_video: true,
        ..Default::default()
    };

    let run = pipeline.run_scheduled_generation(&delivery, CHAT, None).await.unwrap();

    assert!(run.video.video.exists());
    assert_eq!(setup.compositor.plans.lock().unwrap().len(), 1);
    assert!(delivery.messages().iter().any(|m| m.starts_with("❌ Ошибка отправки видео")));
}

#[tokio::test]
async fn test_upload_after_generation() {
    let setup = Setup::new(vec![45.0]);
    let pipeline = setup.pipeline(1, 1, narration_text());
    let delivery = RecordingDelivery::default();
    let uploader = FakeUploader::Ok("vid42".to_string());

    let run = pipeline.run_scheduled_generation(&delivery, CHAT, Some(&uploader)).await.unwrap();

    assert_eq!(run.upload, UploadOutcome::Uploaded("vid42".to_string()));
    assert_eq!(
        delivery.messages().last().unwrap(),
        "🎥 Видео успешно загружено: https://www.youtube.com/watch?v=vid42"
    );
}

#[tokio::test]
async fn test_upload_without_authorization_keeps_pending_video() {
    let setup = Setup::new(vec![45.0]);
    let pipeline = setup.pipeline(1, 1, narration_text());
    let delivery = RecordingDelivery::default();

    let run = pipeline
        .run_scheduled_generation(&delivery, CHAT, Some(&FakeUploader::Unauthorized))
        .await
        .unwrap();

    let UploadOutcome::NeedsAuth(pending) = run.upload else {
        panic!("expected NeedsAuth, got {:?}", run.upload);
    };
    assert_eq!(pending.video, run.video.video);
    assert_eq!(pending.metadata.title, TITLE);
    assert_eq!(pending.metadata.description, narration_text());
    assert!(delivery.messages().last().unwrap().starts_with("🔑 Требуется авторизация YouTube"));
}

#[tokio::test]
async fn test_upload_failure_is_reported() {
    let setup = Setup::new(vec![45.0]);
    let pipeline = setup.pipeline(1, 1, narration_text());
    let delivery = RecordingDelivery::default();

    let run = pipeline
        .run_scheduled_generation(&delivery, CHAT, Some(&FakeUploader::Fails))
        .await
        .unwrap();

    assert!(matches!(run.upload, UploadOutcome::Failed(_)));
    assert!(delivery.messages().last().unwrap().starts_with("❌ Ошибка при загрузке видео"));
}

// ============================================================================
// Variation chain
// ============================================================================

async fn base_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("base.png");
    tokio::fs::write(&path, png(0)).await.unwrap();
    path
}

#[tokio::test]
async fn test_chain_feeds_each_output_into_the_next_step() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_image(dir.path()).await;
    let backend = FakeImageBackend {
        empty_at: vec![3],
        ..Default::default()
    };
    let config = ChainConfig::new(5, dir.path().join("sequential")).step_delay(Duration::ZERO);

    let produced = generate_sequential_variations(&backend, "owl", &base, &config).await;

    // One empty step: five calls, four images
    assert_eq!(backend.img2img_calls(), 5);
    assert_eq!(produced.len(), 4);

    let inputs = backend.inputs.lock().unwrap().clone();
    let outputs = backend.outputs.lock().unwrap().clone();
    assert_eq!(inputs[0], png(0));
    assert_eq!(inputs[1], outputs[0]);
    assert_eq!(inputs[2], outputs[1]);
    // The empty step does not advance the chain
    assert_eq!(inputs[3], outputs[1]);
    assert_eq!(inputs[4], outputs[2]);

    for (path, expected) in produced.iter().zip(&outputs) {
        assert_eq!(&std::fs::read(path).unwrap(), expected);
    }
}

#[tokio::test]
async fn test_chain_stops_at_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_image(dir.path()).await;
    let backend = FakeImageBackend {
        fail_at: Some(3),
        ..Default::default()
    };
    let config = ChainConfig::new(10, dir.path().join("sequential")).step_delay(Duration::ZERO);

    let produced = generate_sequential_variations(&backend, "owl", &base, &config).await;

    assert_eq!(backend.img2img_calls(), 3);
    assert_eq!(produced.len(), 2);
}

#[tokio::test]
async fn test_chain_never_exceeds_requested_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_image(dir.path()).await;
    let backend = FakeImageBackend::new();
    let config = ChainConfig::new(7, dir.path().join("sequential")).step_delay(Duration::ZERO);

    let produced = generate_sequential_variations(&backend, "owl", &base, &config).await;

    assert_eq!(produced.len(), 7);
    assert_eq!(count_files(&dir.path().join("sequential")), 7);
}

#[tokio::test]
async fn test_chain_with_unreadable_input_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeImageBackend::new();
    let config = ChainConfig::new(3, dir.path().join("sequential")).step_delay(Duration::ZERO);

    let produced = generate_sequential_variations(&backend, "owl", &dir.path().join("none.png"), &config).await;

    assert!(produced.is_empty());
    assert_eq!(backend.img2img_calls(), 0);
}
