use crate::core::state::{Character, ImageSlot, Scene};
use crate::services::llm::{ApiError, LlmClient};
use crate::services::pacing::PacedQueue;
use crate::services::prompt::{build_scene_request, ImageRequest};
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    QuotaExhausted,
    RateLimited,
    InvalidCredential,
    Transient,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ApiError>() {
            Some(ApiError::QuotaExhausted(_)) => FailureKind::QuotaExhausted,
            Some(ApiError::RateLimited(_)) => FailureKind::RateLimited,
            Some(ApiError::InvalidCredential(_)) => FailureKind::InvalidCredential,
            _ => FailureKind::Transient,
        }
    }

    /// Fatal failures stop every remaining request of the run.
    pub fn is_fatal(self) -> bool {
        !matches!(self, FailureKind::Transient)
    }

    pub fn user_message(self, scene_number: usize, slot: usize) -> String {
        match self {
            FailureKind::QuotaExhausted => format!(
                "Daily API quota exhausted while generating image {} for scene {}. Try again tomorrow or switch to another API key in Settings.",
                slot, scene_number
            ),
            FailureKind::RateLimited => format!(
                "Rate limit reached while generating image {} for scene {}. Wait a minute, then regenerate the remaining scenes.",
                slot, scene_number
            ),
            FailureKind::InvalidCredential => {
                "The API key was rejected. Check your Gemini API key in Settings.".to_string()
            }
            FailureKind::Transient => {
                format!("Failed to generate image {} for scene {}.", slot, scene_number)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFailure {
    pub scene_id: String,
    pub scene_number: usize,
    /// 1-based candidate position.
    pub slot: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a run: new slots for every scene that was attempted, in order.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub results: Vec<(String, Vec<ImageSlot>)>,
    pub failures: Vec<SlotFailure>,
    pub fatal: Option<FailureKind>,
}

impl GenerationReport {
    pub fn last_message(&self) -> Option<&str> {
        self.failures.last().map(|f| f.message.as_str())
    }

    pub fn images_generated(&self) -> usize {
        self.results
            .iter()
            .flat_map(|(_, slots)| slots.iter())
            .filter(|s| !s.is_empty())
            .count()
    }
}

/// Serial candidate generation over a shared [`PacedQueue`].
pub struct ImageGenerator<'a> {
    llm: &'a dyn LlmClient,
    queue: &'a mut PacedQueue,
    image_count: usize,
}

impl<'a> ImageGenerator<'a> {
    pub fn new(llm: &'a dyn LlmClient, queue: &'a mut PacedQueue, image_count: usize) -> Self {
        Self {
            llm,
            queue,
            image_count,
        }
    }

    /// Every scene in order. Scenes after a fatal failure are not attempted
    /// and do not appear in the report.
    pub async fn generate_all(
        &mut self,
        characters: &[Character],
        scenes: &[Scene],
        on_scene: &mut dyn FnMut(usize, usize),
    ) -> GenerationReport {
        let mut report = GenerationReport::default();
        let total = scenes.len();

        for (i, scene) in scenes.iter().enumerate() {
            on_scene(i + 1, total);
            let request = build_scene_request(scene, characters, None);
            let slots = self
                .generate_candidates(&request, &scene.id, i + 1, &mut report)
                .await;
            report.results.push((scene.id.clone(), slots));

            if let Some(kind) = report.fatal {
                info!("Stopping generation after scene {}/{} ({:?})", i + 1, total, kind);
                break;
            }
        }
        report
    }

    /// One scene with an optional refinement; a fatal failure only cuts this scene short.
    pub async fn regenerate(
        &mut self,
        characters: &[Character],
        scene: &Scene,
        scene_number: usize,
        refinement: Option<&str>,
    ) -> GenerationReport {
        let mut report = GenerationReport::default();
        let request = build_scene_request(scene, characters, refinement);
        let slots = self
            .generate_candidates(&request, &scene.id, scene_number, &mut report)
            .await;
        report.results.push((scene.id.clone(), slots));
        report
    }

    async fn generate_candidates(
        &mut self,
        request: &ImageRequest,
        scene_id: &str,
        scene_number: usize,
        report: &mut GenerationReport,
    ) -> Vec<ImageSlot> {
        let mut slots = Vec::with_capacity(self.image_count);
        let llm = self.llm;

        for j in 1..=self.image_count {
            let outcome = self.queue.run(|| llm.generate_image(request)).await;
            match outcome {
                Ok(Some(image)) => slots.push(ImageSlot::Image(image)),
                Ok(None) => {
                    warn!("Scene {} image {}: response contained no image", scene_number, j);
                    slots.push(ImageSlot::Empty);
                }
                Err(e) => {
                    error!("Error generating image {} for scene {}: {:#}", j, scene_number, e);
                    slots.push(ImageSlot::Empty);

                    let kind = FailureKind::classify(&e);
                    report.failures.push(SlotFailure {
                        scene_id: scene_id.to_string(),
                        scene_number,
                        slot: j,
                        kind,
                        message: kind.user_message(scene_number, j),
                    });
                    if kind.is_fatal() {
                        report.fatal = Some(kind);
                        break;
                    }
                }
            }
        }
        slots
    }
}
