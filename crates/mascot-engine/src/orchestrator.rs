use std::time::Duration;

use anyhow::{Context, Result};
use mascot_contracts::events::{EventPayload, EventWriter};
use mascot_contracts::media::EncodedImage;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::map_object;
use crate::matting::{remove_background, MattingOptions};
use crate::providers::{GenerationRequest, ImageGenerator};
use crate::retry::{error_chain_text, format_seconds, ErrorClass, RetryController, RetryNotice};

pub const ANCHOR_SUFFIX: &str = ", solo character, standard pose, standing, full body";

pub const CONSISTENCY_INSTRUCTION: &str =
    " strictly maintain this character's identity, exact colors, face, and body features, ";

pub const STYLE_SUFFIX: &str = ", art style: highly expressive 2D vector mascot, single solo character, centered full body shot, clean smooth black vector outlines, no jagged edges, flat vibrant colors, comic book aesthetic, funny personality, sticker design, isolated on solid white background, high quality, no other characters, no background details";

pub const EDIT_STYLE_SUFFIX: &str = ", strictly maintain character identity and colors, maintain art style: 2D vector mascot, single solo character, clean smooth black vector outlines, flat colors, comic book aesthetic, no background characters, isolated on solid white background";

pub const VARIATION_SUFFIXES: [&str; 2] = [
    ", dynamic action pose, jumping or running, energetic, excited, same character",
    ", very expressive face close up, zoom in, profile picture style, same character",
];

pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Daily API Quota Exceeded. Please try again tomorrow or upgrade plan.";
pub const PARTIAL_QUOTA_MESSAGE: &str = "Quota reached. Some variations could not be generated.";
pub const PARTIAL_FAILURE_MESSAGE: &str = "Some variations could not be generated.";

/// Final prompt text for one generation call.
pub fn compose_prompt(prompt: &str, has_reference: bool) -> String {
    let mut text = String::with_capacity(prompt.len() + STYLE_SUFFIX.len() + 96);
    text.push_str(prompt);
    if has_reference {
        text.push_str(CONSISTENCY_INSTRUCTION);
    }
    text.push_str(STYLE_SUFFIX);
    text
}

/// Short content hash used to name images in events and exports.
pub fn image_digest(image: &EncodedImage) -> String {
    let digest = Sha256::digest(&image.bytes);
    hex::encode(&digest[..6])
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationOutcome {
    /// Post-processed variations in request order; failed slots are absent.
    pub images: Vec<EncodedImage>,
    pub failed: usize,
    pub quota_reached: bool,
}

impl VariationOutcome {
    pub fn notice(&self) -> Option<&'static str> {
        if self.quota_reached {
            Some(PARTIAL_QUOTA_MESSAGE)
        } else if self.failed > 0 {
            Some(PARTIAL_FAILURE_MESSAGE)
        } else {
            None
        }
    }
}

type StatusListener = Box<dyn Fn(&str) + Send + Sync>;

/// Sequences anchor and variation requests against one generator.
///
/// Only one request is ever in flight. Every raw result goes through
/// background removal before it is returned.
pub struct GenerationOrchestrator {
    generator: Box<dyn ImageGenerator>,
    retry: RetryController,
    cooldown: Duration,
    matting: MattingOptions,
    events: EventWriter,
    listener: Option<StatusListener>,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Box<dyn ImageGenerator>,
        retry: RetryController,
        cooldown: Duration,
        events: EventWriter,
    ) -> Self {
        Self {
            generator,
            retry,
            cooldown,
            matting: MattingOptions::default(),
            events,
            listener: None,
        }
    }

    pub fn with_status_listener(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn status(&self, message: &str) {
        info!(status = message, "generation status");
        if let Some(listener) = self.listener.as_ref() {
            listener(message);
        }
        if let Err(err) = self.events.status(message) {
            warn!(error = %err, "status event write failed");
        }
    }

    fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event_type, error = %err, "event write failed");
        }
    }

    fn announce_retry(&self, stage: &str, notice: &RetryNotice) {
        self.record(
            "generation_retry",
            map_object(json!({
                "stage": stage,
                "attempt": notice.attempt,
                "class": notice.class.as_str(),
                "wait_ms": notice.wait.as_millis() as u64,
                "error": notice.error,
            })),
        );
        self.status(&notice.status_message());
    }

    fn generate_with_retry(&self, stage: &str, request: &GenerationRequest) -> Result<EncodedImage> {
        self.retry.run(
            |_| self.generator.generate(request),
            |notice| self.announce_retry(stage, notice),
        )
    }

    fn publish(&self, stage: &str, raw: &EncodedImage) -> EncodedImage {
        let image = remove_background(raw, &self.matting);
        self.record(
            "image_created",
            map_object(json!({
                "stage": stage,
                "image_id": image_digest(&image),
                "mime_type": image.mime_type,
                "bytes": image.bytes.len(),
                "provider": self.generator.name(),
            })),
        );
        image
    }

    /// Produces the anchor image, or fails the whole request.
    ///
    /// A rate-limit failure gains a user-facing quota message as its outermost
    /// context.
    pub fn generate_anchor(
        &self,
        prompt: &str,
        reference: Option<&EncodedImage>,
    ) -> Result<EncodedImage> {
        self.status("Generating character...");
        let anchor_prompt = format!("{prompt}{ANCHOR_SUFFIX}");
        let request = GenerationRequest::new(compose_prompt(&anchor_prompt, reference.is_some()))
            .with_reference(reference.cloned());

        match self.generate_with_retry("anchor", &request) {
            Ok(raw) => Ok(self.publish("anchor", &raw)),
            Err(err) => {
                let class = self.retry.classify(&err);
                self.record(
                    "generation_failed",
                    map_object(json!({
                        "stage": "anchor",
                        "class": class.as_str(),
                        "error": error_chain_text(&err, 400),
                    })),
                );
                if class == ErrorClass::RateLimited {
                    return Err(err.context(QUOTA_EXCEEDED_MESSAGE));
                }
                Err(err).context("character generation failed")
            }
        }
    }

    /// Generates the fixed pose variations of `anchor`, one after another.
    ///
    /// Never fails: a rate-limited variation stops the run, any other failure
    /// skips that variation.
    pub fn generate_variations(&self, prompt: &str, anchor: &EncodedImage) -> VariationOutcome {
        let mut outcome = VariationOutcome::default();
        let total = VARIATION_SUFFIXES.len();

        for (idx, suffix) in VARIATION_SUFFIXES.iter().enumerate() {
            self.status(&format!(
                "Cooling down API ({}s)...",
                format_seconds(self.cooldown)
            ));
            self.retry.sleeper().sleep(self.cooldown);

            self.status(&format!("Generating variation {}/{}...", idx + 1, total));
            let request = GenerationRequest::new(compose_prompt(&format!("{prompt}{suffix}"), true))
                .with_reference(Some(anchor.clone()));
            match self.generate_with_retry("variation", &request) {
                Ok(raw) => outcome.images.push(self.publish("variation", &raw)),
                Err(err) => {
                    outcome.failed += 1;
                    let class = self.retry.classify(&err);
                    warn!(
                        variation = idx + 1,
                        class = class.as_str(),
                        error = %error_chain_text(&err, 400),
                        "variation failed"
                    );
                    if class == ErrorClass::RateLimited {
                        outcome.quota_reached = true;
                        self.status("Quota limit reached. Stopping variations.");
                        break;
                    }
                }
            }
        }

        self.record(
            "variations_finished",
            map_object(json!({
                "produced": outcome.images.len(),
                "failed": outcome.failed,
                "quota_reached": outcome.quota_reached,
                "notice": outcome.notice(),
            })),
        );
        outcome
    }

    /// One unretried edit call on an existing image.
    pub fn edit(&self, image: &EncodedImage, edit_prompt: &str) -> Result<EncodedImage> {
        let request = GenerationRequest::new(format!("{edit_prompt}{EDIT_STYLE_SUFFIX}"))
            .with_reference(Some(image.clone()));
        let raw = self
            .generator
            .generate(&request)
            .context("image edit failed")?;
        Ok(remove_background(&raw, &self.matting))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use mascot_contracts::events::EventWriter;
    use mascot_contracts::media::EncodedImage;

    use super::{
        compose_prompt, GenerationOrchestrator, CONSISTENCY_INSTRUCTION, PARTIAL_QUOTA_MESSAGE,
        QUOTA_EXCEEDED_MESSAGE, STYLE_SUFFIX,
    };
    use crate::retry::{RetryController, RetryPolicy};
    use crate::testing::{sticker_png, RecordingSleeper, ScriptedGenerator, SharedGenerator};

    struct Harness {
        orchestrator: GenerationOrchestrator,
        generator: Arc<ScriptedGenerator>,
        sleeper: Arc<RecordingSleeper>,
        statuses: Arc<Mutex<Vec<String>>>,
    }

    fn harness(script: Vec<Result<EncodedImage, String>>) -> Harness {
        harness_with_cooldown(script, Duration::from_secs(5))
    }

    fn harness_with_cooldown(
        script: Vec<Result<EncodedImage, String>>,
        cooldown: Duration,
    ) -> Harness {
        let generator = Arc::new(ScriptedGenerator::new(script));
        let sleeper = Arc::new(RecordingSleeper::default());
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let orchestrator = GenerationOrchestrator::new(
            Box::new(SharedGenerator(generator.clone())),
            RetryController::new(RetryPolicy::default(), sleeper.clone()),
            cooldown,
            EventWriter::detached("test"),
        )
        .with_status_listener(move |message| sink.lock().unwrap().push(message.to_string()));
        Harness {
            orchestrator,
            generator,
            sleeper,
            statuses,
        }
    }

    fn statuses(harness: &Harness) -> Vec<String> {
        harness.statuses.lock().unwrap().clone()
    }

    #[test]
    fn compose_prompt_adds_consistency_only_with_reference() {
        let plain = compose_prompt("gator", false);
        assert_eq!(plain, format!("gator{STYLE_SUFFIX}"));
        let anchored = compose_prompt("gator", true);
        assert_eq!(anchored, format!("gator{CONSISTENCY_INSTRUCTION}{STYLE_SUFFIX}"));
    }

    #[test]
    fn anchor_is_matted_and_carries_reference() {
        let reference = sticker_png([200, 0, 0]);
        let harness = harness(vec![Ok(sticker_png([0, 0, 200]))]);
        let anchor = harness
            .orchestrator
            .generate_anchor("a lazy gator", Some(&reference))
            .unwrap();

        let raster = image::load_from_memory(&anchor.bytes).unwrap().to_rgba8();
        assert_eq!(raster.get_pixel(0, 0).0[3], 0);
        assert_eq!(raster.get_pixel(6, 6).0[3], 255);

        let requests = harness.generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .prompt
            .starts_with("a lazy gator, solo character, standard pose, standing, full body"));
        assert!(requests[0].prompt.contains(CONSISTENCY_INSTRUCTION));
        assert_eq!(requests[0].reference.as_ref(), Some(&reference));
        assert_eq!(statuses(&harness), vec!["Generating character..."]);
    }

    #[test]
    fn anchor_quota_failure_gets_quota_message() {
        let script = (0..6).map(|_| Err("quota exceeded".to_string())).collect();
        let harness = harness(script);
        let err = harness
            .orchestrator
            .generate_anchor("gator", None)
            .unwrap_err();
        assert_eq!(err.to_string(), QUOTA_EXCEEDED_MESSAGE);
        assert_eq!(harness.generator.call_count(), 6);
        assert_eq!(harness.sleeper.recorded().len(), 5);
    }

    #[test]
    fn anchor_fatal_failure_aborts_after_one_call() {
        let harness = harness(vec![Err("invalid request".to_string())]);
        let err = harness
            .orchestrator
            .generate_anchor("gator", None)
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid request"));
        assert_eq!(harness.generator.call_count(), 1);
    }

    #[test]
    fn quota_on_first_variation_stops_the_run() {
        let mut script = vec![Ok(sticker_png([0, 0, 200]))];
        script.extend((0..6).map(|_| Err("Gemini request failed (400): quota".to_string())));
        script.push(Ok(sticker_png([0, 120, 0])));
        let harness = harness(script);
        let anchor = harness.orchestrator.generate_anchor("gator", None).unwrap();
        let outcome = harness.orchestrator.generate_variations("gator", &anchor);

        assert!(outcome.images.is_empty());
        assert!(outcome.quota_reached);
        assert_eq!(outcome.notice(), Some(PARTIAL_QUOTA_MESSAGE));
        // a quota error is retryable, so the first variation used the full budget
        assert_eq!(harness.generator.call_count(), 1 + 6);
        assert!(statuses(&harness)
            .iter()
            .any(|status| status == "Quota limit reached. Stopping variations."));
        assert!(!statuses(&harness)
            .iter()
            .any(|status| status == "Generating variation 2/2..."));
    }

    #[test]
    fn fatal_variation_is_skipped_and_next_runs() {
        let harness = harness(vec![
            Ok(sticker_png([0, 0, 200])),
            Err("safety block".to_string()),
            Ok(sticker_png([0, 120, 0])),
        ]);
        let anchor = harness.orchestrator.generate_anchor("gator", None).unwrap();
        let outcome = harness.orchestrator.generate_variations("gator", &anchor);

        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.quota_reached);
        assert_eq!(
            outcome.notice(),
            Some("Some variations could not be generated.")
        );
        assert_eq!(
            harness.sleeper.recorded(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
    }

    #[test]
    fn variations_are_anchored_on_the_anchor_image() {
        let reference = sticker_png([200, 0, 0]);
        let harness = harness(vec![
            Ok(sticker_png([0, 0, 200])),
            Ok(sticker_png([0, 120, 0])),
            Ok(sticker_png([120, 0, 120])),
        ]);
        let anchor = harness
            .orchestrator
            .generate_anchor("gator", Some(&reference))
            .unwrap();
        let outcome = harness.orchestrator.generate_variations("gator", &anchor);
        assert_eq!(outcome.images.len(), 2);
        assert_eq!(outcome.notice(), None);

        let requests = harness.generator.requests();
        assert!(requests[1].prompt.starts_with("gator, dynamic action pose"));
        assert!(requests[2].prompt.starts_with("gator, very expressive face close up"));
        for request in &requests[1..] {
            assert_eq!(request.reference.as_ref(), Some(&anchor));
        }
        assert_eq!(
            statuses(&harness)[1..],
            [
                "Cooling down API (5s)...",
                "Generating variation 1/2...",
                "Cooling down API (5s)...",
                "Generating variation 2/2...",
            ]
        );
    }

    #[test]
    fn fractional_cooldown_is_announced_exactly() {
        let harness = harness_with_cooldown(
            vec![
                Ok(sticker_png([0, 120, 0])),
                Ok(sticker_png([120, 0, 120])),
            ],
            Duration::from_millis(1_500),
        );
        let anchor = sticker_png([0, 0, 200]);
        harness.orchestrator.generate_variations("gator", &anchor);
        assert_eq!(statuses(&harness)[0], "Cooling down API (1.5s)...");
        assert_eq!(harness.sleeper.recorded()[0], Duration::from_millis(1_500));
    }

    #[test]
    fn edit_makes_a_single_attempt() {
        let harness = harness(vec![Err("429".to_string())]);
        let source = sticker_png([0, 0, 200]);
        assert!(harness.orchestrator.edit(&source, "add a hat").is_err());
        assert_eq!(harness.generator.call_count(), 1);
        let request = &harness.generator.requests()[0];
        assert!(request.prompt.starts_with("add a hat, strictly maintain character identity"));
        assert_eq!(request.reference.as_ref(), Some(&source));
    }
}
