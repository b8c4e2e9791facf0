//! The turn orchestrator.
//!
//! A turn is two data-dependent steps: classify the conversation into a
//! directive, then render the directive. Every failure on the way is
//! absorbed (see the [crate docs](crate)), so [`Pipeline::run_turn`] is
//! infallible. [`Pipeline::run_summary`] is the one call that surfaces
//! backend errors.
//!
//! A pipeline borrows its backend, classifier, and handler and owns an
//! immutable copy of the configuration, so one instance can serve many
//! concurrent turns:
//!
//! ```ignore
//! let pipeline = Pipeline::new(&client, config);
//! let (a, b) = tokio::join!(
//!     pipeline.run_turn(scene.messages(), target, goal, 3),
//!     pipeline.run_turn(lighting.messages(), target, goal, 1),
//! );
//! ```

use crate::api::{Backend, BackendError, BackendErrorKind, complete_within};
use crate::config::SteerConfig;
use crate::directive::StrategyDirective;
use crate::events::{EventHandler, NoopHandler, PipelineEvent};
use crate::inference::{Classifier, LlmClassifier};
use crate::prompt::PromptSet;
use crate::render::{self, RenderSettings, RenderedUtterance};
use crate::summary::{self, IntentAssessment};
use crate::transcript::ConversationMessage;
use crate::turn::ConversationTurnContext;
use crate::validator::{self, DirectiveSource, FallbackReason, ResolvedDirective};
use tracing::{debug, warn};

/// What one turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub directive: StrategyDirective,
    pub source: DirectiveSource,
    pub utterance: RenderedUtterance,
}

impl TurnOutcome {
    pub fn is_fallback(&self) -> bool {
        self.source.is_fallback()
    }
}

pub struct Pipeline<'a> {
    backend: &'a dyn Backend,
    config: SteerConfig,
    prompts: PromptSet,
    classifier: Option<&'a dyn Classifier>,
    handler: &'a dyn EventHandler,
}

impl<'a> Pipeline<'a> {
    /// A pipeline that classifies and renders with `backend`. Prompts are
    /// resolved from the config's revision and overrides once, here.
    pub fn new(backend: &'a dyn Backend, config: SteerConfig) -> Self {
        let prompts = PromptSet::resolve(
            config.prompt_revision,
            &config.prompt_overrides,
            config.early_turn_threshold,
        );
        Self {
            backend,
            config,
            prompts,
            classifier: None,
            handler: &NoopHandler,
        }
    }

    /// Replace the model classifier, e.g. with a
    /// [`RuleClassifier`](crate::inference::RuleClassifier).
    pub fn with_classifier(mut self, classifier: &'a dyn Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &SteerConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    async fn classify(&self, ctx: &ConversationTurnContext) -> Result<String, BackendError> {
        let timeout = self.config.request_timeout();
        let Some(classifier) = self.classifier else {
            let llm = LlmClassifier::new(
                self.backend,
                self.config.inference.clone(),
                self.prompts.inference_system.as_str(),
                timeout,
            );
            return llm.classify(ctx).await;
        };
        match tokio::time::timeout(timeout, classifier.classify(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::timeout(format!(
                "classifier {} did not answer within {:.1}s",
                classifier.name(),
                timeout.as_secs_f64()
            ))),
        }
    }

    async fn resolve_directive(
        &self,
        transcript: &[ConversationMessage],
        target: &str,
        goal: &str,
        turn_index: u32,
    ) -> ResolvedDirective {
        let ctx = match ConversationTurnContext::build(
            transcript,
            target,
            goal,
            turn_index,
            self.config.window_size,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Turn {turn_index} input rejected: {e}");
                return ResolvedDirective {
                    directive: validator::fallback_directive(target),
                    source: DirectiveSource::Fallback(FallbackReason::Input(e)),
                };
            }
        };

        self.handler.on_event(&PipelineEvent::TurnStarted {
            turn_index,
            window_len: ctx.transcript_window.len(),
            consecutive_rejects: ctx.consecutive_rejects,
        });

        let raw = self.classify(&ctx).await;
        validator::resolve(
            raw,
            &ctx,
            self.config.repair_policy,
            self.config.early_turn_threshold,
        )
    }

    /// Run one turn: infer a directive for the conversation so far and
    /// render the assistant's next utterance.
    pub async fn run_turn(
        &self,
        transcript: &[ConversationMessage],
        target: &str,
        goal: &str,
        turn_index: u32,
    ) -> TurnOutcome {
        let ResolvedDirective { directive, source } = self
            .resolve_directive(transcript, target, goal, turn_index)
            .await;

        match &source {
            DirectiveSource::Fallback(reason) => {
                self.handler
                    .on_event(&PipelineEvent::FallbackDirective { reason });
            }
            DirectiveSource::Inferred { repaired } => {
                if *repaired {
                    self.handler.on_event(&PipelineEvent::DirectiveRepaired);
                }
                self.handler.on_event(&PipelineEvent::DirectiveAccepted {
                    directive: &directive,
                });
            }
        }

        let settings = RenderSettings {
            stage: &self.config.render,
            system_prompt: &self.prompts.render_system,
            mode: self.config.render_mode,
            timeout: self.config.request_timeout(),
        };
        let rendered = render::render(&directive, self.backend, settings).await;
        if let Some(error) = &rendered.backend_error {
            self.handler.on_event(&PipelineEvent::RenderFailed { error });
        }
        if let Some(violation) = &rendered.violation {
            self.handler
                .on_event(&PipelineEvent::RenderViolation { violation });
        }

        let utterance = rendered.utterance;
        self.handler.on_event(&PipelineEvent::TurnFinished {
            directive: &directive,
            utterance: &utterance,
        });

        TurnOutcome {
            directive,
            source,
            utterance,
        }
    }

    /// Compress the transcript into a finalized description of the module
    /// named `label`, honoring the configured open goal.
    pub async fn run_summary(
        &self,
        transcript: &[ConversationMessage],
        label: &str,
    ) -> Result<String, BackendError> {
        let result = self.summarize(transcript, label).await;
        if let Err(error) = &result {
            self.handler.on_event(&PipelineEvent::SummaryFailed { error });
        }
        result
    }

    async fn summarize(
        &self,
        transcript: &[ConversationMessage],
        label: &str,
    ) -> Result<String, BackendError> {
        if transcript.is_empty() {
            return Err(BackendError::new(
                BackendErrorKind::InvalidRequest,
                "transcript is empty, nothing to summarize",
            ));
        }
        let request = summary::summary_request(
            &self.prompts,
            &self.config.summary,
            transcript,
            label,
            &self.config.open_goal,
        );
        let text = complete_within(self.backend, request, self.config.request_timeout()).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::empty("summary model returned no text"));
        }
        Ok(text.to_string())
    }

    /// Judge whether the user wants to adopt the discussed content. Any
    /// failure yields [`IntentAssessment::neutral`].
    pub async fn assess_intent(
        &self,
        transcript: &[ConversationMessage],
        label: &str,
    ) -> IntentAssessment {
        if transcript.is_empty() {
            return IntentAssessment::neutral();
        }
        let request = summary::intent_request(&self.config.summary, transcript, label);
        match complete_within(self.backend, request, self.config.request_timeout()).await {
            Ok(reply) => IntentAssessment::from_reply(&reply).unwrap_or_else(|| {
                debug!("Intent reply was not readable: {} chars", reply.len());
                IntentAssessment::neutral()
            }),
            Err(e) => {
                debug!("Intent check failed: {e}");
                IntentAssessment::neutral()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FnBackend;
    use crate::catalog::State;
    use crate::config::RenderMode;
    use crate::events::FnEventHandler;
    use crate::inference::{ClassifyFuture, RuleClassifier};
    use crate::turn::InputError;
    use std::sync::Mutex;
    use std::time::Duration;

    const TARGET: &str = "Medieval Castle";
    const GOAL: &str = "Describe a scene";

    fn transcript(text: &str) -> Vec<ConversationMessage> {
        vec![ConversationMessage::user(text)]
    }

    #[tokio::test]
    async fn input_error_absorbs_into_fallback() {
        let backend = FnBackend::fixed("unused");
        let pipeline = Pipeline::new(&backend, SteerConfig::default());
        let out = pipeline.run_turn(&[], TARGET, GOAL, 0).await;
        assert_eq!(
            out.source,
            DirectiveSource::Fallback(FallbackReason::Input(InputError::NoUserMessage))
        );
        assert!(!out.utterance.text.is_empty());
    }

    #[tokio::test]
    async fn events_follow_turn_order() {
        let seen = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            let tag = match event {
                PipelineEvent::TurnStarted { .. } => "started",
                PipelineEvent::DirectiveAccepted { .. } => "accepted",
                PipelineEvent::TurnFinished { .. } => "finished",
                _ => "other",
            };
            seen.lock().unwrap().push(tag);
        });
        let backend = FnBackend::fixed("unused");
        let rules = RuleClassifier::default();
        let config = SteerConfig::default().with_render_mode(RenderMode::TemplateOnly);
        let pipeline = Pipeline::new(&backend, config)
            .with_classifier(&rules)
            .with_event_handler(&handler);

        let out = pipeline
            .run_turn(&transcript("Hi, I like quiet places"), TARGET, GOAL, 1)
            .await;
        assert_eq!(out.directive.state, State::S10);
        assert_eq!(*seen.lock().unwrap(), vec!["started", "accepted", "finished"]);
    }

    struct SlowClassifier(Duration);

    impl Classifier for SlowClassifier {
        fn classify<'a>(&'a self, _ctx: &'a ConversationTurnContext) -> ClassifyFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                Ok::<_, BackendError>(String::new())
            })
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn assert_timed_out(out: &TurnOutcome) {
        match &out.source {
            DirectiveSource::Fallback(FallbackReason::Backend(e)) => {
                assert_eq!(e.kind, BackendErrorKind::Timeout, "{e}")
            }
            other => panic!("expected a timeout fallback, got {other:?}"),
        }
        assert_eq!(out.directive, validator::fallback_directive(TARGET));
        assert!(!out.utterance.text.trim().is_empty());
    }

    #[tokio::test]
    async fn slow_inference_backend_times_out_into_fallback() {
        let backend = FnBackend::new(|req| async move {
            if req.stop.is_some() {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, BackendError>("What feels right to you?".to_string())
        });
        let config = SteerConfig::default().with_request_timeout_secs(1);
        let pipeline = Pipeline::new(&backend, config);

        let out = pipeline
            .run_turn(&transcript("Something calm"), TARGET, GOAL, 5)
            .await;
        assert_timed_out(&out);
        assert_eq!(out.utterance.origin, crate::render::UtteranceOrigin::Model);
    }

    #[tokio::test]
    async fn slow_classifier_times_out_into_fallback() {
        let backend = FnBackend::fixed("unused");
        let slow = SlowClassifier(Duration::from_secs(5));
        let config = SteerConfig::default()
            .with_request_timeout_secs(1)
            .with_render_mode(RenderMode::TemplateOnly);
        let pipeline = Pipeline::new(&backend, config).with_classifier(&slow);

        let started = std::time::Instant::now();
        let out = pipeline
            .run_turn(&transcript("Something calm"), TARGET, GOAL, 5)
            .await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_timed_out(&out);
    }

    #[tokio::test]
    async fn two_letter_target_is_steered_toward() {
        let backend = FnBackend::fixed("unused");
        let rules = RuleClassifier::default();
        let config = SteerConfig::default().with_render_mode(RenderMode::TemplateOnly);
        let pipeline = Pipeline::new(&backend, config).with_classifier(&rules);

        let out = pipeline
            .run_turn(&transcript("Which is better, forest or city?"), "Oz", GOAL, 5)
            .await;
        assert_eq!(out.source, DirectiveSource::Inferred { repaired: false });
        assert_eq!(out.directive.target, "Oz");
        assert!(!crate::directive::mentions(&out.utterance.text, "Oz"), "{}", out.utterance.text);
    }

    #[test]
    fn prompt_describes_the_configured_early_turns() {
        let backend = FnBackend::fixed("unused");
        let config = SteerConfig::default().with_early_turn_threshold(5);
        let pipeline = Pipeline::new(&backend, config);
        assert!(pipeline.prompts().inference_system.contains("turn number below 5"));
    }

    #[tokio::test]
    async fn summary_of_empty_transcript_is_an_error() {
        let backend = FnBackend::fixed("summary");
        let pipeline = Pipeline::new(&backend, SteerConfig::default());
        let err = pipeline.run_summary(&[], "Scene").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn summary_is_trimmed_model_text() {
        let backend = FnBackend::new(|req| async move {
            assert!(req.system_text().contains("Scene design"));
            Ok::<_, BackendError>("  A stone hall at dusk.  ".to_string())
        });
        let pipeline = Pipeline::new(&backend, SteerConfig::default());
        let text = pipeline
            .run_summary(&transcript("stone hall"), "Scene")
            .await
            .unwrap();
        assert_eq!(text, "A stone hall at dusk.");
    }

    #[tokio::test]
    async fn intent_failure_is_neutral() {
        let backend = FnBackend::failing(BackendError::network("down"));
        let pipeline = Pipeline::new(&backend, SteerConfig::default());
        let a = pipeline.assess_intent(&transcript("use it"), "Scene").await;
        assert_eq!(a, IntentAssessment::neutral());

        let backend = FnBackend::fixed(r#"{"should_use":true,"summary":"ok","confidence":0.8}"#);
        let pipeline = Pipeline::new(&backend, SteerConfig::default());
        let a = pipeline.assess_intent(&transcript("use it"), "Scene").await;
        assert!(a.should_use);
    }
}
