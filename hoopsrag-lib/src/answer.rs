//! Grounded answering
//!
//! Wraps the generation service with local, deterministic checks:
//!
//! - **Temporal gate**: a question that mentions a season or year after the
//!   corpus' upper bound is refused before any retrieval or generation.
//! - **Policy prompt**: the generator is told to use only the supplied
//!   context, to reply with [`NOT_FOUND_ANSWER`] when the context lacks the
//!   answer, and never to draw on background knowledge.
//! - **Self-check**: an answer sharing no content word or number with the
//!   context is returned but flagged [`Grounding::Unverified`].
//!
//! One query moves through these stages:
//!
//! ```text
//! Received -> TemporalCheck -> Refused
//!                           -> Retrieving -> ContextAssembled -> Generating -> Answered
//!                                                                           -> GenerationFailed
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::context::AssembledContext;
use crate::generate::{GenerationRequest, Generator};
use crate::season::{SeasonBounds, referenced_periods};
use crate::text::content_terms;
use crate::{Error, Result};

/// Fixed reply when the documents do not answer the question.
pub const NOT_FOUND_ANSWER: &str = "The documents do not contain this information.";

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3})\]").expect("valid citation regex"));

/// Fixed reply for questions about periods after the corpus.
#[must_use]
pub fn future_refusal(bounds: &SeasonBounds) -> String {
    format!(
        "I can only answer questions about the {} through {} seasons; that period is outside the documents I have.",
        bounds.lower, bounds.upper
    )
}

/// Where a query is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryStage {
    Received,
    TemporalCheck,
    Refused,
    Retrieving,
    ContextAssembled,
    Generating,
    Answered,
    GenerationFailed,
}

pub(crate) fn transition(stage: QueryStage) {
    debug!(?stage, "query stage");
}

/// Why a query was answered with a fixed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// The question is about a period after the corpus
    FuturePeriod,
    /// The context does not contain the answer
    NotFound,
    /// Nothing has been ingested
    EmptyCorpus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    Refused(RefusalReason),
}

/// Result of the post-generation overlap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// The answer shares content with the context
    Supported,
    /// No overlap with the context; possibly not grounded
    Unverified,
}

/// A finished answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: Outcome,
    pub grounding: Grounding,
    /// Context markers the answer cites, ascending
    pub cited: Vec<usize>,
}

impl Answer {
    #[must_use]
    pub fn refusal(text: impl Into<String>, reason: RefusalReason) -> Self {
        Self {
            text: text.into(),
            outcome: Outcome::Refused(reason),
            grounding: Grounding::Supported,
            cited: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_found(reason: RefusalReason) -> Self {
        Self::refusal(NOT_FOUND_ANSWER, reason)
    }
}

/// Runs the temporal gate and the guarded generation call.
pub struct GroundedAnswerer<G: Generator> {
    generator: G,
    settings: GenerationConfig,
    bounds: SeasonBounds,
    timeout: Duration,
}

impl<G: Generator> GroundedAnswerer<G> {
    #[must_use]
    pub fn new(generator: G, settings: GenerationConfig, bounds: SeasonBounds) -> Self {
        let timeout = settings.timeout();
        Self {
            generator,
            settings,
            bounds,
            timeout,
        }
    }

    /// Override the per-call limit taken from the settings.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn bounds(&self) -> &SeasonBounds {
        &self.bounds
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// The fixed refusal, if `question` is about a period after the corpus.
    #[must_use]
    pub fn temporal_gate(&self, question: &str) -> Option<Answer> {
        transition(QueryStage::TemporalCheck);
        let future = referenced_periods(question)
            .into_iter()
            .find(|p| self.bounds.is_after(*p))?;

        info!(period = ?future, "question refers to a period after the corpus");
        transition(QueryStage::Refused);
        Some(Answer::refusal(
            future_refusal(&self.bounds),
            RefusalReason::FuturePeriod,
        ))
    }

    /// Instructions binding the generator to the context.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        format!(
            "You answer questions about professional basketball using only the numbered context passages you are given. \
             The passages cover the {lower} through {upper} seasons.\n\
             Rules:\n\
             1. Use only facts stated in the context. Never add background knowledge, even when you are sure of it.\n\
             2. If the context does not contain the answer, reply with exactly: {NOT_FOUND_ANSWER}\n\
             3. If the context answers only part of the question, answer that part and say what is missing.\n\
             4. Cite every passage you use by its marker, for example [1].",
            lower = self.bounds.lower,
            upper = self.bounds.upper,
        )
    }

    /// Answer `question` from `context` with the given model.
    ///
    /// # Errors
    /// Generation errors, including [`Error::GenerationTimeout`] when the
    /// call outlives the configured limit. Nothing is retried.
    pub async fn answer(
        &self,
        question: &str,
        context: &AssembledContext,
        model: &str,
    ) -> Result<Answer> {
        if let Some(refusal) = self.temporal_gate(question) {
            return Ok(refusal);
        }
        if context.is_empty() {
            return Ok(Answer::not_found(RefusalReason::NotFound));
        }

        let request = GenerationRequest {
            system: self.system_prompt(),
            context: context.text.clone(),
            question: question.to_string(),
            model: model.to_string(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        transition(QueryStage::Generating);
        let started = Instant::now();
        let generated = match tokio::time::timeout(self.timeout, self.generator.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::GenerationTimeout(self.timeout.as_secs())),
        };
        let text = match generated {
            Ok(text) => text,
            Err(e) => {
                transition(QueryStage::GenerationFailed);
                warn!(generator = self.generator.name(), error = %e, "generation failed");
                return Err(e);
            }
        };
        debug!(
            generator = self.generator.name(),
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated"
        );
        transition(QueryStage::Answered);

        if is_not_found(&text) {
            return Ok(Answer::not_found(RefusalReason::NotFound));
        }

        let grounding = check_grounding(&text, &context.text);
        if grounding == Grounding::Unverified {
            warn!("answer shares no content with the context");
        }

        Ok(Answer {
            cited: cited_markers(&text, context),
            grounding,
            text: text.trim().to_string(),
            outcome: Outcome::Answered,
        })
    }
}

/// True when the reply is the fixed not-found text, ignoring case,
/// punctuation and citation markers.
fn is_not_found(text: &str) -> bool {
    fn words(s: &str) -> String {
        let s = CITATION_RE.replace_all(s, " ");
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
    words(text) == words(NOT_FOUND_ANSWER)
}

/// Markers cited in `text` that exist in the context.
fn cited_markers(text: &str, context: &AssembledContext) -> Vec<usize> {
    CITATION_RE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|m| context.document_for(*m).is_some())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `Supported` when some content word (three or more characters) or number
/// of the answer occurs in the context and every number it states does.
#[must_use]
pub fn check_grounding(answer: &str, context: &str) -> Grounding {
    let without_markers = CITATION_RE.replace_all(answer, " ");
    let context_terms: BTreeSet<String> = content_terms(context).collect();
    let is_number = |t: &str| t.chars().any(|c| c.is_ascii_digit());

    let terms: Vec<String> = content_terms(&without_markers)
        .filter(|t| t.len() >= 3 || is_number(t))
        .collect();
    let overlaps = terms.iter().any(|t| context_terms.contains(t));
    let numbers_known = terms
        .iter()
        .filter(|t| is_number(t))
        .all(|t| context_terms.contains(t));

    if overlaps && numbers_known {
        Grounding::Supported
    } else {
        Grounding::Unverified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assemble;
    use crate::season::Season;
    use crate::store::SearchResult;
    use crate::testing::{Script, ScriptedGenerator, make_chunk};

    fn context() -> AssembledContext {
        let results = vec![
            SearchResult {
                chunk: make_chunk(
                    "stats#2024-25:0",
                    "stats#2024-25",
                    "Player X (Team Z), 2024-25 season: assists per game 10.2",
                ),
                score: 0.9,
                seq: 0,
            },
            SearchResult {
                chunk: make_chunk("trade:0", "trade", "Player X traded to Team Y in December 2024"),
                score: 0.5,
                seq: 1,
            },
        ];
        assemble(&results, 4000)
    }

    fn answerer(generator: ScriptedGenerator) -> GroundedAnswerer<ScriptedGenerator> {
        GroundedAnswerer::new(generator, GenerationConfig::default(), SeasonBounds::default())
    }

    #[test]
    fn test_future_refusal_text() {
        assert_eq!(
            future_refusal(&SeasonBounds::default()),
            "I can only answer questions about the 2023-24 through 2025-26 seasons; that period is outside the documents I have."
        );
    }

    #[test]
    fn test_temporal_gate() {
        let answerer = answerer(ScriptedGenerator::replying("unused"));
        assert!(answerer.temporal_gate("What will happen in the 2031 season?").is_some());
        assert!(answerer.temporal_gate("Who wins the 2026-27 title?").is_some());
        assert!(answerer.temporal_gate("Who led in assists in 2024-25?").is_none());
        assert!(answerer.temporal_gate("What happened in 2026?").is_none());
        assert!(answerer.temporal_gate("Who won in 1996?").is_none());
        assert!(answerer.temporal_gate("How many assists does Player X average?").is_none());
    }

    #[test]
    fn test_temporal_gate_follows_bounds() {
        let bounds = SeasonBounds::new(Season::new(2023), Season::new(2024)).unwrap();
        let answerer = GroundedAnswerer::new(
            ScriptedGenerator::replying("unused"),
            GenerationConfig::default(),
            bounds,
        );
        let refusal = answerer.temporal_gate("Any news for 2025-26?").unwrap();
        assert!(refusal.text.contains("2023-24 through 2024-25"));
    }

    #[tokio::test]
    async fn test_future_question_never_calls_generator() {
        let answerer = answerer(ScriptedGenerator::replying("anything"));
        let answer = answerer
            .answer("What will happen in the 2031 season?", &context(), "gpt-4o-mini")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::Refused(RefusalReason::FuturePeriod));
        assert_eq!(answerer.generator().calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_with_citation() {
        let answerer = answerer(ScriptedGenerator::replying(
            "Player X averages 10.2 assists per game [1].",
        ));
        let answer = answerer
            .answer("How many assists does Player X average?", &context(), "gpt-4o")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.cited, vec![1]);
        assert_eq!(answer.grounding, Grounding::Supported);

        let request = answerer.generator().last_request().unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert!(request.system.contains(NOT_FOUND_ANSWER));
        assert!(request.context.contains("[1] stats#2024-25"));
    }

    #[tokio::test]
    async fn test_unknown_markers_are_ignored() {
        let answerer = answerer(ScriptedGenerator::replying("Team Y [2] [7]"));
        let answer = answerer.answer("Where was X traded?", &context(), "m").await.unwrap();
        assert_eq!(answer.cited, vec![2]);
    }

    #[tokio::test]
    async fn test_not_found_reply_is_normalized() {
        let answerer = answerer(ScriptedGenerator::replying(
            "the documents do not contain this information",
        ));
        let answer = answerer.answer("Who won MVP?", &context(), "m").await.unwrap();

        assert_eq!(answer.text, NOT_FOUND_ANSWER);
        assert_eq!(answer.outcome, Outcome::Refused(RefusalReason::NotFound));
    }

    #[tokio::test]
    async fn test_empty_context_skips_generation() {
        let answerer = answerer(ScriptedGenerator::replying("anything"));
        let answer = answerer
            .answer("Who won MVP?", &AssembledContext::default(), "m")
            .await
            .unwrap();

        assert_eq!(answer.text, NOT_FOUND_ANSWER);
        assert_eq!(answerer.generator().calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_answer_is_flagged() {
        let answerer = answerer(ScriptedGenerator::replying("Michael Jordan scored 63 points."));
        let answer = answerer.answer("Who scored most?", &context(), "m").await.unwrap();

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.grounding, Grounding::Unverified);
    }

    #[tokio::test]
    async fn test_timeout_abandons_query() {
        let answerer = answerer(ScriptedGenerator::new(Script::Hang))
            .with_timeout(Duration::from_millis(50));
        let err = answerer.answer("Who?", &context(), "m").await.unwrap_err();

        assert!(matches!(err, Error::GenerationTimeout(_)));
        assert!(err.is_retryable());
        assert_eq!(answerer.generator().calls(), 1);
    }

    #[tokio::test]
    async fn test_quota_error_surfaces() {
        let answerer = answerer(ScriptedGenerator::new(Script::QuotaExceeded));
        let err = answerer.answer("Who?", &context(), "m").await.unwrap_err();
        assert!(matches!(err, Error::GenerationQuotaExceeded(_)));
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn test_grounding_matches_numbers_and_words() {
        let context = "Player X averaged 10.2 assists";
        assert_eq!(check_grounding("It was 10.2", context), Grounding::Supported);
        assert_eq!(check_grounding("Many assists [1]", context), Grounding::Supported);
        assert_eq!(check_grounding("Yes [1].", context), Grounding::Unverified);
    }

    #[test]
    fn test_grounding_flags_numbers_missing_from_context() {
        let context = "Player X averaged 10.2 assists";
        assert_eq!(
            check_grounding("Player X averaged 25.0 points [1]", context),
            Grounding::Unverified
        );
        assert_eq!(
            check_grounding("Player X averaged 10.2 assists [1]", context),
            Grounding::Supported
        );
    }
}
