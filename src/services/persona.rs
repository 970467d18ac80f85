//! Persona lock generation.
//!
//! One virtual model per batch: a sampled text description, optionally anchored
//! by a reference headshot generated before any job runs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::persona::{PersonaDetails, PersonaLock, Sex};
use crate::models::product::Size;
use crate::services::image_api::{GeneratedImage, ImageApiError, ImageGenerator, ImageRequest};
use crate::services::rate_limit::RateLimiter;
use crate::services::retry::{RetryDecision, RetryPolicy};

// ── Persona tables ──────────────────────────────────────────────────────

const FEMALE_NAMES: &[&str] = &[
    "Amara", "Sofia", "Mei", "Priya", "Elena", "Naomi", "Lucia", "Hana", "Zara", "Ingrid",
];

const MALE_NAMES: &[&str] = &[
    "Marcus", "Kenji", "Mateo", "Arjun", "Liam", "Tariq", "Jonas", "Kwame", "Diego", "Felix",
];

const HAIR: &[&str] = &[
    "short natural curls",
    "shoulder-length straight dark hair",
    "cropped fade",
    "wavy chestnut hair tied back",
    "long braids",
    "tousled sandy blond hair",
    "sleek black bob",
    "close-cropped buzz cut",
];

const FEATURES: &[&str] = &[
    "warm brown eyes and a relaxed smile",
    "defined cheekbones and a calm expression",
    "light freckles and a friendly look",
    "strong jawline and a neutral expression",
    "soft features and a confident gaze",
    "expressive eyebrows and a subtle smile",
];

fn build_for(size: Size) -> &'static [&'static str] {
    match size {
        Size::Xs | Size::S => &["slim build", "petite lean frame"],
        Size::M | Size::OneSize => &["average athletic build", "medium build with an upright posture"],
        Size::L | Size::Xl => &["broad-shouldered build", "sturdy athletic frame"],
        Size::Xxl | Size::Xxxl => &["full-figured build", "tall heavyset frame"],
    }
}

fn pick<'a>(rng: &mut StdRng, options: &'a [&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

/// Describe the virtual model. A seed makes the description reproducible.
pub fn describe(details: &PersonaDetails, seed: Option<u64>) -> PersonaLock {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let names = match details.sex {
        Sex::Female => FEMALE_NAMES,
        Sex::Male => MALE_NAMES,
    };
    let name = pick(&mut rng, names).to_string();
    let build = pick(&mut rng, build_for(details.size));
    let hair = pick(&mut rng, HAIR);
    let features = pick(&mut rng, FEATURES);

    PersonaLock {
        age: details.age,
        sex: details.sex,
        ethnicity: details.ethnicity.trim().to_string(),
        size: details.size,
        name,
        description: format!("{}, {}, {}", build, hair, features),
        reference_image: None,
    }
}

/// Prompt for the reference headshot.
pub fn headshot_prompt(lock: &PersonaLock) -> String {
    format!(
        "studio headshot portrait of {}, a {} {} person in their {}, {}, plain grey backdrop, \
         soft even lighting, neutral expression, photorealistic, sharp focus",
        lock.name,
        lock.ethnicity,
        lock.sex.as_ref(),
        lock.age.describe(),
        lock.description
    )
}

const HEADSHOT_NEGATIVE: &str =
    "multiple people, sunglasses, hat, heavy makeup, cartoon, illustration, blurry";

/// Produces persona locks, calling upstream for the headshot.
pub struct PersonaLockGenerator {
    generator: Arc<dyn ImageGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl PersonaLockGenerator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        rate_limiter: Arc<dyn RateLimiter>,
        retry: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            rate_limiter,
            retry,
            attempt_timeout,
        }
    }

    /// Describe the persona and, when asked, anchor it with a headshot.
    pub async fn lock_for(
        &self,
        details: &PersonaDetails,
        seed: Option<u64>,
        with_headshot: bool,
        cancel: &CancellationToken,
    ) -> Result<PersonaLock, PersonaError> {
        let mut lock = describe(details, seed);
        if with_headshot {
            lock.reference_image = Some(self.generate_headshot(&lock, cancel).await?);
        }
        tracing::info!(
            persona = %lock.name,
            has_headshot = lock.has_reference_image(),
            "Persona lock ready"
        );
        Ok(lock)
    }

    /// One upstream call per attempt, retried with the job backoff policy.
    pub async fn generate_headshot(
        &self,
        lock: &PersonaLock,
        cancel: &CancellationToken,
    ) -> Result<GeneratedImage, PersonaError> {
        let prompt = headshot_prompt(lock);
        let request = ImageRequest {
            prompt: &prompt,
            negative_prompt: HEADSHOT_NEGATIVE,
            reference_image: None,
        };

        let mut failures = 0;
        loop {
            let attempt = async {
                self.rate_limiter.acquire().await;
                match tokio::time::timeout(self.attempt_timeout, self.generator.generate(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ImageApiError::Timeout(self.attempt_timeout)),
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PersonaError::Cancelled),
                outcome = attempt => outcome,
            };

            let error = match outcome {
                Ok(image) => return Ok(image),
                Err(e) => e,
            };

            failures += 1;
            match self.retry.after_failure(failures) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        persona = %lock.name,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Headshot generation failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PersonaError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted => {
                    tracing::error!(
                        persona = %lock.name,
                        attempts = failures,
                        error = %error,
                        "Headshot generation failed after max retries"
                    );
                    metrics::counter!("mockup_persona_failures").increment(1);
                    return Err(PersonaError::LockFailed {
                        attempts: failures,
                        last_error: error.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("Persona lock failed after {attempts} attempts: {last_error}")]
    LockFailed { attempts: u32, last_error: String },

    #[error("Persona generation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::persona::AgeBand;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Unlimited;

    #[async_trait]
    impl RateLimiter for Unlimited {
        async fn acquire(&self) {}
    }

    /// Fails the first `failures` calls, then returns a PNG.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ImageGenerator for Flaky {
        async fn generate(&self, _request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(ImageApiError::Status {
                    status: 503,
                    body: "busy".to_string(),
                });
            }
            Ok(GeneratedImage {
                data: vec![7; 4],
                mime_type: "image/png".to_string(),
            })
        }
    }

    fn details() -> PersonaDetails {
        PersonaDetails {
            age: AgeBand::Age35To44,
            sex: Sex::Male,
            ethnicity: "South Asian".to_string(),
            size: Size::Xl,
        }
    }

    fn generator(failures: u32) -> (Arc<Flaky>, PersonaLockGenerator) {
        let flaky = Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
        });
        let gen = PersonaLockGenerator::new(
            flaky.clone(),
            Arc::new(Unlimited),
            RetryPolicy::new(3, Duration::from_millis(100)),
            Duration::from_secs(30),
        );
        (flaky, gen)
    }

    #[test]
    fn test_seeded_description_is_deterministic() {
        let a = describe(&details(), Some(42));
        let b = describe(&details(), Some(42));
        assert_eq!(a.name, b.name);
        assert_eq!(a.description, b.description);
        assert!(MALE_NAMES.contains(&a.name.as_str()));
        assert!(build_for(Size::Xl).iter().any(|b| a.description.starts_with(b)));
    }

    #[test]
    fn test_headshot_prompt_mentions_identity() {
        let lock = describe(&details(), Some(7));
        let prompt = headshot_prompt(&lock);
        assert!(prompt.contains(&lock.name));
        assert!(prompt.contains("South Asian male"));
        assert!(prompt.contains("late thirties"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_headshot_recovers_within_budget() {
        let (flaky, gen) = generator(2);
        let lock = gen
            .lock_for(&details(), Some(1), true, &CancellationToken::new())
            .await
            .unwrap();
        assert!(lock.has_reference_image());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headshot_exhaustion_is_lock_failed() {
        let (flaky, gen) = generator(u32::MAX);
        let err = gen
            .lock_for(&details(), Some(1), true, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::LockFailed { attempts: 3, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_is_cancelled() {
        let (flaky, gen) = generator(u32::MAX);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = gen.lock_for(&details(), Some(1), true, &cancel).await.unwrap_err();
        assert!(matches!(err, PersonaError::Cancelled));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_description_only_makes_no_calls() {
        let (flaky, gen) = generator(0);
        let lock = gen
            .lock_for(&details(), None, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!lock.has_reference_image());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }
}
