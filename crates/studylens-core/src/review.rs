//! Flashcard review workflow on top of [`FlashcardStore`].
//!
//! [`review_flashcard`] reads a card, advances its schedule with the SM-2
//! [`Scheduler`], and writes the result back with a compare-and-swap on the
//! card version. Two reviews racing on the same card cannot both win: the
//! loser gets [`ReviewError::Conflict`] and is expected to re-read.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::ReviewError;
use crate::models::{Flashcard, FlashcardSchedule, Quality};
use crate::schedule::Scheduler;
use crate::store::FlashcardStore;

impl Flashcard {
    /// A new card with a fresh id, due immediately.
    pub fn new(
        scope: &str,
        question: &str,
        answer: &str,
        scheduler: &Scheduler,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            question: question.trim().to_string(),
            answer: answer.trim().to_string(),
            created_at: now,
            version: 0,
            schedule: scheduler.initial_schedule(now),
        }
    }
}

/// Apply a review rated `quality` to card `card_id`.
///
/// The rating is validated before the store is touched.
pub async fn review_flashcard<S>(
    store: &S,
    scheduler: &Scheduler,
    card_id: &str,
    quality: i64,
    now: DateTime<Utc>,
) -> Result<FlashcardSchedule, ReviewError>
where
    S: FlashcardStore + ?Sized,
{
    let quality = Quality::new(quality)?;

    let card = store
        .get_flashcard(card_id)
        .await
        .map_err(ReviewError::Store)?
        .ok_or_else(|| ReviewError::NotFound(card_id.to_string()))?;

    let next = scheduler.advance(&card.schedule, quality, now);

    let swapped = store
        .compare_and_swap_schedule(card_id, card.version, &next)
        .await
        .map_err(ReviewError::Store)?;
    if !swapped {
        return Err(ReviewError::Conflict(card_id.to_string()));
    }

    debug!(
        card = card_id,
        quality = quality.value(),
        interval = next.interval,
        repetitions = next.repetitions,
        "flashcard reviewed"
    );
    Ok(next)
}

/// Cards in `scope` that are due at `now`, earliest first.
///
/// Cards with a blank question or answer are skipped.
pub async fn due_flashcards<S>(
    store: &S,
    scope: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Flashcard>>
where
    S: FlashcardStore + ?Sized,
{
    let mut cards: Vec<Flashcard> = store
        .list_flashcards(scope)
        .await?
        .into_iter()
        .filter(|c| c.is_complete() && c.is_due(now))
        .collect();
    sort_by_due(&mut cards);
    Ok(cards)
}

/// Cards in `scope`, earliest due first. Not-yet-due cards are included
/// only when `include_not_due` is set.
pub async fn list_flashcards<S>(
    store: &S,
    scope: &str,
    include_not_due: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Flashcard>>
where
    S: FlashcardStore + ?Sized,
{
    let mut cards: Vec<Flashcard> = store
        .list_flashcards(scope)
        .await?
        .into_iter()
        .filter(|c| include_not_due || c.is_due(now))
        .collect();
    sort_by_due(&mut cards);
    Ok(cards)
}

fn sort_by_due(cards: &mut [Flashcard]) {
    cards.sort_by(|a, b| {
        a.schedule
            .next_review_date
            .cmp(&b.schedule.next_review_date)
            .then_with(|| a.id.cmp(&b.id))
    });
}
