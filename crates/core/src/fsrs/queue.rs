/// Review-queue assembly.
///
/// The queue is a prioritized union of three classes: due LEARNING/
/// RELEARNING cards, due REVIEW cards, and NEW (unseen) problems. Capacity
/// is split per configured ratios and backfilled in priority order when a
/// class cannot fill its share.
use codetop_config::QueueConfig;
use codetop_domain::{Card, Problem};

/// Per-class slot allocation for one queue build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSplit {
    pub learning: usize,
    pub review: usize,
    pub fresh: usize,
}

/// Slot targets for a limit under the configured ratios. The NEW share
/// absorbs rounding remainder so the targets always sum to `limit`.
pub fn compute_split(limit: usize, config: &QueueConfig) -> QueueSplit {
    let learning = (limit as f64 * config.learning_ratio).round() as usize;
    let review = (limit as f64 * config.review_ratio).round() as usize;
    let learning = learning.min(limit);
    let review = review.min(limit - learning);
    QueueSplit {
        learning,
        review,
        fresh: limit - learning - review,
    }
}

/// Assembled queue; `learning` and `review` are due cards, `fresh` are
/// problems the user has not seen yet.
#[derive(Debug, Clone, Default)]
pub struct ReviewQueue {
    pub learning: Vec<Card>,
    pub review: Vec<Card>,
    pub fresh: Vec<Problem>,
}

impl ReviewQueue {
    pub fn total(&self) -> usize {
        self.learning.len() + self.review.len() + self.fresh.len()
    }

    /// Due cards in priority order: learning/relearning before review,
    /// each sorted by due date then problem id.
    pub fn due_cards(&self) -> Vec<&Card> {
        self.learning.iter().chain(self.review.iter()).collect()
    }
}

/// Build the queue from pre-fetched class lists.
///
/// Sorting is re-applied here so the output ordering is a pure function of
/// the inputs: due classes by `next_review` asc then problem id, new
/// problems by creation order.
pub fn assemble_queue(
    mut learning_due: Vec<Card>,
    mut review_due: Vec<Card>,
    mut new_problems: Vec<Problem>,
    limit: usize,
    config: &QueueConfig,
) -> ReviewQueue {
    if limit == 0 {
        return ReviewQueue::default();
    }

    let due_sort = |a: &Card, b: &Card| {
        a.next_review
            .cmp(&b.next_review)
            .then(a.problem_id.cmp(&b.problem_id))
    };
    learning_due.sort_by(due_sort);
    review_due.sort_by(due_sort);
    new_problems.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let split = compute_split(limit, config);

    let mut take_learning = split.learning.min(learning_due.len());
    let mut take_review = split.review.min(review_due.len());
    let mut take_fresh = split.fresh.min(new_problems.len());

    // Redistribute unfilled slots in priority order so the queue totals
    // `limit` whenever enough material exists.
    let mut leftover = limit - take_learning - take_review - take_fresh;
    let extra = (learning_due.len() - take_learning).min(leftover);
    take_learning += extra;
    leftover -= extra;
    let extra = (review_due.len() - take_review).min(leftover);
    take_review += extra;
    leftover -= extra;
    let extra = (new_problems.len() - take_fresh).min(leftover);
    take_fresh += extra;

    learning_due.truncate(take_learning);
    review_due.truncate(take_review);
    new_problems.truncate(take_fresh);

    ReviewQueue {
        learning: learning_due,
        review: review_due,
        fresh: new_problems,
    }
}
