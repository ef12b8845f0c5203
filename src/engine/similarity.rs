use std::cmp::Ordering;
use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::MAX_SIMILAR_LIMIT;
use crate::model::*;

use super::{Engine, EngineError};

/// Shared tags descending, then rating descending (unrated last), then id.
pub fn rank_order(a: &SimilarCampground, b: &SimilarCampground) -> Ordering {
    b.shared_tags
        .cmp(&a.shared_tags)
        .then_with(|| match (a.rating, b.rating) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

impl Engine {
    /// Other campgrounds ranked by how many tags they share with `campground_id`.
    ///
    /// Scores come from the tag → campground postings, so the cost is the sum
    /// of the source tags' posting lengths rather than a scan of every
    /// campground. Campgrounds sharing nothing are left out.
    pub async fn similar_to(
        &self,
        campground_id: Ulid,
        limit: usize,
    ) -> Result<Vec<SimilarCampground>, EngineError> {
        let source = self
            .store
            .get_campground(&campground_id)
            .ok_or(EngineError::NotFound(campground_id))?;
        let tags: Vec<Ulid> = source.read().await.tags.iter().copied().collect();

        let mut shared: HashMap<Ulid, usize> = HashMap::new();
        for tag in &tags {
            for other in self.store.campgrounds_with_tag(tag) {
                if other != campground_id {
                    *shared.entry(other).or_default() += 1;
                }
            }
        }

        let mut ranked = Vec::with_capacity(shared.len());
        for (id, shared_tags) in shared {
            // Deleted since the postings were read.
            let Some(cs) = self.store.get_campground(&id) else {
                continue;
            };
            let rating = cs.read().await.rating;
            ranked.push(SimilarCampground {
                id,
                shared_tags,
                rating,
            });
        }
        ranked.sort_by(rank_order);
        ranked.truncate(limit.min(MAX_SIMILAR_LIMIT));
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(id: Ulid, shared_tags: usize, rating: Option<f64>) -> SimilarCampground {
        SimilarCampground {
            id,
            shared_tags,
            rating,
        }
    }

    #[test]
    fn more_shared_tags_first() {
        let (a, b) = (Ulid::new(), Ulid::new());
        let mut v = vec![sim(a, 1, Some(5.0)), sim(b, 2, None)];
        v.sort_by(rank_order);
        assert_eq!(v[0].id, b);
    }

    #[test]
    fn rating_breaks_ties_and_unrated_sorts_last() {
        let (a, b, c) = (Ulid::new(), Ulid::new(), Ulid::new());
        let mut v = vec![sim(a, 2, None), sim(b, 2, Some(3.5)), sim(c, 2, Some(4.5))];
        v.sort_by(rank_order);
        let order: Vec<Ulid> = v.iter().map(|s| s.id).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn id_breaks_remaining_ties() {
        let lo = Ulid::from_parts(1, 0);
        let hi = Ulid::from_parts(2, 0);
        let mut v = vec![sim(hi, 1, Some(4.0)), sim(lo, 1, Some(4.0))];
        v.sort_by(rank_order);
        assert_eq!(v[0].id, lo);
    }
}
