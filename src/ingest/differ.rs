//! Novelty diffing for notifications.

use std::collections::HashSet;

use crate::storage::Article;

/// Articles in `new` whose id is absent from `old`, in the order of `new`.
///
/// Pure id-set membership, O(n) over both lists. The result is what the
/// notification collaborator is told about; articles that merely changed
/// fields keep their id and are never re-announced.
pub fn new_articles<'a>(new: &'a [Article], old: &[Article]) -> Vec<&'a Article> {
    let seen: HashSet<&str> = old.iter().map(|a| a.id.as_str()).collect();
    new.iter().filter(|a| !seen.contains(a.id.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Title {}", id),
            description: String::new(),
            author: String::new(),
            link: String::new(),
            image_url: String::new(),
            published: 0,
            keywords: Vec::new(),
        }
    }

    #[test]
    fn test_empty_old_returns_all_new() {
        let new = vec![article("a"), article("b")];
        let fresh = new_articles(&new, &[]);
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_overlap_excluded() {
        let new = vec![article("a"), article("b"), article("c")];
        let old = vec![article("b")];
        let fresh = new_articles(&new, &old);
        let ids: Vec<&str> = fresh.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_changed_fields_same_id_not_new() {
        let mut updated = article("a");
        updated.title = "Completely different".to_string();
        let old = vec![article("a")];
        assert!(new_articles(&[updated], &old).is_empty());
    }

    #[test]
    fn test_order_of_new_preserved() {
        let new = vec![article("z"), article("a"), article("m")];
        let fresh = new_articles(&new, &[]);
        let ids: Vec<&str> = fresh.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    proptest! {
        // No diffed article may carry an id present in the old set, and
        // every new article is either diffed or already known.
        #[test]
        fn prop_diff_partitions_new(
            new_ids in proptest::collection::vec("[a-e]{1,2}", 0..10),
            old_ids in proptest::collection::vec("[a-e]{1,2}", 0..10),
        ) {
            let new: Vec<Article> = new_ids.iter().map(|id| article(id)).collect();
            let old: Vec<Article> = old_ids.iter().map(|id| article(id)).collect();

            let fresh = new_articles(&new, &old);
            let old_set: std::collections::HashSet<&str> =
                old.iter().map(|a| a.id.as_str()).collect();

            for a in &fresh {
                prop_assert!(!old_set.contains(a.id.as_str()));
            }
            for a in &new {
                let is_fresh = fresh.iter().any(|f| std::ptr::eq(*f, a));
                prop_assert!(is_fresh || old_set.contains(a.id.as_str()));
            }
        }
    }
}
