//! The normalized, in-memory shape of everything the engine knows:
//! items, their hashtag membership, and the votes cast between them.
//!
//! `State` is owned exclusively by [`crate::api::Core`]; the reducer only
//! ever sees it through a `&mut State` handed to it while the gate is held.

use std::collections::{BTreeMap, BTreeSet};

/// A uniquely-named rankable entity.
///
/// `body` is write-once: the reducer rejects any attempt to set it a second
/// time (see [`crate::error::ReducerError::ImmutableBody`]). `hashtags` only
/// ever grows.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    pub title: String,
    pub body: Option<String>,
    pub hashtags: BTreeSet<String>,
    pub created_by: String,
    pub timestamp: String,
}

/// An ordered pairwise preference between two items, under one attribute.
///
/// Votes are append-only: once recorded they are never mutated or removed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Vote {
    pub item1: String,
    pub item2: String,
    pub ratio_left: u32,
    pub ratio_right: u32,
    pub attribute: String,
    pub explanation: Option<String>,
    pub user_email: String,
    pub timestamp: String,
    pub source_filename: String,
}

/// The aggregate state of the system: every known item, every vote ever
/// cast, and every email address the engine has seen in an `@`-literal.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub items: BTreeMap<String, Item>,
    pub votes: Vec<Vote>,
    pub seen_emails: BTreeSet<String>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// Titles of items carrying `hashtag`, in sorted order.
    pub fn items_in_hashtag<'a>(&'a self, hashtag: &'a str) -> impl Iterator<Item = &'a str> {
        self.items
            .values()
            .filter(move |item| item.hashtags.contains(hashtag))
            .map(|item| item.title.as_str())
    }

    /// Votes whose attribute matches and whose two items both carry `hashtag`.
    pub fn votes_in_hashtag_attribute<'a>(
        &'a self,
        hashtag: &'a str,
        attribute: &'a str,
    ) -> impl Iterator<Item = &'a Vote> {
        self.votes.iter().filter(move |v| {
            v.attribute == attribute
                && self
                    .items
                    .get(&v.item1)
                    .map_or(false, |i| i.hashtags.contains(hashtag))
                && self
                    .items
                    .get(&v.item2)
                    .map_or(false, |i| i.hashtags.contains(hashtag))
        })
    }

    /// Every hashtag currently in use, derived from item membership (a
    /// hashtag has no existence beyond the items that carry it).
    pub fn hashtags(&self) -> BTreeSet<&str> {
        let mut tags = BTreeSet::new();
        for item in self.items.values() {
            for tag in &item.hashtags {
                tags.insert(tag.as_str());
            }
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, tags: &[&str]) -> Item {
        Item {
            title: title.to_string(),
            body: None,
            hashtags: tags.iter().map(|t| t.to_string()).collect(),
            created_by: "u@e".to_string(),
            timestamp: "1".to_string(),
        }
    }

    #[test]
    fn items_in_hashtag_filters_by_membership() {
        let mut state = State::new();
        state.items.insert("a".into(), item("a", &["ideas"]));
        state.items.insert("b".into(), item("b", &["food"]));

        let titles: Vec<_> = state.items_in_hashtag("ideas").collect();
        assert_eq!(titles, vec!["a"]);
    }

    #[test]
    fn hashtags_union_across_items() {
        let mut state = State::new();
        state.items.insert("a".into(), item("a", &["ideas", "food"]));
        state.items.insert("b".into(), item("b", &["food"]));

        let tags: BTreeSet<&str> = state.hashtags();
        assert_eq!(tags, BTreeSet::from(["food", "ideas"]));
    }
}
