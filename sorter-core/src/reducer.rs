//! Folds a parsed [`Document`] into [`State`], enforcing the ordering and
//! validation rules the grammar alone can't express: hashtag-before-item,
//! attribute-before-vote, no forward references, no silently overwritten
//! bodies.

use std::collections::BTreeSet;

use crate::dsl::{Document, Statement};
use crate::error::ReducerError;
use crate::state::{Item, State, Vote};

/// Applies every statement in `document` to `state`, atomically: if any
/// statement fails validation, `state` is left exactly as it was before
/// the call.
pub fn reduce(
    state: &mut State,
    document: &Document,
    from: &str,
    timestamp: &str,
    source_filename: &str,
) -> Result<(), ReducerError> {
    let mut scratch = state.clone();
    apply(&mut scratch, document, from, timestamp, source_filename)?;
    *state = scratch;
    Ok(())
}

fn apply(
    state: &mut State,
    document: &Document,
    from: &str,
    timestamp: &str,
    source_filename: &str,
) -> Result<(), ReducerError> {
    let mut current_hashtag: Option<String> = None;
    let mut current_attribute: Option<String> = None;

    for statement in &document.statements {
        match statement {
            Statement::Hashtag(name) => {
                current_hashtag = Some(name.clone());
            }
            Statement::Item { title, body } => {
                let hashtag =
                    current_hashtag
                        .clone()
                        .ok_or_else(|| ReducerError::MissingHashtagContext {
                            title: title.clone(),
                        })?;
                apply_item(state, title, body.as_deref(), &hashtag, from, timestamp)?;
            }
            Statement::AttributeDecl(names) => {
                current_attribute = names.last().cloned();
            }
            Statement::Vote {
                item1,
                item2,
                ratio_left,
                ratio_right,
                explanation,
            } => {
                let attribute = current_attribute.clone().ok_or_else(|| {
                    ReducerError::MissingAttributeContext {
                        item1: item1.clone(),
                        item2: item2.clone(),
                    }
                })?;
                apply_vote(
                    state,
                    item1,
                    item2,
                    *ratio_left,
                    *ratio_right,
                    &attribute,
                    explanation.as_deref(),
                    from,
                    timestamp,
                    source_filename,
                )?;
            }
            Statement::EmailLiteral(address) => {
                state.seen_emails.insert(address.clone());
            }
        }
    }

    Ok(())
}

/// Creates the item on first mention, otherwise widens its hashtag
/// membership. A body may only be set once; submitting a second body is
/// [`ReducerError::ImmutableBody`], not a silent overwrite.
fn apply_item(
    state: &mut State,
    title: &str,
    body: Option<&str>,
    hashtag: &str,
    from: &str,
    timestamp: &str,
) -> Result<(), ReducerError> {
    if let Some(existing) = state.items.get_mut(title) {
        if body.is_some() && existing.body.is_some() {
            return Err(ReducerError::ImmutableBody {
                title: title.to_string(),
            });
        }
        existing.hashtags.insert(hashtag.to_string());
        if existing.body.is_none() {
            existing.body = body.map(|s| s.to_string());
        }
        return Ok(());
    }

    let mut hashtags = BTreeSet::new();
    hashtags.insert(hashtag.to_string());
    state.items.insert(
        title.to_string(),
        Item {
            title: title.to_string(),
            body: body.map(|s| s.to_string()),
            hashtags,
            created_by: from.to_string(),
            timestamp: timestamp.to_string(),
        },
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_vote(
    state: &mut State,
    item1: &str,
    item2: &str,
    ratio_left: u32,
    ratio_right: u32,
    attribute: &str,
    explanation: Option<&str>,
    from: &str,
    timestamp: &str,
    source_filename: &str,
) -> Result<(), ReducerError> {
    if !state.items.contains_key(item1) {
        return Err(ReducerError::UnknownItem {
            title: item1.to_string(),
        });
    }
    if !state.items.contains_key(item2) {
        return Err(ReducerError::UnknownItem {
            title: item2.to_string(),
        });
    }
    if ratio_left == 0 || ratio_right == 0 {
        return Err(ReducerError::ZeroRatio {
            ratio_left,
            ratio_right,
        });
    }

    state.votes.push(Vote {
        item1: item1.to_string(),
        item2: item2.to_string(),
        ratio_left,
        ratio_right,
        attribute: attribute.to_string(),
        explanation: explanation.map(|s| s.to_string()),
        user_email: from.to_string(),
        timestamp: timestamp.to_string(),
        source_filename: source_filename.to_string(),
    });
    Ok(())
}
