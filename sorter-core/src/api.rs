//! `Core`: the facade the rest of the world talks to. Holds the log and
//! the derived state behind one gate, so every submission is applied to
//! both in a single, strictly ordered step.

use std::path::Path;

use log::warn;
use parking_lot::Mutex;

use crate::dsl;
use crate::error::{IngestError, LogError, ReplayError};
use crate::ledger::Log;
use crate::ranker::{self, Comparison, HashtagSummary, RankedItem};
use crate::reducer::reduce;
use crate::state::State;

/// What a successful [`Core::ingest`] call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub filename: String,
    pub statements_applied: usize,
}

/// The whole engine: an append-only log on disk and the state derived
/// from it in memory, gated by a single mutex. There is exactly one
/// writer at a time; readers see a consistent snapshot because the lock
/// is held for the duration of any read too.
pub struct Core {
    state: Mutex<State>,
    log: Log,
}

impl Core {
    /// Opens (creating if necessary) the log at `dir` and replays it to
    /// reconstruct state. Per-entry replay failures are logged and
    /// skipped, not fatal; only an I/O failure listing or reading the log
    /// directory itself aborts `open`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let log = Log::init(dir)?;
        let core = Core {
            state: Mutex::new(State::new()),
            log,
        };
        let errors = core.replay()?;
        for err in &errors {
            warn!("replay: {err}");
        }
        Ok(core)
    }

    /// Parses, validates, and durably records one submission. `subject` is
    /// the inbound message's subject line, used only to make the log
    /// filename readable; it carries no DSL semantics of its own. On
    /// success the submission is both on disk and reflected in state; on
    /// any failure state is left exactly as it was. If the reducer rejects
    /// a document that was already appended, the just-written file is
    /// deleted before the error is returned — replay must never see a
    /// submission that failed to apply.
    pub fn ingest(
        &self,
        from: &str,
        timestamp: i64,
        subject: &str,
        body: &str,
    ) -> Result<IngestReceipt, IngestError> {
        let document = dsl::parse_filtered(body)?;
        if document.is_empty() {
            return Err(IngestError::NoDslContent);
        }

        let envelope_timestamp = crate::ledger::format_timestamp(timestamp);
        let mut state = self.state.lock();
        let filename = self.log.append(from, timestamp, subject, body)?;
        if let Err(source) = reduce(&mut state, &document, from, &envelope_timestamp, &filename) {
            if let Err(remove_err) = self.log.remove(&filename) {
                warn!("failed to roll back rejected submission {filename}: {remove_err}");
            }
            return Err(source.into());
        }

        Ok(IngestReceipt {
            filename,
            statements_applied: document.statements.len(),
        })
    }

    /// Rebuilds state from scratch by replaying every log entry in
    /// filename (chronological) order. Returns one [`ReplayError`] per
    /// entry that failed to parse or reduce; those entries simply
    /// contribute nothing to the rebuilt state.
    pub fn replay(&self) -> Result<Vec<ReplayError>, LogError> {
        let filenames = self.log.list_chronological()?;
        let mut state = self.state.lock();
        *state = State::new();
        let mut errors = Vec::new();

        for filename in filenames {
            let entry = match self.log.get(&filename) {
                Ok(entry) => entry,
                Err(source) => {
                    errors.push(ReplayError::Log {
                        filename: filename.clone(),
                        source,
                    });
                    continue;
                }
            };

            match dsl::parse_filtered(&entry.body) {
                Ok(document) => {
                    if document.is_empty() {
                        continue;
                    }
                    if let Err(source) =
                        reduce(&mut state, &document, &entry.from, &entry.timestamp, &filename)
                    {
                        errors.push(ReplayError::Reducer {
                            filename: filename.clone(),
                            source,
                        });
                    }
                }
                Err(source) => errors.push(ReplayError::Parse {
                    filename: filename.clone(),
                    source,
                }),
            }
        }

        Ok(errors)
    }

    pub fn list_hashtags(&self) -> Vec<HashtagSummary> {
        ranker::list_hashtags(&self.state.lock())
    }

    pub fn rank(&self, hashtag: &str, attribute: &str) -> Vec<RankedItem> {
        ranker::rank(&self.state.lock(), hashtag, attribute)
    }

    pub fn compare(&self, item_a: &str, item_b: &str, attribute: &str) -> Comparison {
        ranker::compare(&self.state.lock(), item_a, item_b, attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_then_rank_reflects_the_vote() {
        let dir = tempfile::tempdir().unwrap();
        let core = Core::open(dir.path()).unwrap();

        core.ingest(
            "alice@example.com",
            1000,
            "weekly ideas",
            "#ideas\n/a\n/b\n:impact\n/a 5:1 /b",
        )
        .unwrap();

        let ranked = core.rank("ideas", "impact");
        assert_eq!(ranked[0].title, "a");
    }

    #[test]
    fn ingest_rejects_prose_with_no_dsl_content() {
        let dir = tempfile::tempdir().unwrap();
        let core = Core::open(dir.path()).unwrap();

        let err = core
            .ingest("alice@example.com", 1000, "hello", "just saying hi")
            .unwrap_err();
        assert!(matches!(err, IngestError::NoDslContent));
    }

    #[test]
    fn reopening_replays_prior_submissions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let core = Core::open(dir.path()).unwrap();
            core.ingest(
                "alice@example.com",
                1000,
                "weekly ideas",
                "#ideas\n/a\n/b\n:impact\n/a 5:1 /b",
            )
            .unwrap();
        }

        let reopened = Core::open(dir.path()).unwrap();
        let ranked = reopened.rank("ideas", "impact");
        assert_eq!(ranked[0].title, "a");
    }

    #[test]
    fn failed_ingest_does_not_advance_state() {
        let dir = tempfile::tempdir().unwrap();
        let core = Core::open(dir.path()).unwrap();
        core.ingest("alice@example.com", 1000, "ideas", "#ideas\n/a")
            .unwrap();

        let err = core
            .ingest("alice@example.com", 1001, "re: ideas", "#ideas\n/a > /ghost")
            .unwrap_err();
        assert!(matches!(err, IngestError::Reducer(_)));
        assert!(core.rank("ideas", "impact").len() == 1);
    }

    #[test]
    fn a_reducer_rejected_submission_leaves_no_trace_for_replay() {
        let dir = tempfile::tempdir().unwrap();
        let core = Core::open(dir.path()).unwrap();
        core.ingest("alice@example.com", 1000, "ideas", "#ideas\n/a")
            .unwrap();

        core.ingest("alice@example.com", 1001, "re: ideas", "#ideas\n/a > /ghost")
            .unwrap_err();

        let reopened = Core::open(dir.path()).unwrap();
        assert_eq!(reopened.rank("ideas", "impact").len(), 1);
        assert_eq!(reopened.replay().unwrap().len(), 0);
    }
}
