//! Enrichment orchestrator.
//!
//! One run connects to the record store, seeds the category cache, and
//! sweeps three phases in order:
//!
//! 1. records with a null title get a title generated from their
//!    description, or the placeholder title when there is none;
//! 2. records with a blank or placeholder-token title get the same treatment;
//! 3. records with a valid title but no description get a description and a
//!    category generated from the title.
//!
//! A bad or missing answer for one record never aborts the run: title phases
//! fall back to the placeholder, the description phase skips the record.
//! Store errors abort the run. The connection is closed exactly once before
//! `run` returns, on both paths.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use contentfill_generation::GenerationService;
use contentfill_shared::{
    ContentId, DescriptionCandidate, EnrichmentSettings, RecordUpdate, Result, TitleCandidate,
    is_invalid_title,
};
use contentfill_storage::ContentStore;

use crate::category::{CategoryCache, CategoryResolver, MatchKind};
use crate::parser::ResponseParser;
use crate::prompts;

// ---------------------------------------------------------------------------
// Phases and results
// ---------------------------------------------------------------------------

/// The record-selection passes of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NullTitle,
    InvalidTitle,
    MissingDescription,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NullTitle => "null_title",
            Self::InvalidTitle => "invalid_title",
            Self::MissingDescription => "missing_description",
        }
    }

    /// Human-readable name for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NullTitle => "Filling missing titles",
            Self::InvalidTitle => "Fixing invalid titles",
            Self::MissingDescription => "Writing descriptions",
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    /// Titles taken from the generator.
    pub titles_generated: usize,
    /// Titles set to the placeholder.
    pub titles_defaulted: usize,
    /// Descriptions written (with or without a category).
    pub descriptions_written: usize,
    /// Descriptions linked to an existing category.
    pub categories_matched: usize,
    /// Categories created during the run.
    pub categories_created: usize,
    /// Descriptions written without a category because creation was declined.
    pub category_fallbacks: usize,
    /// Records left untouched because the answer was unusable.
    pub records_skipped: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl EnrichmentReport {
    /// Number of store updates issued.
    pub fn records_updated(&self) -> usize {
        self.titles_generated + self.titles_defaulted + self.descriptions_written
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for enrichment runs.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Record-level progress within the current phase.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives enrichment runs against one store with one generator.
pub struct EnrichmentOrchestrator<G, S> {
    generator: G,
    store: S,
    parser: ResponseParser,
    resolver: CategoryResolver,
    max_title_length: usize,
    placeholder_title: String,
    categories: CategoryCache,
}

impl<G, S> EnrichmentOrchestrator<G, S>
where
    G: GenerationService,
    S: ContentStore,
{
    pub fn new(generator: G, store: S, settings: &EnrichmentSettings) -> Self {
        Self {
            generator,
            store,
            parser: ResponseParser::new(settings.preamble_marker.clone()),
            resolver: CategoryResolver::new(
                settings.similarity_cutoff,
                settings.max_close_matches,
            ),
            max_title_length: settings.max_title_length,
            placeholder_title: settings.placeholder_title.clone(),
            categories: CategoryCache::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn into_parts(self) -> (G, S) {
        (self.generator, self.store)
    }

    /// Run all three phases.
    ///
    /// The store is connected at the start and disconnected once at the end.
    /// A failure inside the phases is returned after the disconnect.
    #[instrument(skip_all)]
    pub async fn run(&mut self, progress: &dyn EnrichmentProgress) -> Result<EnrichmentReport> {
        let start = Instant::now();

        progress.phase("Connecting to store");
        self.store.connect().await?;

        let outcome = self.run_phases(progress).await;
        if let Err(e) = &outcome {
            error!(error = %e, "enrichment run failed");
        }

        progress.phase("Closing store");
        let closed = self.store.disconnect().await;

        let mut report = match (outcome, closed) {
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "failed to close store after run error");
                }
                return Err(e);
            }
            (Ok(_), Err(close_err)) => return Err(close_err),
            (Ok(report), Ok(())) => report,
        };

        report.elapsed = start.elapsed();
        info!(
            titles_generated = report.titles_generated,
            titles_defaulted = report.titles_defaulted,
            descriptions_written = report.descriptions_written,
            categories_matched = report.categories_matched,
            categories_created = report.categories_created,
            category_fallbacks = report.category_fallbacks,
            records_skipped = report.records_skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "enrichment complete"
        );
        Ok(report)
    }

    async fn run_phases(&mut self, progress: &dyn EnrichmentProgress) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();

        // Rebuilt every run; categories created by others since the last run
        // are picked up here.
        self.categories = CategoryCache::from_categories(self.store.get_categories().await?);
        debug!(categories = self.categories.len(), "category cache seeded");

        let records = self.store.get_records_with_null_title().await?;
        self.fill_titles(Phase::NullTitle, records, &mut report, progress)
            .await?;

        let records = self.store.get_records_with_invalid_title().await?;
        self.fill_titles(Phase::InvalidTitle, records, &mut report, progress)
            .await?;

        let records = self.store.get_records_without_description().await?;
        self.fill_descriptions(records, &mut report, progress).await?;

        Ok(report)
    }

    /// Shared by both title phases; only the selection differs.
    #[instrument(skip_all, fields(phase = phase.as_str(), records = records.len()))]
    async fn fill_titles(
        &mut self,
        phase: Phase,
        records: Vec<TitleCandidate>,
        report: &mut EnrichmentReport,
        progress: &dyn EnrichmentProgress,
    ) -> Result<()> {
        progress.phase(phase.label());
        let total = records.len();

        for (idx, record) in records.into_iter().enumerate() {
            progress.task_progress(idx + 1, total, &format!("Title for #{}", record.id));

            let description = record
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty());

            let generated = match description {
                Some(description) => self.generate_title(record.id, description).await,
                None => {
                    warn!(content_id = %record.id, "no description available, using placeholder title");
                    None
                }
            };

            let title = match generated {
                Some(title) => {
                    info!(content_id = %record.id, %title, "generated title");
                    report.titles_generated += 1;
                    title
                }
                None => {
                    report.titles_defaulted += 1;
                    self.placeholder_title.clone()
                }
            };

            self.store
                .update_record(record.id, &RecordUpdate::title(title))
                .await?;
        }

        Ok(())
    }

    /// Generate and clean a title. `None` means the placeholder applies.
    async fn generate_title(&mut self, id: ContentId, description: &str) -> Option<String> {
        let prompt = prompts::title_prompt(description, self.max_title_length);
        let raw = self.generate(id, &prompt).await?;

        match self.parser.parse_title(&raw, self.max_title_length) {
            // A token like "N/A" would be selected again as an invalid title.
            Ok(title) if is_invalid_title(&title) => {
                warn!(content_id = %id, %title, "generated title is a placeholder token, using placeholder");
                None
            }
            Ok(title) => Some(title),
            Err(reason) => {
                warn!(content_id = %id, %reason, "could not generate title, using placeholder");
                None
            }
        }
    }

    #[instrument(skip_all, fields(phase = Phase::MissingDescription.as_str(), records = records.len()))]
    async fn fill_descriptions(
        &mut self,
        records: Vec<DescriptionCandidate>,
        report: &mut EnrichmentReport,
        progress: &dyn EnrichmentProgress,
    ) -> Result<()> {
        progress.phase(Phase::MissingDescription.label());
        let total = records.len();

        for (idx, record) in records.into_iter().enumerate() {
            progress.task_progress(idx + 1, total, &format!("Describing: {}", record.title));

            let prompt = prompts::description_prompt(&record.title);
            let Some(raw) = self.generate(record.id, &prompt).await else {
                report.records_skipped += 1;
                continue;
            };

            let fields = match self.parser.parse(&raw) {
                Ok(fields) => fields,
                Err(reason) => {
                    warn!(content_id = %record.id, %reason, "skipped record due to invalid response");
                    report.records_skipped += 1;
                    continue;
                }
            };

            let category_id = match self.resolver.resolve(&fields.category, &self.categories) {
                Some(found) => {
                    if found.kind == MatchKind::Approximate {
                        debug!(label = %fields.category, matched = %found.title, "approximate category");
                    }
                    report.categories_matched += 1;
                    Some(found.id)
                }
                None => {
                    info!(label = %fields.category, "no suitable category found, inserting");
                    match self.store.insert_category(&fields.category).await? {
                        Some(id) => {
                            self.categories.insert(fields.category.clone(), id);
                            report.categories_created += 1;
                            Some(id)
                        }
                        None => {
                            warn!(content_id = %record.id, label = %fields.category, "category insert declined, writing description only");
                            report.category_fallbacks += 1;
                            None
                        }
                    }
                }
            };

            self.store
                .update_record(
                    record.id,
                    &RecordUpdate::description(fields.description, category_id),
                )
                .await?;
            report.descriptions_written += 1;
            info!(content_id = %record.id, category_id = ?category_id, "updated description");
        }

        Ok(())
    }

    /// One request/response exchange. Transport failures are logged and
    /// reported as `None`; they never abort the run.
    async fn generate(&mut self, id: ContentId, prompt: &str) -> Option<String> {
        if let Err(e) = self.generator.send_request(prompt).await {
            warn!(content_id = %id, error = %e, "generation request failed");
            return None;
        }

        match self.generator.get_response().await {
            Ok(raw) => {
                debug!(content_id = %id, raw = %raw, "generation response");
                Some(raw)
            }
            Err(e) => {
                warn!(content_id = %id, error = %e, "generation response failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use contentfill_shared::{
        Category, CategoryId, ContentFillError, ContentRecord, DEFAULT_PLACEHOLDER_TITLE,
    };

    // --- Fakes --------------------------------------------------------------

    #[derive(Default)]
    struct ScriptedGenerator {
        responses: VecDeque<Result<String>>,
        pending: Option<Result<String>>,
        prompts: Vec<String>,
    }

    impl ScriptedGenerator {
        fn with(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: responses.into(),
                ..Default::default()
            }
        }
    }

    impl GenerationService for ScriptedGenerator {
        async fn send_request(&mut self, prompt: &str) -> Result<()> {
            self.prompts.push(prompt.to_string());
            self.pending = Some(self.responses.pop_front().unwrap_or_else(|| {
                Err(ContentFillError::Generation("no scripted response".into()))
            }));
            Ok(())
        }

        async fn get_response(&mut self) -> Result<String> {
            self.pending
                .take()
                .unwrap_or_else(|| Err(ContentFillError::Generation("nothing pending".into())))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect,
        Disconnect,
        Update(ContentId, RecordUpdate),
        InsertCategory(String),
    }

    #[derive(Default)]
    struct State {
        records: Vec<ContentRecord>,
        categories: Vec<Category>,
        calls: Vec<Call>,
        connected: bool,
        fail_connect: bool,
        fail_update_for: Option<ContentId>,
        decline_inserts: bool,
        fail_inserts: bool,
    }

    #[derive(Default)]
    struct FakeStore {
        state: Mutex<State>,
    }

    impl FakeStore {
        fn with_records(records: &[(Option<&str>, Option<&str>)]) -> Self {
            let store = Self::default();
            {
                let mut state = store.state.lock().unwrap();
                for (idx, (title, description)) in records.iter().enumerate() {
                    state.records.push(ContentRecord {
                        id: ContentId(idx as i64 + 1),
                        title: title.map(String::from),
                        description: description.map(String::from),
                        category_id: None,
                    });
                }
            }
            store
        }

        fn category(self, id: i64, title: &str) -> Self {
            self.state.lock().unwrap().categories.push(Category {
                id: CategoryId(id),
                title: title.into(),
            });
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn updates_for(&self, id: ContentId) -> Vec<RecordUpdate> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Update(target, update) if target == id => Some(update),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, id: ContentId) -> ContentRecord {
            let state = self.state.lock().unwrap();
            state.records.iter().find(|r| r.id == id).cloned().unwrap()
        }

        fn count(&self, wanted: &Call) -> usize {
            self.calls().iter().filter(|c| *c == wanted).count()
        }

        fn check_connected(state: &State) -> Result<()> {
            if state.connected {
                Ok(())
            } else {
                Err(ContentFillError::Storage("not connected".into()))
            }
        }
    }

    impl ContentStore for FakeStore {
        async fn connect(&mut self) -> Result<()> {
            let state = self.state.get_mut().unwrap();
            state.calls.push(Call::Connect);
            if state.fail_connect {
                return Err(ContentFillError::Storage("connection refused".into()));
            }
            state.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            let state = self.state.get_mut().unwrap();
            state.calls.push(Call::Disconnect);
            state.connected = false;
            Ok(())
        }

        async fn get_categories(&self) -> Result<Vec<Category>> {
            let state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            Ok(state.categories.clone())
        }

        async fn get_records_with_null_title(&self) -> Result<Vec<TitleCandidate>> {
            let state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            Ok(state
                .records
                .iter()
                .filter(|r| r.title.is_none())
                .map(|r| TitleCandidate {
                    id: r.id,
                    description: r.description.clone(),
                })
                .collect())
        }

        async fn get_records_with_invalid_title(&self) -> Result<Vec<TitleCandidate>> {
            let state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            Ok(state
                .records
                .iter()
                .filter(|r| r.title.as_deref().is_some_and(is_invalid_title))
                .map(|r| TitleCandidate {
                    id: r.id,
                    description: r.description.clone(),
                })
                .collect())
        }

        async fn get_records_without_description(&self) -> Result<Vec<DescriptionCandidate>> {
            let state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            Ok(state
                .records
                .iter()
                .filter(|r| r.description.as_deref().is_none_or(|d| d.trim().is_empty()))
                .filter_map(|r| match r.title.as_deref() {
                    Some(title) if !is_invalid_title(title) => Some(DescriptionCandidate {
                        id: r.id,
                        title: title.to_string(),
                    }),
                    _ => None,
                })
                .collect())
        }

        async fn update_record(&self, id: ContentId, update: &RecordUpdate) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            state.calls.push(Call::Update(id, update.clone()));
            if state.fail_update_for == Some(id) {
                return Err(ContentFillError::Storage("deadlock detected".into()));
            }
            let record = state
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ContentFillError::Storage(format!("content {id} not found")))?;
            if let Some(title) = &update.title {
                record.title = Some(title.clone());
            }
            if let Some(description) = &update.description {
                record.description = Some(description.clone());
            }
            if let Some(category_id) = update.category_id {
                record.category_id = Some(category_id);
            }
            Ok(())
        }

        async fn insert_category(&self, title: &str) -> Result<Option<CategoryId>> {
            let mut state = self.state.lock().unwrap();
            Self::check_connected(&state)?;
            state.calls.push(Call::InsertCategory(title.to_string()));
            if state.fail_inserts {
                return Err(ContentFillError::Storage("disk I/O error".into()));
            }
            if state.decline_inserts {
                return Ok(None);
            }
            let id = CategoryId(100 + state.categories.len() as i64);
            state.categories.push(Category {
                id,
                title: title.to_string(),
            });
            Ok(Some(id))
        }
    }

    // --- Helpers ------------------------------------------------------------

    fn ok(text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    fn answer(description: &str, category: &str) -> Result<String> {
        Ok(serde_json::json!({
            "Title": "ignored",
            "Description": description,
            "Category": category,
        })
        .to_string())
    }

    fn orchestrator(
        responses: Vec<Result<String>>,
        store: FakeStore,
    ) -> EnrichmentOrchestrator<ScriptedGenerator, FakeStore> {
        EnrichmentOrchestrator::new(
            ScriptedGenerator::with(responses),
            store,
            &EnrichmentSettings::default(),
        )
    }

    async fn run(o: &mut EnrichmentOrchestrator<ScriptedGenerator, FakeStore>) -> EnrichmentReport {
        o.run(&SilentEnrichmentProgress).await.expect("run succeeds")
    }

    // --- Title phases -------------------------------------------------------

    #[tokio::test]
    async fn null_title_without_description_gets_placeholder_once() {
        let mut o = orchestrator(vec![], FakeStore::with_records(&[(None, None)]));
        let report = run(&mut o).await;

        let updates = o.store().updates_for(ContentId(1));
        assert_eq!(updates, vec![RecordUpdate::title(DEFAULT_PLACEHOLDER_TITLE)]);
        assert_eq!(report.titles_defaulted, 1);
        // The description phase then asks for a description and gets nothing usable.
        assert_eq!(o.generator().prompts.len(), 1);
        assert!(o.generator().prompts[0].contains("Title: Untitled Content"));
        assert_eq!(report.records_skipped, 1);
    }

    #[tokio::test]
    async fn null_title_with_description_gets_generated_title() {
        let store = FakeStore::with_records(&[(None, Some("A deep dive into the borrow checker."))]);
        let mut o = orchestrator(
            vec![ok("  \"The Borrow Checker, Explained\"  "), answer("d", "Programming")],
            store,
        );
        let report = run(&mut o).await;

        let record = o.store().record(ContentId(1));
        assert_eq!(record.title.as_deref(), Some("The Borrow Checker, Explained"));
        assert_eq!(report.titles_generated, 1);
        assert!(o.generator().prompts[0].contains("Content: A deep dive into the borrow checker."));
    }

    #[tokio::test]
    async fn title_generation_failure_falls_back_to_placeholder() {
        let store = FakeStore::with_records(&[(None, Some("Body one")), (None, Some("Body two"))]);
        let mut o = orchestrator(
            vec![
                Err(ContentFillError::Generation("HTTP 503".into())),
                ok("   \n  "),
            ],
            store,
        );
        let report = run(&mut o).await;

        assert_eq!(report.titles_defaulted, 2);
        for id in [ContentId(1), ContentId(2)] {
            assert_eq!(
                o.store().updates_for(id)[0],
                RecordUpdate::title(DEFAULT_PLACEHOLDER_TITLE)
            );
        }
    }

    #[tokio::test]
    async fn long_generated_title_is_truncated() {
        let store = FakeStore::with_records(&[(None, Some("Body"))]);
        let mut o = orchestrator(vec![ok(&"word ".repeat(60))], store);
        run(&mut o).await;

        let title = o.store().record(ContentId(1)).title.unwrap();
        assert_eq!(title.chars().count(), 99);
        assert!(!title.ends_with(' '));

        let store = FakeStore::with_records(&[(None, Some("Body"))]);
        let mut o = orchestrator(vec![ok(&"x".repeat(250))], store);
        run(&mut o).await;
        assert_eq!(o.store().record(ContentId(1)).title.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn invalid_titles_use_same_generation_and_fallback() {
        let store = FakeStore::with_records(&[
            (Some("   "), Some("Notes about tokio runtimes")),
            (Some("N/A"), None),
            (Some("Good title"), Some("Already described")),
        ]);
        let mut o = orchestrator(vec![ok("Tokio Runtimes")], store);
        let report = run(&mut o).await;

        assert_eq!(o.store().record(ContentId(1)).title.as_deref(), Some("Tokio Runtimes"));
        assert_eq!(
            o.store().record(ContentId(2)).title.as_deref(),
            Some(DEFAULT_PLACEHOLDER_TITLE)
        );
        assert!(o.store().updates_for(ContentId(3)).is_empty());
        assert_eq!(report.titles_generated, 1);
        assert_eq!(report.titles_defaulted, 1);
    }

    // --- Description phase --------------------------------------------------

    #[tokio::test]
    async fn description_matches_existing_category() {
        let store = FakeStore::with_records(&[(Some("Election results"), None)]).category(1, "News");
        let mut o = orchestrator(vec![answer("Who won and why.", "news")], store);
        let report = run(&mut o).await;

        assert_eq!(
            o.store().updates_for(ContentId(1)),
            vec![RecordUpdate::description("Who won and why.", Some(CategoryId(1)))]
        );
        assert_eq!(report.categories_matched, 1);
        assert!(!o
            .store()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::InsertCategory(_))));
    }

    #[tokio::test]
    async fn approximate_category_match() {
        let store = FakeStore::with_records(&[(Some("New GPUs"), None)])
            .category(2, "Technology")
            .category(3, "Sports");
        let mut o = orchestrator(vec![answer("Faster chips.", "Tech")], store);
        run(&mut o).await;

        assert_eq!(o.store().record(ContentId(1)).category_id, Some(CategoryId(2)));
    }

    #[tokio::test]
    async fn unmatched_category_is_created_once_and_cached() {
        let store = FakeStore::with_records(&[(Some("Sourdough"), None), (Some("Focaccia"), None)])
            .category(1, "Technology");
        let mut o = orchestrator(
            vec![answer("Wild yeast bread.", "Baking"), answer("Olive oil bread.", "baking")],
            store,
        );
        let report = run(&mut o).await;

        let created = CategoryId(101);
        assert_eq!(o.store().count(&Call::InsertCategory("Baking".into())), 1);
        assert_eq!(o.store().record(ContentId(1)).category_id, Some(created));
        assert_eq!(o.store().record(ContentId(2)).category_id, Some(created));
        assert_eq!(report.categories_created, 1);
        assert_eq!(report.categories_matched, 1);
    }

    #[tokio::test]
    async fn declined_category_insert_writes_description_only() {
        let store = FakeStore::with_records(&[(Some("Sourdough"), None)]);
        store.state.lock().unwrap().decline_inserts = true;
        let mut o = orchestrator(vec![answer("Wild yeast bread.", "Baking")], store);
        let report = run(&mut o).await;

        assert_eq!(
            o.store().updates_for(ContentId(1)),
            vec![RecordUpdate::description("Wild yeast bread.", None)]
        );
        assert_eq!(report.category_fallbacks, 1);
        assert_eq!(report.descriptions_written, 1);
    }

    #[tokio::test]
    async fn category_insert_error_aborts_run() {
        let store = FakeStore::with_records(&[(Some("Sourdough"), None), (Some("Focaccia"), None)]);
        store.state.lock().unwrap().fail_inserts = true;
        let mut o = orchestrator(
            vec![answer("Wild yeast bread.", "Baking"), answer("Olive oil bread.", "Baking")],
            store,
        );

        let err = o.run(&SilentEnrichmentProgress).await.unwrap_err();
        assert!(err.to_string().contains("disk I/O error"));
        assert!(o.store().updates_for(ContentId(1)).is_empty());
        assert_eq!(o.generator().prompts.len(), 1);
        assert_eq!(o.store().count(&Call::Disconnect), 1);
    }

    #[tokio::test]
    async fn unparsable_description_leaves_record_untouched() {
        let store = FakeStore::with_records(&[(Some("First"), None), (Some("Second"), None)]);
        let mut o = orchestrator(
            vec![
                ok("Sorry, I can't produce JSON today."),
                answer("Second body.", "Misc"),
            ],
            store,
        );
        let report = run(&mut o).await;

        assert!(o.store().updates_for(ContentId(1)).is_empty());
        assert!(o.store().record(ContentId(1)).description.is_none());
        assert_eq!(
            o.store().record(ContentId(2)).description.as_deref(),
            Some("Second body.")
        );
        assert_eq!(report.records_skipped, 1);
    }

    #[tokio::test]
    async fn incomplete_object_is_skipped() {
        let store = FakeStore::with_records(&[(Some("First"), None)]);
        let mut o = orchestrator(
            vec![ok(r#"{"Title": "First", "Description": "Body", "Category": ""}"#)],
            store,
        );
        run(&mut o).await;
        assert!(o.store().updates_for(ContentId(1)).is_empty());
    }

    #[tokio::test]
    async fn records_are_processed_in_store_order() {
        let store = FakeStore::with_records(&[
            (Some("Alpha"), None),
            (Some("Beta"), None),
            (Some("Gamma"), None),
        ]);
        let mut o = orchestrator(vec![], store);
        run(&mut o).await;

        let titles: Vec<_> = o
            .generator()
            .prompts
            .iter()
            .map(|p| p.lines().find(|l| l.starts_with("Title: ")).unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Title: Alpha", "Title: Beta", "Title: Gamma"]);
    }

    // --- Lifecycle ----------------------------------------------------------

    #[tokio::test]
    async fn connection_opened_and_closed_once() {
        let store = FakeStore::with_records(&[(Some("Alpha"), Some("Done"))]);
        let mut o = orchestrator(vec![], store);
        run(&mut o).await;

        let calls = o.store().calls();
        assert_eq!(calls.first(), Some(&Call::Connect));
        assert_eq!(calls.last(), Some(&Call::Disconnect));
        assert_eq!(o.store().count(&Call::Connect), 1);
        assert_eq!(o.store().count(&Call::Disconnect), 1);
    }

    #[tokio::test]
    async fn store_failure_propagates_after_single_close() {
        let store = FakeStore::with_records(&[
            (None, None),
            (None, None),
            (Some("Needs text"), None),
        ]);
        store.state.lock().unwrap().fail_update_for = Some(ContentId(1));
        let mut o = orchestrator(vec![answer("never used", "x")], store);

        let err = o.run(&SilentEnrichmentProgress).await.unwrap_err();
        assert!(err.to_string().contains("deadlock detected"));

        assert_eq!(o.store().count(&Call::Disconnect), 1);
        assert_eq!(o.store().calls().last(), Some(&Call::Disconnect));
        // Remaining records and phases were abandoned.
        assert!(o.store().updates_for(ContentId(2)).is_empty());
        assert!(o.generator().prompts.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_skips_disconnect() {
        let store = FakeStore::with_records(&[(None, None)]);
        store.state.lock().unwrap().fail_connect = true;
        let mut o = orchestrator(vec![], store);

        let err = o.run(&SilentEnrichmentProgress).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(o.store().calls(), vec![Call::Connect]);
    }

    #[tokio::test]
    async fn second_run_is_noop_for_enriched_records() {
        let store = FakeStore::with_records(&[(None, Some("Body"))]);
        let mut o = orchestrator(
            vec![ok("Generated"), answer("Ignored since description exists", "x")],
            store,
        );
        let first = run(&mut o).await;
        assert_eq!(first.titles_generated, 1);
        assert_eq!(first.records_updated(), 1);

        let second = run(&mut o).await;
        assert_eq!(second.records_updated(), 0);
        assert_eq!(o.generator().prompts.len(), 1);
        assert_eq!(o.store().count(&Call::Connect), 2);
        assert_eq!(o.store().count(&Call::Disconnect), 2);
    }

    #[tokio::test]
    async fn category_cache_is_rebuilt_each_run() {
        let store = FakeStore::with_records(&[
            (Some("Match day"), None),
            (Some("Transfer window"), None),
        ]);
        let mut o = orchestrator(
            vec![
                answer("Recap.", "Sports"),
                Err(ContentFillError::Generation("HTTP 503".into())),
                answer("Rumours.", "sports"),
            ],
            store,
        );

        run(&mut o).await;
        let created = o.store().record(ContentId(1)).category_id.expect("created");
        assert!(o.store().record(ContentId(2)).category_id.is_none());

        // Recreated outside the run under a new id.
        o.store().state.lock().unwrap().categories = vec![Category {
            id: CategoryId(7),
            title: "Sports".into(),
        }];

        let report = run(&mut o).await;
        assert_eq!(o.store().record(ContentId(2)).category_id, Some(CategoryId(7)));
        assert_ne!(created, CategoryId(7));
        assert_eq!(report.categories_matched, 1);
        assert_eq!(report.categories_created, 0);
        assert_eq!(o.store().count(&Call::InsertCategory("sports".into())), 0);
    }

    #[tokio::test]
    async fn placeholder_token_title_falls_back_once() {
        let store = FakeStore::with_records(&[(None, Some("Body"))]);
        let mut o = orchestrator(vec![ok("N/A"), ok("Untitled")], store);
        let report = run(&mut o).await;

        assert_eq!(
            o.store().updates_for(ContentId(1)),
            vec![RecordUpdate::title(DEFAULT_PLACEHOLDER_TITLE)]
        );
        assert_eq!(report.titles_generated, 0);
        assert_eq!(report.titles_defaulted, 1);
        assert_eq!(o.generator().prompts.len(), 1);
        assert!(o.generator().prompts[0].contains("Content: Body"));
        assert!(o.store().record(ContentId(1)).title.is_some_and(|t| !is_invalid_title(&t)));
    }
}
