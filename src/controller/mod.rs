//! Client-side application state.
//!
//! [`MapController`] owns the working set, the camera, the session and the
//! selection. Mutations are checked and applied locally first, then queued as
//! commands; [`MapController::flush`] pushes them to the store in order.

mod cache;
mod command;

pub use cache::PoiCache;
pub use command::*;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ViewSettings;
use crate::errors::{AppError, DenyReason};
use crate::geometry::{
    clamp_pan, fit_view, focus_on, reset_view, screen_to_map, zoom_camera, Camera, DragAnchor,
    Placed, Point, Size,
};
use crate::models::{Actor, Coord, NewPoi, Poi, PoiChanges, Session, SessionId};
use crate::reconcile::policy::{authorize, Action, Transition};
use crate::reconcile::{cycle_selection, WorkingSet};
use crate::store::{load_working_set, ApprovalOutcome, PoiStore};

/// Screen pixels from the container edge inside which selecting a pin
/// recentres the view.
const FOCUS_MARGIN: f64 = 100.0;

pub struct MapController {
    store: Arc<dyn PoiStore>,
    view: ViewSettings,
    working: WorkingSet,
    camera: Camera,
    container: Size,
    session: SessionId,
    elevated: bool,
    selected: Option<String>,
    drag: Option<DragAnchor>,
    pending: VecDeque<Command>,
    next_command: u64,
    cache_path: Option<PathBuf>,
    last_sync: Option<DateTime<Utc>>,
}

impl MapController {
    /// Controller with an empty working set and the view reset to the
    /// default zoom. Call [`MapController::refresh`] to load POIs.
    pub fn new(
        store: Arc<dyn PoiStore>,
        view: ViewSettings,
        session: SessionId,
        elevated: bool,
        container: Size,
    ) -> Result<Self, AppError> {
        let container = container.validate()?;
        let camera = reset_view(container, view.frame.size(), view.default_zoom)?;
        store.set_session(session.clone());

        Ok(Self {
            store,
            view,
            working: WorkingSet::default(),
            camera,
            container,
            session,
            elevated,
            selected: None,
            drag: None,
            pending: VecDeque::new(),
            next_command: 1,
            cache_path: None,
            last_sync: None,
        })
    }

    /// Keep a snapshot of the working set at `path`, shown when the store
    /// cannot be reached on startup.
    pub fn with_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// When the store last answered a full fetch.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn actor(&self) -> Actor {
        Actor::new(Some(self.session.clone()), self.elevated)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    pub fn get(&self, id: &str) -> Option<&Poi> {
        self.working.get(id)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }

    pub fn needs_resync(&self, id: &str) -> bool {
        self.working.needs_resync(id)
    }

    /// Start a new session. Drafts created under the old one become
    /// read-only for this client.
    pub async fn renew_session(&mut self, path: &Path) -> Result<&SessionId, AppError> {
        let session = Session::renew(path).await?;
        self.store.set_session(session.session_id.clone());
        self.session = session.session_id;
        Ok(&self.session)
    }

    /// Rebuild the working set from a fresh fetch.
    ///
    /// The type filter is re-applied and still-queued commands replayed on
    /// top. On failure the current set is left as it was, except that an
    /// empty set is filled from the cache.
    pub async fn refresh(&mut self) -> Result<usize, AppError> {
        let fresh = match load_working_set(self.store.as_ref()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!("Refresh failed, keeping local state: {}", e);
                if self.working.is_empty() {
                    self.restore_cache().await;
                }
                return Err(if matches!(e, AppError::StoreUnavailable(_)) {
                    e
                } else {
                    AppError::StoreUnavailable(e.message())
                });
            }
        };

        self.replace_working(fresh);
        self.last_sync = Some(Utc::now());
        self.save_cache().await;

        tracing::info!(
            "Loaded {} POIs ({} commands pending)",
            self.working.len(),
            self.pending.len()
        );
        Ok(self.working.len())
    }

    fn replace_working(&mut self, mut fresh: WorkingSet) {
        fresh.apply_type_filter(self.working.type_filter().clone());
        for command in &self.pending {
            apply_local(&mut fresh, &command.kind);
        }

        if self.selected.as_deref().is_some_and(|id| !fresh.contains(id)) {
            self.selected = None;
        }
        self.working = fresh;
    }

    async fn restore_cache(&mut self) {
        let Some(path) = self.cache_path.clone() else {
            return;
        };
        match PoiCache::load(&path).await {
            Ok(Some(cache)) => {
                tracing::info!("Showing {} cached POIs from {:?}", cache.pois.len(), path);
                self.last_sync = cache.last_sync_time;
                self.replace_working(cache.pois.into_iter().collect());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }

    async fn save_cache(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let cache = PoiCache::new(self.working.snapshot(), self.last_sync);
        if let Err(e) = cache.save(path).await {
            tracing::warn!("{}", e);
        }
    }

    /// Create a draft owned by this session.
    pub fn create(&mut self, new: NewPoi) -> Result<Queued, AppError> {
        let kind = self.view.categories.normalize(&new.kind)?;
        let poi = Poi::draft(
            NewPoi {
                kind,
                description: new.description.trim().to_string(),
                ..new
            },
            Some(self.session.clone()),
            Utc::now(),
        );
        let poi_id = poi.id.clone();

        place(&mut self.working, poi.clone());
        self.selected = Some(poi_id.clone());
        let command = self.enqueue(CommandKind::Create(poi));

        Ok(Queued { command, poi_id })
    }

    /// Create a draft at the logical position under a screen point.
    pub fn create_at_screen(
        &mut self,
        screen: Point,
        kind: &str,
        description: &str,
    ) -> Result<Queued, AppError> {
        let (x, y) = self.cursor_readout(screen);
        self.create(NewPoi {
            kind: kind.to_string(),
            description: description.to_string(),
            x,
            y,
        })
    }

    pub fn edit(&mut self, id: &str, changes: PoiChanges) -> Result<Queued, AppError> {
        let existing = self.working.get(id).ok_or_else(|| not_found(id))?;
        authorize(&self.actor(), existing, Action::Edit)
            .map_err(|reason| self.deny(Action::Edit, id, reason))?;

        let changes = PoiChanges {
            kind: changes
                .kind
                .map(|kind| self.view.categories.normalize(&kind))
                .transpose()?,
            description: changes.description,
        };
        let edited = changes.applied_to(existing, Utc::now());
        let kind = if existing.approved {
            CommandKind::Amend(edited.clone())
        } else {
            CommandKind::Update(edited.clone())
        };

        self.working.insert(edited);
        let command = self.enqueue(kind);
        Ok(Queued {
            command,
            poi_id: id.to_string(),
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<Queued, AppError> {
        let existing = self.working.get(id).ok_or_else(|| not_found(id))?;
        authorize(&self.actor(), existing, Action::Delete)
            .map_err(|reason| self.deny(Action::Delete, id, reason))?;

        self.working.remove(id);
        self.working.clear_stale(id);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }

        let command = self.enqueue(CommandKind::Delete { id: id.to_string() });
        Ok(Queued {
            command,
            poi_id: id.to_string(),
        })
    }

    pub fn approve(&mut self, id: &str) -> Result<Approval, AppError> {
        let actor = self.actor();
        if !actor.elevated {
            return Err(self.deny(Action::Approve, id, DenyReason::NotElevated));
        }

        let existing = self.working.get(id).ok_or_else(|| not_found(id))?;
        let transition = authorize(&actor, existing, Action::Approve)
            .map_err(|reason| self.deny(Action::Approve, id, reason))?;

        match transition {
            Transition::AlreadyApproved => {
                tracing::info!("POI {} is already approved", id);
                Ok(Approval::AlreadyApproved)
            }
            Transition::Apply => {
                let mut approved = existing.clone();
                approved.approved = true;
                self.working.insert(approved.clone());
                let command = self.enqueue(CommandKind::Approve(approved));
                Ok(Approval::Queued(Queued {
                    command,
                    poi_id: id.to_string(),
                }))
            }
        }
    }

    /// Push every queued command, oldest first.
    pub async fn flush(&mut self) -> Vec<CommandReport> {
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some(command) = self.pending.pop_front() {
            let notice = self.push(&command).await;
            reports.push(CommandReport {
                command: command.id,
                poi_id: command.poi_id().to_string(),
                notice,
            });
        }
        if !reports.is_empty() {
            self.save_cache().await;
        }
        reports
    }

    async fn push(&mut self, command: &Command) -> Notice {
        let id = command.poi_id().to_string();
        let store = Arc::clone(&self.store);

        let outcome = match &command.kind {
            CommandKind::Create(poi) => store.submit_create(poi.clone()).await.map(|snapshot| {
                self.settle(&id, &snapshot.pois, false);
                snapshot.message
            }),
            CommandKind::Update(poi) => store.submit_update(poi.clone()).await.map(|snapshot| {
                self.settle(&id, &snapshot.pois, false);
                snapshot.message
            }),
            CommandKind::Amend(poi) => store.amend_approved(poi.clone()).await.map(|snapshot| {
                self.settle(&id, &snapshot.pois, true);
                snapshot.message
            }),
            CommandKind::Delete { id } => store.submit_delete(id).await.map(|snapshot| {
                self.working.clear_stale(id);
                snapshot.message
            }),
            CommandKind::Approve(poi) => store.submit_approve(poi.clone()).await.map(|snapshot| {
                self.settle(&id, &snapshot.approved, true);
                match snapshot.outcome {
                    ApprovalOutcome::Approved => "POI approved successfully".to_string(),
                    ApprovalOutcome::AlreadyApproved => "POI was already approved".to_string(),
                }
            }),
        };

        match outcome {
            Ok(message) => {
                tracing::info!("{} {} of POI {}: {}", command.label(), command.id, id, message);
                Notice::Success(message)
            }
            Err(AppError::StoreUnavailable(message)) => {
                tracing::warn!("{} of POI {} saved locally only: {}", command.label(), id, message);
                self.working.mark_stale(&id);
                Notice::LocalOnly(message)
            }
            Err(err) => {
                tracing::warn!("{} of POI {} rejected by store: {}", command.label(), id, err);
                self.working.mark_stale(&id);
                Notice::Failure(err.message())
            }
        }
    }

    /// Apply the store's copy of `id`, unless the local record has since
    /// gone, changed approval state, or has another write queued.
    fn settle(&mut self, id: &str, server: &[Poi], approved: bool) {
        self.working.clear_stale(id);

        if self.pending.iter().any(|c| c.poi_id() == id) {
            return;
        }
        let Some(remote) = server.iter().find(|p| p.id == id) else {
            return;
        };

        match self.working.get_mut(id) {
            Some(local) if local.approved == approved => {
                *local = Poi {
                    approved,
                    visible: local.visible,
                    ..remote.clone()
                };
            }
            Some(_) => tracing::debug!("POI {} changed state while in flight; keeping local copy", id),
            None => tracing::debug!("POI {} was removed while in flight", id),
        }
    }

    fn enqueue(&mut self, kind: CommandKind) -> CommandId {
        let id = CommandId(self.next_command);
        self.next_command += 1;

        let command = Command {
            id,
            kind,
            queued_at: Utc::now(),
        };
        tracing::debug!("Queued {} {} for POI {}", command.label(), id, command.poi_id());
        self.pending.push_back(command);
        id
    }

    fn deny(&self, action: Action, id: &str, reason: DenyReason) -> AppError {
        tracing::warn!("Cannot {} POI {}: {}", action.as_str(), id, reason.as_str());
        AppError::PermissionDenied(reason)
    }

    // Camera

    pub fn resize(&mut self, container: Size) -> Result<(), AppError> {
        let container = container.validate()?;
        let pan = clamp_pan(
            self.camera.pan(),
            self.camera.zoom(),
            container,
            self.view.frame.size(),
        )?;
        self.container = container;
        self.camera = self.camera.with_pan(pan);
        Ok(())
    }

    /// Zoom around `cursor`, or the container centre when there is none.
    pub fn zoom_by(&mut self, delta: f64, cursor: Option<Point>) -> Result<f64, AppError> {
        let anchor = match cursor {
            Some(cursor) => cursor,
            None => self.container.center()?,
        };
        let zoomed = zoom_camera(&self.camera, delta, self.view.zoom_bounds, Some(anchor));
        let pan = clamp_pan(
            zoomed.pan(),
            zoomed.zoom(),
            self.container,
            self.view.frame.size(),
        )?;
        self.camera = zoomed.with_pan(pan);
        Ok(self.camera.zoom())
    }

    pub fn reset_view(&mut self) -> Result<(), AppError> {
        self.camera = reset_view(self.container, self.view.frame.size(), self.view.default_zoom)?;
        Ok(())
    }

    pub fn fit_view(&mut self) -> Result<(), AppError> {
        self.camera = fit_view(self.container, self.view.frame.size(), self.view.zoom_bounds)?;
        Ok(())
    }

    pub fn begin_drag(&mut self, cursor: Point) {
        self.drag = Some(DragAnchor::begin(cursor, &self.camera));
    }

    pub fn drag_to(&mut self, cursor: Point) -> Result<(), AppError> {
        let Some(anchor) = self.drag else {
            return Ok(());
        };
        let zoom = self.camera.zoom();
        let pan = clamp_pan(
            anchor.pan_for(cursor, zoom),
            zoom,
            self.container,
            self.view.frame.size(),
        )?;
        self.camera = self.camera.with_pan(pan);
        Ok(())
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Select a POI, recentring when its pin sits near the container edge.
    pub fn select(&mut self, id: &str) -> Result<(), AppError> {
        let poi = self.working.get(id).ok_or_else(|| not_found(id))?;
        let target = self.view.frame.logical_to_map(poi.logical_position());

        let focused = focus_on(&self.camera, target, self.container, FOCUS_MARGIN)?;
        let pan = clamp_pan(
            focused.pan(),
            focused.zoom(),
            self.container,
            self.view.frame.size(),
        )?;
        self.camera = focused.with_pan(pan);
        self.selected = Some(id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Select the next visible pin stacked under `screen`. Clicking empty map
    /// clears the selection.
    pub fn pick(&mut self, screen: Point) -> Option<&str> {
        let stack = self.working.overlapping(
            screen,
            &self.camera,
            &self.view.frame,
            self.view.overlap_threshold,
        );
        self.selected = cycle_selection(&stack, self.selected.as_deref());
        self.selected.as_deref()
    }

    /// Logical coordinates under a screen point.
    pub fn cursor_readout(&self, screen: Point) -> (Coord, Coord) {
        let map = screen_to_map(screen, &self.camera);
        let logical = self.view.frame.map_to_logical(map);
        (Coord::from_logical(logical.x), Coord::from_logical(logical.y))
    }

    /// Draw order with the selected pin last.
    pub fn render_order(&self) -> Vec<&Poi> {
        self.working.render_order(self.selected.as_deref())
    }

    // Visibility

    pub fn set_group_visible(&mut self, kind: &str, visible: bool) -> usize {
        self.working.set_group_visible(kind, visible)
    }

    pub fn set_only_visible(&mut self, kind: &str) -> usize {
        self.working.set_only_visible(kind)
    }

    pub fn toggle_visible(&mut self, id: &str) -> Option<bool> {
        self.working.toggle_visible(id)
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("POI {} not found", id))
}

/// Insert with visibility following the type filter.
fn place(set: &mut WorkingSet, mut poi: Poi) {
    poi.visible = set.type_filter().shows(&poi.kind);
    set.insert(poi);
}

fn apply_local(set: &mut WorkingSet, kind: &CommandKind) {
    match kind {
        CommandKind::Create(poi) | CommandKind::Update(poi) | CommandKind::Amend(poi) => {
            place(set, poi.clone())
        }
        CommandKind::Delete { id } => {
            set.remove(id);
        }
        CommandKind::Approve(poi) => {
            if let Some(existing) = set.get_mut(&poi.id) {
                existing.approved = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::project;
    use crate::store::{ApprovalSnapshot, MemoryStore, StoreInfo, StoreSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// In-memory store that can be switched offline.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        offline: AtomicBool,
    }

    impl FlakyStore {
        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), AppError> {
            if self.offline.load(Ordering::SeqCst) {
                Err(AppError::StoreUnavailable("store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PoiStore for FlakyStore {
        async fn fetch_approved(&self) -> Result<Vec<Poi>, AppError> {
            self.check()?;
            self.inner.fetch_approved().await
        }

        async fn fetch_draft(&self) -> Result<Vec<Poi>, AppError> {
            self.check()?;
            self.inner.fetch_draft().await
        }

        async fn submit_create(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
            self.check()?;
            self.inner.submit_create(poi).await
        }

        async fn submit_update(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
            self.check()?;
            self.inner.submit_update(poi).await
        }

        async fn submit_delete(&self, id: &str) -> Result<StoreSnapshot, AppError> {
            self.check()?;
            self.inner.submit_delete(id).await
        }

        async fn submit_approve(&self, poi: Poi) -> Result<ApprovalSnapshot, AppError> {
            self.check()?;
            self.inner.submit_approve(poi).await
        }

        async fn amend_approved(&self, poi: Poi) -> Result<StoreSnapshot, AppError> {
            self.check()?;
            self.inner.amend_approved(poi).await
        }

        async fn inspect(&self) -> Result<StoreInfo, AppError> {
            self.inner.inspect().await
        }
    }

    fn container() -> Size {
        Size::new(1000.0, 700.0)
    }

    fn controller(store: Arc<dyn PoiStore>, session: &str, elevated: bool) -> MapController {
        MapController::new(
            store,
            ViewSettings::default(),
            SessionId::new(session),
            elevated,
            container(),
        )
        .unwrap()
    }

    fn new_poi(kind: &str, x: i32, y: i32) -> NewPoi {
        NewPoi {
            kind: kind.to_string(),
            description: String::new(),
            x: Coord::new(x),
            y: Coord::new(y),
        }
    }

    fn all_succeeded(reports: &[CommandReport]) -> bool {
        reports.iter().all(|r| r.notice.is_success())
    }

    #[tokio::test]
    async fn test_end_to_end_ownership_and_approval() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut s1 = controller(store.clone(), "S1", false);
        let mut s2 = controller(store.clone(), "S2", false);
        let mut admin = controller(store.clone(), "admin", true);

        let first = s1.create(new_poi("npc", 100, -50)).unwrap();
        let survivor = s1.create(new_poi("boss", 10, 10)).unwrap();
        assert!(all_succeeded(&s1.flush().await));

        s2.refresh().await.unwrap();
        let before = s2.get(&first.poi_id).cloned();
        let err = s2.delete(&first.poi_id).unwrap_err();
        assert_eq!(err, AppError::PermissionDenied(DenyReason::NotOwner));
        assert_eq!(s2.get(&first.poi_id).cloned(), before);
        assert_eq!(s2.pending().count(), 0);

        s1.delete(&first.poi_id).unwrap();
        assert!(all_succeeded(&s1.flush().await));
        assert!(s1.get(&first.poi_id).is_none());

        admin.refresh().await.unwrap();
        assert!(admin.get(&first.poi_id).is_none());
        assert!(matches!(admin.approve(&survivor.poi_id).unwrap(), Approval::Queued(_)));
        assert!(all_succeeded(&admin.flush().await));
        assert!(admin.get(&survivor.poi_id).unwrap().approved);

        s1.refresh().await.unwrap();
        assert!(s1.get(&survivor.poi_id).unwrap().approved);
        let err = s1.delete(&survivor.poi_id).unwrap_err();
        assert_eq!(err, AppError::PermissionDenied(DenyReason::ApprovedImmutable));
    }

    #[tokio::test]
    async fn test_offline_write_stays_local_and_flags_resync() {
        let flaky = Arc::new(FlakyStore::default());
        let store: Arc<dyn PoiStore> = flaky.clone();
        let mut ctl = controller(store, "S1", false);

        flaky.set_offline(true);
        let queued = ctl.create(new_poi("shelter", 1, 2)).unwrap();
        let reports = ctl.flush().await;

        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].notice, Notice::LocalOnly(_)));
        assert!(ctl.get(&queued.poi_id).is_some());
        assert!(ctl.needs_resync(&queued.poi_id));

        let err = ctl.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(ctl.get(&queued.poi_id).is_some());

        flaky.set_offline(false);
        ctl.refresh().await.unwrap();
        assert!(ctl.get(&queued.poi_id).is_none());
        assert!(!ctl.needs_resync(&queued.poi_id));
    }

    #[tokio::test]
    async fn test_store_rejection_is_a_failure_notice() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut owner = controller(store.clone(), "S1", false);
        let mut admin = controller(store.clone(), "admin", true);

        let queued = owner.create(new_poi("npc", 0, 0)).unwrap();
        owner.flush().await;
        admin.refresh().await.unwrap();

        owner.delete(&queued.poi_id).unwrap();
        owner.flush().await;

        admin.delete(&queued.poi_id).unwrap();
        let reports = admin.flush().await;
        assert!(matches!(reports[0].notice, Notice::Failure(_)));
        assert!(admin.needs_resync(&queued.poi_id));
    }

    #[tokio::test]
    async fn test_refresh_replays_pending_and_keeps_type_filter() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);

        let saved = ctl.create(new_poi("npc", 0, 0)).unwrap();
        ctl.flush().await;
        ctl.set_group_visible("npc", false);
        let unsaved = ctl.create(new_poi("npc", 5, 5)).unwrap();

        ctl.refresh().await.unwrap();

        assert_eq!(ctl.working_set().len(), 2);
        assert!(!ctl.get(&saved.poi_id).unwrap().visible);
        assert!(!ctl.get(&unsaved.poi_id).unwrap().visible);
        assert_eq!(ctl.pending().count(), 1);
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_and_requires_elevation() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut owner = controller(store.clone(), "S1", false);
        let mut admin = controller(store.clone(), "admin", true);

        let queued = owner.create(new_poi("dungeon", 3, 4)).unwrap();
        owner.flush().await;
        assert_eq!(
            owner.approve(&queued.poi_id).unwrap_err(),
            AppError::PermissionDenied(DenyReason::NotElevated)
        );

        admin.refresh().await.unwrap();
        assert!(matches!(admin.approve(&queued.poi_id).unwrap(), Approval::Queued(_)));
        assert_eq!(admin.approve(&queued.poi_id).unwrap(), Approval::AlreadyApproved);
        assert!(all_succeeded(&admin.flush().await));

        admin.refresh().await.unwrap();
        assert_eq!(admin.approve(&queued.poi_id).unwrap(), Approval::AlreadyApproved);
        assert_eq!(admin.working_set().len(), 1);
        assert_eq!(store.fetch_approved().await.unwrap().len(), 1);
        assert!(store.fetch_draft().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_rules() {
        let mut approved = Poi::draft(new_poi("landmark", 0, 0), Some(SessionId::new("S1")), Utc::now());
        approved.approved = true;
        let approved_id = approved.id.clone();
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::with_pois(vec![approved], vec![]));

        let mut owner = controller(store.clone(), "S1", false);
        let mut other = controller(store.clone(), "S2", false);
        let mut admin = controller(store.clone(), "admin", true);
        owner.refresh().await.unwrap();

        let draft = owner.create(new_poi("npc", 7, 8)).unwrap();
        owner.flush().await;
        other.refresh().await.unwrap();
        admin.refresh().await.unwrap();

        let changes = PoiChanges {
            kind: Some(" Boss ".to_string()),
            description: Some("renamed".to_string()),
        };
        assert_eq!(
            other.edit(&draft.poi_id, changes.clone()).unwrap_err(),
            AppError::PermissionDenied(DenyReason::NotOwner)
        );
        assert_eq!(
            owner.edit(&approved_id, changes.clone()).unwrap_err(),
            AppError::PermissionDenied(DenyReason::AlreadyApproved)
        );

        owner.edit(&draft.poi_id, changes.clone()).unwrap();
        let edited = owner.get(&draft.poi_id).unwrap();
        assert_eq!(edited.kind, "boss");
        assert_eq!(edited.description, "renamed");
        assert_eq!((edited.x, edited.y), (Coord::new(7), Coord::new(8)));
        assert!(all_succeeded(&owner.flush().await));

        admin.edit(&approved_id, changes).unwrap();
        assert!(matches!(admin.pending().next().unwrap().kind, CommandKind::Amend(_)));
        assert!(all_succeeded(&admin.flush().await));
        let stored = store.fetch_approved().await.unwrap();
        assert_eq!(stored[0].description, "renamed");

        let bad_kind = PoiChanges {
            kind: Some("dragon".to_string()),
            description: None,
        };
        assert!(matches!(owner.edit(&draft.poi_id, bad_kind), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_at_screen_uses_logical_coordinates() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);

        // zoom 0.5, pan (0, -15): map (200, 215) sits at the logical x origin
        let screen = Point::new(100.0, 100.0);
        assert_eq!(ctl.cursor_readout(screen), (Coord::new(0), Coord::new(1523)));

        let queued = ctl.create_at_screen(screen, "Resource", "ore").unwrap();
        let poi = ctl.get(&queued.poi_id).unwrap();
        assert_eq!(poi.x.to_string(), "+0000");
        assert_eq!(poi.y.to_string(), "+1523");
        assert_eq!(poi.kind, "resource");
        assert_eq!(poi.session_id, Some(SessionId::new("S1")));
        assert_eq!(ctl.selected(), Some(queued.poi_id.as_str()));

        assert!(matches!(
            ctl.create_at_screen(screen, "dragon", ""),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_zoom_is_clamped() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);

        assert_eq!(ctl.zoom_by(100.0, None).unwrap(), 4.0);
        assert_eq!(ctl.zoom_by(-100.0, Some(Point::new(10.0, 10.0))).unwrap(), 0.2);

        ctl.reset_view().unwrap();
        assert_eq!(ctl.camera().zoom(), 0.5);
        assert!(ctl.resize(Size::new(0.0, 700.0)).is_err());
    }

    #[tokio::test]
    async fn test_drag_pans_within_map() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);
        ctl.zoom_by(1.5, None).unwrap();
        let start = ctl.camera().pan();

        ctl.begin_drag(Point::new(500.0, 350.0));
        ctl.drag_to(Point::new(480.0, 340.0)).unwrap();
        ctl.end_drag();

        let pan = ctl.camera().pan();
        assert!((pan.x - (start.x - 10.0)).abs() < 1e-9);
        assert!((pan.y - (start.y - 5.0)).abs() < 1e-9);

        ctl.drag_to(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(ctl.camera().pan(), pan);
    }

    #[tokio::test]
    async fn test_pick_cycles_through_stacked_pins() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);
        let a = ctl.create(new_poi("npc", 40, 40)).unwrap().poi_id;
        let b = ctl.create(new_poi("boss", 41, 40)).unwrap().poi_id;

        let frame = ViewSettings::default().frame;
        let at = project(ctl.get(&a).unwrap(), ctl.camera(), &frame);

        let first = ctl.pick(at).map(str::to_string).unwrap();
        let second = ctl.pick(at).map(str::to_string).unwrap();
        let third = ctl.pick(at).map(str::to_string).unwrap();

        assert_ne!(first, second);
        assert_eq!(first, third);
        let mut picked = vec![first, second];
        picked.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(picked, expected);

        assert_eq!(ctl.pick(Point::new(-500.0, -500.0)), None);
        assert_eq!(ctl.selected(), None);
    }

    #[tokio::test]
    async fn test_select_recentres_near_edge() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);
        ctl.zoom_by(1.5, None).unwrap();

        let queued = ctl.create(new_poi("secret", 0, 0)).unwrap();
        let frame = ViewSettings::default().frame;
        let before = project(ctl.get(&queued.poi_id).unwrap(), ctl.camera(), &frame);
        assert!(before.x < FOCUS_MARGIN || before.y > 700.0 - FOCUS_MARGIN);

        ctl.select(&queued.poi_id).unwrap();
        let after = project(ctl.get(&queued.poi_id).unwrap(), ctl.camera(), &frame);
        assert!(after.x >= FOCUS_MARGIN && after.y <= 700.0 - FOCUS_MARGIN);
        assert_eq!(ctl.selected(), Some(queued.poi_id.as_str()));
        assert!(matches!(ctl.select("missing"), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_renew_session_forfeits_ownership() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);

        let queued = ctl.create(new_poi("fragment", 0, 0)).unwrap();
        ctl.flush().await;

        let renewed = ctl.renew_session(&dir.path().join("session.json")).await.unwrap().clone();
        assert_ne!(renewed, SessionId::new("S1"));
        assert_eq!(
            ctl.delete(&queued.poi_id).unwrap_err(),
            AppError::PermissionDenied(DenyReason::NotOwner)
        );
    }

    #[tokio::test]
    async fn test_only_visible_hides_later_types() {
        let store: Arc<dyn PoiStore> = Arc::new(MemoryStore::default());
        let mut ctl = controller(store, "S1", false);

        ctl.create(new_poi("npc", 0, 0)).unwrap();
        ctl.create(new_poi("boss", 1, 1)).unwrap();
        ctl.set_only_visible("npc");

        let later = ctl.create(new_poi("secret", 2, 2)).unwrap();
        assert!(!ctl.get(&later.poi_id).unwrap().visible);

        ctl.flush().await;
        ctl.refresh().await.unwrap();
        assert!(!ctl.get(&later.poi_id).unwrap().visible);
        assert_eq!(ctl.working_set().visible().count(), 1);
    }

    #[tokio::test]
    async fn test_cache_shown_when_store_unreachable_at_startup() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("pois-cache.json");
        let store = Arc::new(FlakyStore::default());

        let mut online = controller(store.clone(), "S1", false).with_cache(&cache);
        let queued = online.create(new_poi("shelter", 10, 20)).unwrap();
        online.flush().await;
        online.refresh().await.unwrap();
        assert!(online.last_sync().is_some());

        store.set_offline(true);
        let mut offline = controller(store.clone(), "S1", false).with_cache(&cache);
        let err = offline.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));

        assert_eq!(offline.working_set().len(), 1);
        assert_eq!(offline.get(&queued.poi_id).unwrap().kind, "shelter");
        assert_eq!(offline.last_sync(), online.last_sync());
    }

    #[tokio::test]
    async fn test_local_only_changes_survive_restart() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("pois-cache.json");
        let store = Arc::new(FlakyStore::default());
        store.set_offline(true);

        let mut first = controller(store.clone(), "S1", false).with_cache(&cache);
        let queued = first.create(new_poi("landmark", 3, 4)).unwrap();
        let reports = first.flush().await;
        assert!(matches!(reports[0].notice, Notice::LocalOnly(_)));

        let mut second = controller(store.clone(), "S1", false).with_cache(&cache);
        assert!(second.refresh().await.is_err());
        assert!(second.get(&queued.poi_id).is_some());
        assert_eq!(second.last_sync(), None);
    }

    #[tokio::test]
    async fn test_cache_not_used_over_existing_state() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("pois-cache.json");
        PoiCache::new(Vec::new(), None).save(&cache).await.unwrap();
        let store = Arc::new(FlakyStore::default());

        let mut ctl = controller(store.clone(), "S1", false).with_cache(&cache);
        let queued = ctl.create(new_poi("npc", 0, 0)).unwrap();
        store.set_offline(true);

        assert!(ctl.refresh().await.is_err());
        assert!(ctl.get(&queued.poi_id).is_some());
    }
}
