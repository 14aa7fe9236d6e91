//! Cache-first orchestration of attendance fetches for one
//! (user, institution, session) key.
//!
//! Cached data is published before any network work. A stale cache triggers a
//! silent background refresh; a user refresh always goes to the portal and
//! reports its outcome. When a fetch fails the last data shown stays up, and
//! with nothing shown the cache is read again regardless of age before the
//! view is marked failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{describe_age, AttendanceCache};
use crate::error::{Error, Result};
use crate::extract::{
    link_registers, Extraction, MarkupStructureError, RegisterExtractor, SummaryExtractor,
};
use crate::models::{CacheKey, SubjectAttendance, SubjectLink, SubjectRegister};
use crate::portal::PortalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Live,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
    Failed { message: String, retryable: bool },
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceView {
    pub subjects: Vec<SubjectAttendance>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub origin: Option<DataOrigin>,
    pub stale: bool,
    pub offline: bool,
    pub refreshing: bool,
    pub phase: LoadPhase,
}

impl Default for AttendanceView {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            fetched_at: None,
            origin: None,
            stale: false,
            offline: false,
            refreshing: false,
            phase: LoadPhase::Idle,
        }
    }
}

impl AttendanceView {
    pub fn has_data(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub fn age_description(&self) -> Option<String> {
        self.fetched_at.map(|ts| describe_age(ts, Utc::now()))
    }

    /// "Offline" while showing data a network failure kept from refreshing,
    /// otherwise the age of the data.
    pub fn freshness_label(&self) -> Option<String> {
        if self.offline {
            return Some("Offline".to_string());
        }
        self.age_description()
    }
}

/// Result of a live fetch that reached the portal and parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub subjects: usize,
    pub skipped: Vec<MarkupStructureError>,
    pub fetched_at: DateTime<Utc>,
}

pub struct Activation {
    pub view: AttendanceView,
    /// Set when a stale cache started a background refresh.
    pub background: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterView {
    pub links: Vec<SubjectLink>,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
    pub skipped: Vec<MarkupStructureError>,
}

#[derive(Clone)]
pub struct AttendanceCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    key: CacheKey,
    cache: Arc<AttendanceCache>,
    source: Arc<dyn PortalSource>,
    summary: SummaryExtractor,
    register: RegisterExtractor,
    state: watch::Sender<AttendanceView>,
    in_flight: AtomicBool,
    alive: AtomicBool,
}

/// Held for the duration of one portal fetch.
struct FetchGuard {
    inner: Arc<Inner>,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

struct Fetched {
    subjects: Vec<SubjectAttendance>,
    skipped: Vec<MarkupStructureError>,
    fetched_at: DateTime<Utc>,
}

impl AttendanceCoordinator {
    pub fn new(
        key: CacheKey,
        cache: Arc<AttendanceCache>,
        source: Arc<dyn PortalSource>,
        summary: SummaryExtractor,
        register: RegisterExtractor,
    ) -> Self {
        let (state, _) = watch::channel(AttendanceView::default());
        Self {
            inner: Arc::new(Inner {
                key,
                cache,
                source,
                summary,
                register,
                state,
                in_flight: AtomicBool::new(false),
                alive: AtomicBool::new(true),
            }),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.inner.key
    }

    pub fn snapshot(&self) -> AttendanceView {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AttendanceView> {
        self.inner.state.subscribe()
    }

    /// Stop applying results; fetches already in flight finish unobserved.
    pub fn shutdown(&self) {
        self.inner.alive.store(false, Ordering::Release);
        tracing::debug!(key = %self.inner.key, "coordinator shut down");
    }

    /// Publish cached data if there is any, then refresh: in the background
    /// when the cache is stale, inline when there is no cache at all.
    #[tracing::instrument(level = "debug", skip(self), fields(key = %self.inner.key))]
    pub async fn activate(&self) -> Activation {
        let inner = &self.inner;
        let cached = match inner.cache.get::<Vec<SubjectAttendance>>(&inner.key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed; fetching live");
                None
            }
        };

        match cached {
            Some(entry) => {
                let stale = !inner.cache.is_valid(&entry);
                inner.publish(|view| {
                    view.subjects = entry.payload;
                    view.fetched_at = Some(entry.fetched_at);
                    view.origin = Some(DataOrigin::Cache);
                    view.stale = stale;
                    view.phase = LoadPhase::Ready;
                });
                let background = if stale {
                    self.spawn_background_refresh()
                } else {
                    None
                };
                Activation {
                    view: self.snapshot(),
                    background,
                }
            }
            None => {
                if let Err(e) = self.refresh().await {
                    tracing::info!(error = %e, "initial fetch failed");
                }
                Activation {
                    view: self.snapshot(),
                    background: None,
                }
            }
        }
    }

    /// User-initiated refresh: always fetches, whatever the cache age.
    #[tracing::instrument(level = "debug", skip(self), fields(key = %self.inner.key))]
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let inner = &self.inner;
        if !inner.is_alive() {
            return Err(Error::ShutDown(inner.key.to_string()));
        }
        let _guard = Inner::begin_fetch(inner)
            .ok_or_else(|| Error::RefreshInFlight(inner.key.to_string()))?;

        inner.publish(|view| {
            view.refreshing = true;
            if !view.has_data() {
                view.phase = LoadPhase::Loading;
            }
        });

        match inner.fetch_summary().await {
            Ok(fetched) => {
                let report = RefreshReport {
                    subjects: fetched.subjects.len(),
                    skipped: fetched.skipped.clone(),
                    fetched_at: fetched.fetched_at,
                };
                inner.apply_success(fetched);
                Ok(report)
            }
            Err(e) => {
                inner.apply_failure(&e).await;
                Err(e)
            }
        }
    }

    /// The retry affordance of a failed view.
    pub async fn retry(&self) -> Result<RefreshReport> {
        self.refresh().await
    }

    fn spawn_background_refresh(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = Inner::begin_fetch(&self.inner) else {
            tracing::debug!(key = %self.inner.key, "refresh already in flight; not starting another");
            return None;
        };
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            let _guard = guard;
            match inner.fetch_summary().await {
                Ok(fetched) => inner.apply_success(fetched),
                Err(e) => {
                    tracing::debug!(key = %inner.key, error = %e, "background refresh failed; keeping cached data");
                }
            }
        }))
    }

    /// Fetch and extract the register, linking each subject to its summary.
    /// Falls back to the cached register when the portal cannot be read.
    #[tracing::instrument(level = "debug", skip(self), fields(key = %self.inner.key))]
    pub async fn load_register(&self) -> Result<RegisterView> {
        let inner = &self.inner;
        if !inner.is_alive() {
            return Err(Error::ShutDown(inner.key.to_string()));
        }
        let guard = Inner::begin_fetch(inner)
            .ok_or_else(|| Error::RefreshInFlight(inner.key.to_string()))?;
        let live = inner.fetch_register().await;
        drop(guard);

        let summaries = self.snapshot().subjects;
        match live {
            Ok(extraction) => {
                let fetched_at = match inner.cache.put(&inner.key, &extraction.records).await {
                    Ok(ts) => ts,
                    Err(e) => {
                        tracing::warn!(error = %e, "register write-through failed");
                        Utc::now()
                    }
                };
                Ok(RegisterView {
                    links: link_registers(&summaries, extraction.records),
                    fetched_at,
                    from_cache: false,
                    skipped: extraction.skipped,
                })
            }
            Err(e) => {
                let cached = inner
                    .cache
                    .get::<Vec<SubjectRegister>>(&inner.key)
                    .await
                    .unwrap_or_else(|cache_err| {
                        tracing::warn!(error = %cache_err, "register cache read failed");
                        None
                    });
                match cached {
                    Some(entry) => {
                        tracing::info!(error = %e, "serving cached register");
                        Ok(RegisterView {
                            links: link_registers(&summaries, entry.payload),
                            fetched_at: entry.fetched_at,
                            from_cache: true,
                            skipped: Vec::new(),
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }
}

impl Inner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn begin_fetch(this: &Arc<Inner>) -> Option<FetchGuard> {
        this.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FetchGuard {
                inner: Arc::clone(this),
            })
    }

    /// Apply a state change unless the consumer has gone away.
    fn publish(&self, change: impl FnOnce(&mut AttendanceView)) {
        if !self.is_alive() {
            tracing::debug!(key = %self.key, "coordinator shut down; dropping state update");
            return;
        }
        self.state.send_modify(change);
    }

    async fn fetch_summary(&self) -> Result<Fetched> {
        let html = self.source.fetch_summary(&self.key).await?;
        let extraction = self.summary.extract(&html);
        if extraction.all_failed() {
            return Err(Error::Markup(format!(
                "none of {} subjects could be read",
                extraction.skipped.len()
            )));
        }
        let Extraction { records, skipped } = extraction;

        let fetched_at = match self.cache.put(&self.key, &records).await {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "write-through to cache failed");
                Utc::now()
            }
        };
        tracing::info!(
            key = %self.key,
            subjects = records.len(),
            skipped = skipped.len(),
            "attendance refreshed"
        );
        Ok(Fetched {
            subjects: records,
            skipped,
            fetched_at,
        })
    }

    async fn fetch_register(&self) -> Result<Extraction<SubjectRegister>> {
        let html = self.source.fetch_register(&self.key).await?;
        let extraction = self.register.extract(&html);
        if extraction.all_failed() {
            return Err(Error::Markup(format!(
                "none of {} registers could be read",
                extraction.skipped.len()
            )));
        }
        Ok(extraction)
    }

    fn apply_success(&self, fetched: Fetched) {
        self.publish(|view| {
            view.subjects = fetched.subjects;
            view.fetched_at = Some(fetched.fetched_at);
            view.origin = Some(DataOrigin::Live);
            view.stale = false;
            view.offline = false;
            view.refreshing = false;
            view.phase = LoadPhase::Ready;
        });
    }

    async fn apply_failure(&self, err: &Error) {
        let network = err.is_network();
        let has_data = self.state.borrow().has_data();
        if has_data {
            self.publish(|view| {
                view.refreshing = false;
                view.offline = network;
            });
            return;
        }

        let cached = match self.cache.get::<Vec<SubjectAttendance>>(&self.key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "last-resort cache read failed");
                None
            }
        };
        match cached {
            Some(entry) => {
                let stale = !self.cache.is_valid(&entry);
                tracing::info!(key = %self.key, error = %err, "live fetch failed; serving cached attendance");
                self.publish(|view| {
                    view.subjects = entry.payload;
                    view.fetched_at = Some(entry.fetched_at);
                    view.origin = Some(DataOrigin::Cache);
                    view.stale = stale;
                    view.offline = network;
                    view.refreshing = false;
                    view.phase = LoadPhase::Ready;
                });
            }
            None => {
                tracing::warn!(key = %self.key, error = %err, "no attendance data available");
                self.publish(|view| {
                    view.refreshing = false;
                    view.offline = network;
                    view.phase = LoadPhase::Failed {
                        message: err.to_string(),
                        retryable: true,
                    };
                });
            }
        }
    }
}
