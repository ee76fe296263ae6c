use crate::rate_limit::WorkspaceRateLimiter;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use weblens_storage::{EventRepository, SessionRepository, StorageError};
use weblens_types::{validate_event, Event, EventType, Session, MAX_EVENT_BATCH};

/// One event as submitted by a client. Missing ids and timestamps are
/// filled in during ingestion; the event type arrives as a string so a
/// single unknown type skips that event instead of failing the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingEvent {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub event_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackEventsRequest {
    pub session_id: Uuid,
    pub workspace_id: Uuid,
    pub events: Vec<IncomingEvent>,
}

/// What happened to a batch.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub session_id: Uuid,
    /// Events that survived validation and dedup and were persisted
    pub accepted: usize,
    /// Events dropped by validation or dedup
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event batch of {size} exceeds the {MAX_EVENT_BATCH} event limit")]
    BatchTooLarge { size: usize },

    #[error("workspace {workspace_id} exceeded its event rate limit")]
    RateLimited { workspace_id: Uuid },

    #[error("no valid events to process")]
    NoValidEvents,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("ingestion cancelled")]
    Cancelled,
}

/// Validates, dedupes and persists event batches.
#[derive(Clone)]
pub struct EventIngestService {
    sessions: Arc<dyn SessionRepository>,
    events: Arc<dyn EventRepository>,
    limiter: Arc<WorkspaceRateLimiter>,
}

impl EventIngestService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        events: Arc<dyn EventRepository>,
        limiter: Arc<WorkspaceRateLimiter>,
    ) -> Self {
        Self {
            sessions,
            events,
            limiter,
        }
    }

    #[instrument(skip(self, request, cancel), fields(workspace_id = %request.workspace_id, session_id = %request.session_id, events = request.events.len()))]
    pub async fn track_events(
        &self,
        request: TrackEventsRequest,
        cancel: &CancellationToken,
    ) -> Result<TrackOutcome, IngestError> {
        if request.events.len() > MAX_EVENT_BATCH {
            return Err(IngestError::BatchTooLarge {
                size: request.events.len(),
            });
        }
        if !self
            .limiter
            .try_admit(request.workspace_id, request.events.len())
        {
            return Err(IngestError::RateLimited {
                workspace_id: request.workspace_id,
            });
        }
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let now = Utc::now();
        let mut seen_ids: HashSet<Uuid> = HashSet::new();
        let mut valid: Vec<Event> = Vec::with_capacity(request.events.len());
        let mut skipped = 0usize;

        for incoming in request.events {
            let event_type: EventType = match incoming.event_type.parse() {
                Ok(t) => t,
                Err(error) => {
                    debug!(%error, "skipping event with unknown type");
                    skipped += 1;
                    continue;
                }
            };

            let event = Event {
                id: incoming.id.unwrap_or_else(Uuid::new_v4),
                session_id: request.session_id,
                workspace_id: request.workspace_id,
                event_type,
                url: incoming.url,
                timestamp: incoming.timestamp.unwrap_or(now),
                properties: incoming.properties,
                created_at: now,
            };

            if let Err(error) = validate_event(&event, now) {
                debug!(event_id = %event.id, %error, "skipping invalid event");
                skipped += 1;
                continue;
            }
            // Within-batch dedup by event id; the first occurrence wins.
            if !seen_ids.insert(event.id) {
                debug!(event_id = %event.id, "skipping duplicate event id");
                skipped += 1;
                continue;
            }
            valid.push(event);
        }

        if valid.is_empty() {
            return Err(IngestError::NoValidEvents);
        }

        let session_id = request.session_id;
        if self.sessions.get(session_id).await?.is_none() {
            let session = Session::started_now(session_id, request.workspace_id);
            self.sessions.create(session).await?;
            debug!(%session_id, "created session on first event batch");
        }

        let page_views = valid
            .iter()
            .filter(|e| e.event_type == EventType::Pageview)
            .count() as u64;
        let accepted = self.events.create_bulk(valid).await?;

        // Counter updates are best-effort; a failure here must not fail the
        // whole request.
        if let Err(error) = self
            .sessions
            .increment_counters(session_id, accepted as u64, page_views)
            .await
        {
            warn!(%session_id, %error, "failed to update session counters");
        }

        info!(accepted, skipped, "event batch ingested");
        Ok(TrackOutcome {
            session_id,
            accepted,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weblens_storage::{EventFilter, InMemoryStore};

    fn service(store: InMemoryStore) -> EventIngestService {
        EventIngestService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(WorkspaceRateLimiter::default()),
        )
    }

    fn incoming(event_type: &str, id: Option<Uuid>, url: Option<&str>) -> IncomingEvent {
        IncomingEvent {
            id,
            event_type: event_type.to_string(),
            url: url.map(|u| u.to_string()),
            timestamp: None,
            properties: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn creates_session_and_updates_counters() {
        let store = InMemoryStore::new();
        let service = service(store.clone());
        let session_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();

        let outcome = service
            .track_events(
                TrackEventsRequest {
                    session_id,
                    workspace_id,
                    events: vec![
                        incoming("pageview", None, Some("/")),
                        incoming("click", None, None),
                        incoming("pageview", None, Some("/about")),
                    ],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.skipped, 0);

        let session = SessionRepository::get(&store, session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.workspace_id, workspace_id);
        assert_eq!(session.events_count, 3);
        assert_eq!(session.page_views, 2);
    }

    #[tokio::test]
    async fn duplicate_event_id_is_stored_once() {
        let store = InMemoryStore::new();
        let service = service(store.clone());
        let session_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();
        let shared = Uuid::new_v4();

        let outcome = service
            .track_events(
                TrackEventsRequest {
                    session_id,
                    workspace_id,
                    events: vec![
                        incoming("pageview", Some(shared), Some("/")),
                        incoming("click", Some(shared), None),
                    ],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.skipped, 1);

        let stored = EventRepository::list(
            &store,
            EventFilter {
                workspace_id: Some(workspace_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, shared);
        assert_eq!(stored[0].event_type, EventType::Pageview);

        // The duplicate contributed nothing to the counters.
        let session = SessionRepository::get(&store, session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events_count, 1);
        assert_eq!(session.page_views, 1);
    }

    #[tokio::test]
    async fn invalid_events_are_skipped_not_fatal() {
        let store = InMemoryStore::new();
        let service = service(store.clone());

        let outcome = service
            .track_events(
                TrackEventsRequest {
                    session_id: Uuid::new_v4(),
                    workspace_id: Uuid::new_v4(),
                    events: vec![
                        incoming("pageview", None, None), // pageview without url
                        incoming("made_up_type", None, None),
                        incoming("click", None, None),
                    ],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.skipped, 2);
    }

    #[tokio::test]
    async fn all_invalid_is_a_typed_error() {
        let store = InMemoryStore::new();
        let service = service(store);

        let err = service
            .track_events(
                TrackEventsRequest {
                    session_id: Uuid::new_v4(),
                    workspace_id: Uuid::new_v4(),
                    events: vec![incoming("nope", None, None)],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoValidEvents));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let store = InMemoryStore::new();
        let service = service(store);

        let events = (0..101)
            .map(|_| incoming("click", None, None))
            .collect();
        let err = service
            .track_events(
                TrackEventsRequest {
                    session_id: Uuid::new_v4(),
                    workspace_id: Uuid::new_v4(),
                    events,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::BatchTooLarge { size: 101 }));
    }

    #[tokio::test]
    async fn rate_limited_workspace_is_rejected_before_storage() {
        let store = InMemoryStore::new();
        let service = EventIngestService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(WorkspaceRateLimiter::new(2)),
        );
        let workspace_id = Uuid::new_v4();

        let request = |session| TrackEventsRequest {
            session_id: session,
            workspace_id,
            events: vec![incoming("click", None, None), incoming("click", None, None)],
        };

        service
            .track_events(request(Uuid::new_v4()), &CancellationToken::new())
            .await
            .unwrap();

        let session_id = Uuid::new_v4();
        let err = service
            .track_events(request(session_id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::RateLimited { .. }));

        // Nothing reached storage for the rejected batch.
        assert!(SessionRepository::get(&store, session_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn existing_session_is_reused() {
        let store = InMemoryStore::new();
        let service = service(store.clone());
        let workspace_id = Uuid::new_v4();

        let mut session = Session::started_now(Uuid::new_v4(), workspace_id);
        session.page_views = 5;
        session.events_count = 9;
        let session_id = session.id;
        SessionRepository::create(&store, session).await.unwrap();

        service
            .track_events(
                TrackEventsRequest {
                    session_id,
                    workspace_id,
                    events: vec![incoming("pageview", None, Some("/next"))],
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let session = SessionRepository::get(&store, session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events_count, 10);
        assert_eq!(session.page_views, 6);
    }
}
