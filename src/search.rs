//! Plate search: the query matcher, the `/api/search` endpoint and the
//! debounced live-search socket behind the home page search box.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router, debug_handler,
    extract::{Query, State, WebSocketUpgrade, ws::Message},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{AppState, plate};

/// Queries shorter than this (after normalization) never reach the database.
pub const MIN_QUERY_LEN: usize = 2;
/// Response size cap, matching the original endpoint.
pub const MAX_RESULTS: u32 = 10;
/// Quiet period after the last keystroke before a live search fires.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(search_api))
        .route("/api/search/live", get(search_live))
}

/// A normalized plate query, split into its two prefix segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateQuery {
    letters: String,
    digits: String,
}

impl PlateQuery {
    /// Normalizes `raw` exactly like the plate formatter does. `None` for
    /// queries under [`MIN_QUERY_LEN`] significant characters; that is the
    /// defined too-short empty state, not an error.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = plate::normalize(raw);
        if canonical.len() < MIN_QUERY_LEN {
            return None;
        }

        let split = canonical
            .chars()
            .take_while(|c| c.is_ascii_uppercase())
            .count();
        let (letters, digits) = canonical.split_at(split);
        Some(Self {
            letters: letters.to_owned(),
            digits: digits.to_owned(),
        })
    }

    /// LIKE prefix patterns over stored plates. Canonical rows are space-free
    /// so the first pattern covers them; the second tolerates a stored
    /// separator the user did not type ("ABC1" matching "ABC 123").
    /// Canonical text is `[A-Z0-9]` only, so no wildcard escaping is needed.
    pub fn like_patterns(&self) -> Vec<String> {
        let mut patterns = vec![format!("{}{}%", self.letters, self.digits)];
        if !self.letters.is_empty() && !self.digits.is_empty() {
            patterns.push(format!("{} {}%", self.letters, self.digits));
        }
        patterns
    }
}

/// The listing fields a search result carries, in the shape the search box
/// expects (`_id` included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub plate_number: String,
    pub make: String,
    pub model: String,
}

/// One frame pushed back on the live socket: either a result array, or an
/// error marker the widget can surface instead of a silent empty list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum LiveReply {
    Cars(Vec<CarSummary>),
    Failed { error: bool },
}

impl LiveReply {
    fn failed() -> Self {
        Self::Failed { error: true }
    }
}

/// Lookup seam for the search path; the pool implements it, tests fake it.
#[async_trait]
pub trait PlateIndex: Send + Sync {
    async fn search(&self, query: &PlateQuery) -> anyhow::Result<Vec<CarSummary>>;
}

#[async_trait]
impl PlateIndex for SqlitePool {
    /// Most recently added first; v7 ids break same-second ties.
    async fn search(&self, query: &PlateQuery) -> anyhow::Result<Vec<CarSummary>> {
        let patterns = query.like_patterns();
        let spaced = patterns.get(1).unwrap_or(&patterns[0]);

        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id,plate_number,make,model FROM cars \
             WHERE plate_number LIKE ? OR plate_number LIKE ? \
             ORDER BY added_at DESC, id DESC LIMIT ?",
        )
        .bind(&patterns[0])
        .bind(spaced)
        .bind(MAX_RESULTS)
        .fetch_all(self)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, plate_number, make, model)| CarSummary {
                id,
                plate_number,
                make,
                model,
            })
            .collect())
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchParams {
    plate: Option<String>,
}

/// `GET /api/search?plate=...` — `200 []` for missing/too-short queries,
/// `500 []` when the database lookup fails. Both bodies stay a JSON array so
/// the search box can render either without special-casing.
#[debug_handler]
pub(crate) async fn search_api(
    State(db_pool): State<SqlitePool>,
    Query(SearchParams { plate }): Query<SearchParams>,
) -> Response {
    let Some(query) = plate.as_deref().and_then(PlateQuery::parse) else {
        return Json(Vec::<CarSummary>::new()).into_response();
    };

    match db_pool.search(&query).await {
        Ok(cars) => Json(cars).into_response(),
        Err(err) => {
            tracing::error!("plate search failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Vec::<CarSummary>::new()),
            )
                .into_response()
        }
    }
}

/// `GET /api/search/live` — each text frame is a raw keystroke-level query;
/// the server debounces and pushes back JSON result arrays.
#[debug_handler(state = AppState)]
pub(crate) async fn search_live(
    State(db_pool): State<SqlitePool>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let (mut sender, mut receiver) = stream.split();
        let (query_tx, query_rx) = mpsc::channel::<String>(32);
        let (result_tx, mut result_rx) = mpsc::channel::<LiveReply>(32);

        tokio::spawn(async move {
            debounce_loop(query_rx, db_pool, result_tx).await;
        });

        let send_task = tokio::spawn(async move {
            while let Some(reply) = result_rx.recv().await {
                let Ok(payload) = serde_json::to_string(&reply) else {
                    break;
                };
                if sender.send(payload.into()).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if query_tx.send(text.as_str().to_owned()).await.is_err() {
                    break;
                }
            }
        }

        drop(query_tx);
        let _ = send_task.await;
    })
}

/// Coalesces a keystroke stream: each query re-arms a [`DEBOUNCE`] timer and
/// cancels the pending lookup, so at most one backend call fires per settled
/// query. Results therefore always correspond to the newest input; a stale
/// response can never overwrite a newer one. Too-short settled queries emit
/// an empty array without touching the index; a failed lookup emits an
/// error-flagged frame rather than posing as "no matches".
pub(crate) async fn debounce_loop<I: PlateIndex>(
    mut queries: mpsc::Receiver<String>,
    index: I,
    results: mpsc::Sender<LiveReply>,
) {
    let mut pending: Option<String> = None;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            raw = queries.recv() => match raw {
                Some(raw) => {
                    pending = Some(raw);
                    deadline = Instant::now() + DEBOUNCE;
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                let Some(raw) = pending.take() else {
                    continue;
                };
                let reply = match PlateQuery::parse(&raw) {
                    Some(query) => match index.search(&query).await {
                        Ok(cars) => LiveReply::Cars(cars),
                        Err(err) => {
                            tracing::error!("live plate search failed: {err:#}");
                            LiveReply::failed()
                        }
                    },
                    None => LiveReply::Cars(Vec::new()),
                };
                if results.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn parse_normalizes_like_the_formatter() {
        assert_eq!(
            PlateQuery::parse("ab"),
            Some(PlateQuery {
                letters: "AB".to_owned(),
                digits: String::new(),
            })
        );
        assert_eq!(
            PlateQuery::parse("ABC 1"),
            Some(PlateQuery {
                letters: "ABC".to_owned(),
                digits: "1".to_owned(),
            })
        );
        assert_eq!(
            PlateQuery::parse("12"),
            Some(PlateQuery {
                letters: String::new(),
                digits: "12".to_owned(),
            })
        );
    }

    #[test]
    fn parse_rejects_short_queries() {
        assert_eq!(PlateQuery::parse("a"), None);
        assert_eq!(PlateQuery::parse(""), None);
        assert_eq!(PlateQuery::parse(" !a! "), None);
    }

    #[test]
    fn like_patterns_tolerate_a_stored_space() {
        let query = PlateQuery::parse("ABC1").unwrap();
        assert_eq!(query.like_patterns(), vec!["ABC1%", "ABC 1%"]);

        // no digits yet -> a bare prefix already matches both stored forms
        let query = PlateQuery::parse("ab").unwrap();
        assert_eq!(query.like_patterns(), vec!["AB%"]);

        let query = PlateQuery::parse("123").unwrap();
        assert_eq!(query.like_patterns(), vec!["123%"]);
    }

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        for (i, (plate, make, model)) in [
            ("ABC123", "Audi", "A4"),
            ("ABD777", "BMW", "X3"),
            ("XYZ111", "Volkswagen", "Golf"),
        ]
        .iter()
        .enumerate()
        {
            sqlx::query(
                "INSERT INTO cars (id,plate_number,make,model,image_url,owner_id,added_at) \
                 VALUES (?,?,?,?,?,?,?)",
            )
            .bind(uuid::Uuid::now_v7().to_string())
            .bind(plate)
            .bind(make)
            .bind(model)
            .bind("https://img.example/car.jpg")
            .bind("owner")
            .bind(1_700_000_000_i64 + i as i64)
            .execute(&pool)
            .await
            .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn sqlite_index_matches_prefixes() {
        let pool = seeded_pool().await;

        let hits = pool.search(&PlateQuery::parse("ab").unwrap()).await.unwrap();
        assert_eq!(hits.len(), 2);
        // most recently added first
        assert_eq!(hits[0].plate_number, "ABD777");

        let hits = pool
            .search(&PlateQuery::parse("ABC 1").unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].plate_number, "ABC123");
        assert_eq!(hits[0].make, "Audi");

        let hits = pool
            .search(&PlateQuery::parse("QQQ").unwrap())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn sqlite_index_caps_results() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        for i in 0..15 {
            sqlx::query(
                "INSERT INTO cars (id,plate_number,make,model,image_url,owner_id,added_at) \
                 VALUES (?,?,?,?,?,?,?)",
            )
            .bind(uuid::Uuid::now_v7().to_string())
            .bind(format!("AAA{i:03}"))
            .bind("Make")
            .bind("Model")
            .bind("url")
            .bind("owner")
            .bind(i as i64)
            .execute(&pool)
            .await
            .unwrap();
        }

        let hits = pool.search(&PlateQuery::parse("aa").unwrap()).await.unwrap();
        assert_eq!(hits.len(), MAX_RESULTS as usize);
        assert_eq!(hits[0].plate_number, "AAA014");
    }

    #[derive(Clone, Default)]
    struct CountingIndex {
        calls: Arc<Mutex<Vec<PlateQuery>>>,
    }

    #[async_trait]
    impl PlateIndex for CountingIndex {
        async fn search(&self, query: &PlateQuery) -> anyhow::Result<Vec<CarSummary>> {
            self.calls.lock().unwrap().push(query.clone());
            Ok(vec![CarSummary {
                id: "1".to_owned(),
                plate_number: "ABC123".to_owned(),
                make: "Audi".to_owned(),
                model: "A4".to_owned(),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_keystrokes_into_one_lookup() {
        let index = CountingIndex::default();
        let calls = index.calls.clone();
        let (query_tx, query_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        let loop_task = tokio::spawn(debounce_loop(query_rx, index, result_tx));

        for q in ["A", "AB", "ABC"] {
            query_tx.send(q.to_owned()).await.unwrap();
        }

        let LiveReply::Cars(cars) = result_rx.recv().await.unwrap() else {
            panic!("expected a result array");
        };
        assert_eq!(cars.len(), 1);
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[PlateQuery::parse("ABC").unwrap()]
        );

        drop(query_tx);
        loop_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_short_query_yields_empty_without_a_lookup() {
        let index = CountingIndex::default();
        let calls = index.calls.clone();
        let (query_tx, query_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        let loop_task = tokio::spawn(debounce_loop(query_rx, index, result_tx));

        query_tx.send("z".to_owned()).await.unwrap();

        assert_eq!(result_rx.recv().await.unwrap(), LiveReply::Cars(Vec::new()));
        assert!(calls.lock().unwrap().is_empty());

        drop(query_tx);
        loop_task.await.unwrap();
    }

    struct FailingIndex;

    #[async_trait]
    impl PlateIndex for FailingIndex {
        async fn search(&self, _query: &PlateQuery) -> anyhow::Result<Vec<CarSummary>> {
            anyhow::bail!("database gone")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_surfaces_backend_failure_as_an_error_frame() {
        let (query_tx, query_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        let loop_task = tokio::spawn(debounce_loop(query_rx, FailingIndex, result_tx));

        query_tx.send("ABC".to_owned()).await.unwrap();

        // not an empty result array: the widget can tell the states apart
        let reply = result_rx.recv().await.unwrap();
        assert_eq!(reply, LiveReply::failed());
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"error":true}"#);

        drop(query_tx);
        loop_task.await.unwrap();
    }
}
