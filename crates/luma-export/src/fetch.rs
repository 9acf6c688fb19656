use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Tunables;
use crate::error::ExportError;

/// Which half of the calendar `/home/get-events` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Past,
    Future,
}

/// One page of the paginated events listing.
#[derive(Debug, Deserialize)]
pub struct EventsPage {
    #[serde(default)]
    pub entries: Vec<EventEntry>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEntry {
    pub event: Event,
}

/// An event as returned by the API. The fields the pipeline relies on are
/// typed; everything else is kept verbatim so the events report reflects the
/// full upstream payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub api_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Event {
    /// Public page for the event, derived from its URL slug.
    pub fn event_url(&self) -> String {
        format!("https://lu.ma/{}", self.url)
    }
}

/// Walks the cursor-paginated events listing, accumulating entries until the
/// API reports no further pages. A page failure stops pagination and returns
/// whatever was accumulated so far.
pub async fn paginate_events<F, Fut>(mut fetch_page: F) -> Vec<EventEntry>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<EventsPage, ExportError>>,
{
    let mut entries = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = match fetch_page(cursor.take()).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "event page fetch failed; stopping pagination");
                break;
            }
        };

        entries.extend(page.entries);

        match (page.has_more, page.next_cursor) {
            (true, Some(next)) => cursor = Some(next),
            _ => break,
        }
    }

    entries
}

/// Fetches every event for the given period. Past events are filtered to
/// those starting strictly after the configured cutoff; future events are
/// returned unfiltered.
pub async fn fetch_events(client: &Client, tunables: &Tunables, period: Period) -> Vec<Event> {
    let entries = paginate_events(|cursor| {
        let url = events_page_url(&tunables.base_url, period, cursor.as_deref());
        fetch_events_page(client, &tunables.auth_key, url)
    })
    .await;

    debug!(count = entries.len(), ?period, "pagination finished");

    let events = entries.into_iter().map(|entry| entry.event);
    match period {
        Period::Past => events
            .filter(|event| starts_after(event, tunables.past_cutoff))
            .collect(),
        Period::Future => events.collect(),
    }
}

/// Downloads the guest-list CSV export for one event and returns the raw body.
pub async fn download_guests_csv(
    client: &Client,
    tunables: &Tunables,
    event_api_id: &str,
) -> Result<String, ExportError> {
    let url = format!(
        "{}/event/admin/download-guests-csv?event_api_id={}",
        tunables.base_url,
        urlencoding::encode(event_api_id)
    );

    let response = client
        .get(&url)
        .header("Cookie", session_cookie(&tunables.auth_key))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ExportError::message(format!(
            "guest export for {event_api_id} responded with {}",
            response.status()
        )));
    }

    Ok(response.text().await?)
}

async fn fetch_events_page(
    client: &Client,
    auth_key: &str,
    url: String,
) -> Result<EventsPage, ExportError> {
    let response = client
        .get(&url)
        .header("Cookie", session_cookie(auth_key))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ExportError::message(format!(
            "events endpoint responded with {}",
            response.status()
        )));
    }

    Ok(response.json::<EventsPage>().await?)
}

fn events_page_url(base_url: &str, period: Period, cursor: Option<&str>) -> String {
    let mut params: Vec<(&str, &str)> = Vec::new();
    if period == Period::Past {
        params.push(("period", "past"));
    }
    if let Some(cursor) = cursor {
        params.push(("pagination_cursor", cursor));
    }

    let mut url = format!("{base_url}/home/get-events");
    if !params.is_empty() {
        let query = params
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }
    url
}

fn starts_after(event: &Event, cutoff: DateTime<Utc>) -> bool {
    // Events without a parseable start time never pass the cutoff.
    event.start_at.map(|start| start > cutoff).unwrap_or(false)
}

fn session_cookie(auth_key: &str) -> String {
    format!("luma.auth-session-key={auth_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn event(api_id: &str, start_at: Option<&str>) -> Event {
        Event {
            api_id: api_id.to_string(),
            name: format!("Event {api_id}"),
            url: api_id.to_string(),
            start_at: start_at.map(|raw| raw.parse().expect("valid timestamp")),
            extra: serde_json::Map::new(),
        }
    }

    fn page(api_ids: &[&str], has_more: bool, next_cursor: Option<&str>) -> EventsPage {
        EventsPage {
            entries: api_ids
                .iter()
                .map(|id| EventEntry {
                    event: event(id, None),
                })
                .collect(),
            has_more,
            next_cursor: next_cursor.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn pagination_accumulates_all_pages() {
        let mut pages = VecDeque::from(vec![
            Ok(page(&["a", "b"], true, Some("c1"))),
            Ok(page(&["c"], true, Some("c2"))),
            Ok(page(&["d", "e"], false, None)),
        ]);
        let mut cursors = Vec::new();

        let entries = paginate_events(|cursor| {
            cursors.push(cursor);
            let next = pages.pop_front().expect("page requested past the end");
            async move { next }
        })
        .await;

        assert_eq!(entries.len(), 5);
        assert_eq!(
            cursors,
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn pagination_stops_without_next_cursor() {
        // has_more without a cursor would otherwise loop forever.
        let mut pages = VecDeque::from(vec![Ok(page(&["a"], true, None))]);

        let entries = paginate_events(|_| {
            let next = pages.pop_front().expect("single page");
            async move { next }
        })
        .await;

        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn pagination_error_returns_accumulated_prefix() {
        let mut pages: VecDeque<Result<EventsPage, ExportError>> = VecDeque::from(vec![
            Ok(page(&["a", "b"], true, Some("c1"))),
            Err(ExportError::message("boom")),
        ]);

        let entries = paginate_events(|_| {
            let next = pages.pop_front().expect("two pages");
            async move { next }
        })
        .await;

        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_events_page_url_variants() {
        assert_eq!(
            events_page_url("https://api.lu.ma", Period::Future, None),
            "https://api.lu.ma/home/get-events"
        );
        assert_eq!(
            events_page_url("https://api.lu.ma", Period::Past, None),
            "https://api.lu.ma/home/get-events?period=past"
        );
        assert_eq!(
            events_page_url("https://api.lu.ma", Period::Past, Some("cur 1")),
            "https://api.lu.ma/home/get-events?period=past&pagination_cursor=cur%201"
        );
    }

    #[test]
    fn test_starts_after_cutoff_is_strict() {
        let cutoff = "2024-04-20T00:00:00Z".parse().expect("valid cutoff");

        let before = event("before", Some("2024-04-19T23:59:59Z"));
        let on = event("on", Some("2024-04-20T00:00:00Z"));
        let after = event("after", Some("2024-04-20T00:00:01Z"));
        let unknown = event("unknown", None);

        assert!(!starts_after(&before, cutoff));
        assert!(!starts_after(&on, cutoff));
        assert!(starts_after(&after, cutoff));
        assert!(!starts_after(&unknown, cutoff));
    }

    #[test]
    fn test_event_url_uses_slug() {
        let event = event("evt-1", None);
        assert_eq!(event.event_url(), "https://lu.ma/evt-1");
    }

    #[test]
    fn test_events_page_deserializes_api_shape() {
        let raw = r#"{
            "entries": [
                {"event": {"api_id": "evt-1", "name": "Meetup", "url": "meetup-1",
                           "start_at": "2024-05-01T18:00:00Z", "cover_url": "https://img"}}
            ],
            "has_more": true,
            "next_cursor": "abc"
        }"#;

        let page: EventsPage = serde_json::from_str(raw).expect("page parses");
        assert_eq!(page.entries.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));

        let event = &page.entries[0].event;
        assert_eq!(event.api_id, "evt-1");
        assert_eq!(event.extra.get("cover_url").and_then(Value::as_str), Some("https://img"));
    }
}
