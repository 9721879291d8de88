use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;

use crate::config::Config;
use crate::enrichment::Enrichment;
use crate::enrichment::ProgramLookup;
use crate::enrichment::Sourced;
use crate::error::Error;
use crate::models::Channel;
use crate::models::ChannelId;
use crate::models::ChannelNumber;
use crate::models::EpgEvent;
use crate::models::StreamInfo;
use crate::refresh::RefreshScheduler;
use crate::state_store::Registries;

pub struct ScheduleResolver {
    registries: Arc<Registries>,
    lock_timeout: Duration,
    provider_timeout: Duration,
    scheduler: RefreshScheduler,
}

#[derive(Debug)]
pub struct Resolution {
    /// The object pushed with the `actual` tag.
    pub payload: serde_json::Value,
    pub have_actual: bool,
    pub schedule_found: bool,
    pub next_refresh_at: DateTime<Utc>,
}

impl ScheduleResolver {
    pub fn new(config: &Config, registries: Arc<Registries>) -> Self {
        ScheduleResolver {
            registries,
            lock_timeout: config.registries.lock_timeout,
            provider_timeout: config.enrichment.timeout,
            scheduler: RefreshScheduler::new(&config.refresh),
        }
    }

    pub async fn resolve(
        &self,
        number: ChannelNumber,
        enrichment: &Enrichment,
        now: DateTime<Utc>,
    ) -> Result<Resolution, Error> {
        let channels = self
            .registries
            .channels
            .acquire_read(self.lock_timeout)
            .await?;
        let channel = channels.get(&number).ok_or(Error::ChannelNotFound)?;
        tracing::info!(
            channel.number = %number,
            channel.name = %channel.name,
            "Update present/following"
        );

        let schedules = self
            .registries
            .schedules
            .acquire_read(self.lock_timeout)
            .await?;
        let schedule = match schedules.get(&channel.id) {
            Some(schedule) => schedule,
            None => {
                // Schedules may not be loaded yet.
                tracing::info!(channel.number = %number, channel.id = %channel.id, "No schedule");
                let payload = serde_json::to_value(ActualPayload::new(channel, None, None))?;
                return Ok(Resolution {
                    payload,
                    have_actual: false,
                    schedule_found: false,
                    next_refresh_at: self.scheduler.next_deadline(false, None, now),
                });
            }
        };

        let mut present = schedule.present(now).map(Sourced::Borrowed);
        let mut following = schedule.following(now).map(Sourced::Borrowed);
        // Read accesses are held while the provider is consulted.
        if let Some(lookup) = enrichment.program_lookup() {
            let timeout = self.provider_timeout;
            present = enrich(lookup, timeout, &channel.id, present, "present").await;
            following = enrich(lookup, timeout, &channel.id, following, "following").await;
        }

        let have_actual = present.is_some();
        let next_refresh_at = self
            .scheduler
            .next_deadline(true, following.as_deref(), now);
        let payload = serde_json::to_value(ActualPayload::new(
            channel,
            present.as_deref(),
            following.as_deref(),
        ))?;

        // Owned events are released only after they have been serialized.
        drop(present);
        drop(following);

        Ok(Resolution {
            payload,
            have_actual,
            schedule_found: true,
            next_refresh_at,
        })
    }
}

async fn enrich<'a>(
    lookup: &dyn ProgramLookup,
    timeout: Duration,
    channel_id: &ChannelId,
    event: Option<Sourced<'a, EpgEvent>>,
    slot: &'static str,
) -> Option<Sourced<'a, EpgEvent>> {
    let event = event?;
    let request = lookup.lookup_event(channel_id, &event);
    let result = match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(Error::ProviderTimedOut),
    };
    match result {
        Ok(Some(provided)) => {
            tracing::debug!(slot, event.id = %provided.event_id, "Enriched");
            Some(Sourced::Owned(provided))
        }
        Ok(None) => Some(event),
        Err(err) => {
            tracing::warn!(%err, slot, event.id = %event.event_id, "Failed to enrich, use the primary schedule");
            Some(event)
        }
    }
}

#[derive(Serialize)]
struct ActualPayload<'a> {
    channel: &'a Channel,
    streaminfo: &'a StreamInfo,
    #[serde(serialize_with = "serialize_section")]
    present: Option<&'a EpgEvent>,
    #[serde(serialize_with = "serialize_section")]
    following: Option<&'a EpgEvent>,
}

impl<'a> ActualPayload<'a> {
    fn new(
        channel: &'a Channel,
        present: Option<&'a EpgEvent>,
        following: Option<&'a EpgEvent>,
    ) -> Self {
        ActualPayload {
            channel,
            streaminfo: &channel.stream_info,
            present,
            following,
        }
    }
}

// A missing event is serialized as an empty object.
fn serialize_section<S>(event: &Option<&EpgEvent>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match event {
        Some(event) => event.serialize(s),
        None => s.serialize_map(Some(0))?.end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::stub::CountingProvider;
    use crate::models::Schedule;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    async fn registries_for_test(events: Option<Vec<EpgEvent>>) -> Arc<Registries> {
        let registries = Arc::new(Registries::new());
        registries
            .channels
            .write()
            .await
            .insert(5.into(), channel!(5, "ch5", "Five"));
        if let Some(events) = events {
            registries
                .schedules
                .write()
                .await
                .insert("ch5".into(), Schedule::new("ch5".into(), events));
        }
        registries
    }

    fn news_and_movie() -> Vec<EpgEvent> {
        vec![
            event!(1, now(), "30m", "News"),
            event!(2, now() + chrono::Duration::seconds(1800), "2h", "Movie"),
        ]
    }

    #[tokio::test]
    async fn test_resolve_present_and_following() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(resolution.have_actual);
            assert!(resolution.schedule_found);
            assert_eq!(resolution.next_refresh_at, now() + chrono::Duration::seconds(1800));
            assert_eq!(resolution.payload["channel"]["name"], "Five");
            assert_eq!(resolution.payload["streaminfo"]["videoPid"], 0);
            assert_eq!(resolution.payload["present"]["title"], "News");
            assert_eq!(resolution.payload["present"]["startTime"], 1_700_000_000);
            assert_eq!(resolution.payload["following"]["title"], "Movie");
            assert_eq!(resolution.payload["following"]["startTime"], 1_700_001_800);
        });
    }

    #[tokio::test]
    async fn test_resolve_no_schedule() {
        let registries = registries_for_test(None).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(!resolution.have_actual);
            assert!(!resolution.schedule_found);
            assert_eq!(resolution.next_refresh_at, now() + chrono::Duration::seconds(60));
            assert_eq!(resolution.payload["channel"]["number"], 5);
            assert_eq!(resolution.payload["present"], json!({}));
            assert_eq!(resolution.payload["following"], json!({}));
        });
    }

    #[tokio::test]
    async fn test_resolve_no_following() {
        let registries = registries_for_test(Some(vec![event!(1, now(), "30m", "News")])).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(resolution.have_actual);
            assert_eq!(resolution.next_refresh_at, now() + chrono::Duration::seconds(10));
            assert_eq!(resolution.payload["present"]["title"], "News");
            assert_eq!(resolution.payload["following"], json!({}));
        });
    }

    #[tokio::test]
    async fn test_resolve_nothing_on_air() {
        let start = now() + chrono::Duration::minutes(10);
        let registries = registries_for_test(Some(vec![event!(1, start, "30m", "Late show")])).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(!resolution.have_actual);
            assert_eq!(resolution.next_refresh_at, start);
            assert_eq!(resolution.payload["present"], json!({}));
            assert_eq!(resolution.payload["following"]["title"], "Late show");
        });
    }

    #[tokio::test]
    async fn test_resolve_unknown_channel() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let result = resolver.resolve(6.into(), &Enrichment::Absent, now()).await;
        assert_matches!(result, Err(Error::ChannelNotFound));
    }

    #[tokio::test]
    async fn test_resolve_busy() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries.clone());

        {
            let _writer = registries.channels.write().await;
            let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
            assert_matches!(result, Err(Error::Busy("channels")));
        }

        {
            let _writer = registries.schedules.write().await;
            let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
            assert_matches!(result, Err(Error::Busy("schedules")));
        }

        // Every read access has been released on the error paths above.
        let result = resolver.resolve(5.into(), &Enrichment::Absent, now()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_enriched() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries.clone());

        let mut provider = CountingProvider::default();
        let mut present = event!(1, now(), "30m", "News");
        present.short_text = Some("Evening edition".to_string());
        provider.events.insert(1, present);
        let mut following = event!(2, now() + chrono::Duration::seconds(1800), "2h", "Movie");
        following.description = Some("A long story".to_string());
        provider.events.insert(2, following);
        let provider = Arc::new(provider);
        let enrichment = Enrichment::Present(provider.clone());

        let result = resolver.resolve(5.into(), &enrichment, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(resolution.have_actual);
            assert_eq!(resolution.payload["present"]["shortText"], "Evening edition");
            assert_eq!(resolution.payload["following"]["description"], "A long story");
        });
        assert_eq!(provider.allocated(), 2);
        assert_eq!(provider.released(), 2);

        // The primary schedule is left untouched.
        let schedules = registries
            .schedules
            .acquire_read(Duration::from_millis(10))
            .await
            .unwrap();
        let schedule = schedules.get(&ChannelId::from("ch5")).unwrap();
        assert_eq!(schedule.present(now()).unwrap().short_text, None);
    }

    #[tokio::test]
    async fn test_resolve_partially_enriched() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let mut provider = CountingProvider::default();
        let mut following = event!(2, now() + chrono::Duration::seconds(1800), "2h", "Movie");
        following.short_text = Some("Part 1".to_string());
        provider.events.insert(2, following);
        let provider = Arc::new(provider);
        let enrichment = Enrichment::Present(provider.clone());

        let result = resolver.resolve(5.into(), &enrichment, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert_eq!(resolution.payload["present"]["title"], "News");
            assert!(resolution.payload["present"].get("shortText").is_none());
            assert_eq!(resolution.payload["following"]["shortText"], "Part 1");
        });
        assert_eq!(provider.allocated(), 1);
        assert_eq!(provider.released(), 1);
    }

    #[tokio::test]
    async fn test_resolve_enrichment_failed() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let provider = Arc::new(CountingProvider {
            fail_events: true,
            ..Default::default()
        });
        let enrichment = Enrichment::Present(provider.clone());

        let result = resolver.resolve(5.into(), &enrichment, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(resolution.have_actual);
            assert_eq!(resolution.payload["present"]["title"], "News");
            assert_eq!(resolution.payload["following"]["title"], "Movie");
            assert_eq!(resolution.next_refresh_at, now() + chrono::Duration::seconds(1800));
        });
        assert_eq!(provider.allocated(), 0);
        assert_eq!(provider.released(), 0);
    }

    #[tokio::test]
    async fn test_resolve_enrichment_timed_out() {
        let registries = registries_for_test(Some(news_and_movie())).await;
        let mut config = Config::default();
        config.enrichment.timeout = Duration::from_millis(10);
        let resolver = ScheduleResolver::new(&config, registries.clone());

        let provider = Arc::new(CountingProvider {
            stall: true,
            ..Default::default()
        });
        let enrichment = Enrichment::Present(provider.clone());

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.resolve(5.into(), &enrichment, now()),
        )
        .await;
        assert_matches!(result, Ok(Ok(resolution)) => {
            assert!(resolution.have_actual);
            assert_eq!(resolution.payload["present"]["title"], "News");
            assert_eq!(resolution.payload["following"]["title"], "Movie");
        });
        assert_eq!(provider.allocated(), 0);

        // Read accesses have been released.
        let writer = tokio::time::timeout(Duration::from_secs(1), registries.schedules.write()).await;
        assert!(writer.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_enriched_no_schedule() {
        let registries = registries_for_test(None).await;
        let resolver = ScheduleResolver::new(&Default::default(), registries);

        let provider = Arc::new(CountingProvider::default());
        let enrichment = Enrichment::Present(provider.clone());

        let result = resolver.resolve(5.into(), &enrichment, now()).await;
        assert_matches!(result, Ok(resolution) => {
            assert!(!resolution.have_actual);
        });
        assert_eq!(provider.allocated(), 0);
        assert_eq!(provider.released(), 0);
    }
}
